use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_summarizer::analysis::{MediaAnalysisWorkflow, WorkflowSettings};
use media_summarizer::cli::{Cli, Commands};
use media_summarizer::config::Config;
use media_summarizer::gemini::GeminiClient;
use media_summarizer::media::{check_admission, MediaFormat, MediaUpload};
use media_summarizer::{output, server, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "media_summarizer=debug,tower_http=debug"
    } else {
        "media_summarizer=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Writing a fresh config must not depend on loading one
    if let Commands::Config { init: true, .. } = cli.command {
        return init_config(cli.config.as_deref());
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze { file, output, format } => {
            let workflow = build_workflow(cli.api_key.as_deref(), &config)?;

            utils::check_file_accessible(&file)?;
            let upload = MediaUpload::from_path(&file).await?;
            check_admission(&upload, config.app.max_upload_bytes)
                .with_context(|| format!("Cannot analyze {}", file.display()))?;

            tracing::info!(
                "Analyzing {} ({}) with {}",
                upload.filename,
                upload.effective_content_type(),
                workflow.model()
            );

            let progress = if cli.quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new_spinner()
            };
            progress.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .context("Invalid progress template")?,
            );
            progress.set_message(format!("Processing with {}...", workflow.model()));
            progress.enable_steady_tick(Duration::from_millis(120));

            let result = workflow.analyze(&upload).await;

            match &result {
                Ok(_) => progress.finish_with_message("Analysis complete"),
                Err(_) => progress.abandon_with_message("Analysis failed"),
            }
            let analysis = result?;

            for warning in &analysis.cleanup_warnings {
                eprintln!("{} {}", style("warning:").yellow().bold(), warning);
            }

            match output {
                Some(path) => {
                    output::save_to_file(&analysis, &path, &format).await?;
                    println!("Analysis saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&analysis, &format)?;
                }
            }
        }
        Commands::Serve { bind } => {
            let workflow = build_workflow(cli.api_key.as_deref(), &config)?;
            let bind_address = bind.unwrap_or_else(|| config.app.bind_address.clone());

            tracing::info!(
                "Serving uploads up to {} with {}",
                utils::format_file_size(config.app.max_upload_bytes),
                workflow.model()
            );

            let state = server::AppState {
                workflow: Arc::new(workflow),
                max_upload_bytes: config.app.max_upload_bytes,
            };
            server::serve(state, &bind_address).await?;
        }
        Commands::Config { show, .. } => {
            config.display();
            if !show {
                match Config::user_config_path() {
                    Some(path) => println!("\nEdit the config file at:\n  {}", path.display()),
                    None => println!("\nPass --config <FILE> to use a config file"),
                }
            }
        }
        Commands::Formats => {
            println!("Supported formats:");
            for format in MediaFormat::ALL {
                let kind = if format.is_video() { "video" } else { "audio" };
                println!("  • {:<5} {:<6} {}", format.as_str(), kind, format.mime_type());
            }
        }
    }

    Ok(())
}

fn init_config(explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(Config::user_config_path)
        .context("Could not determine config directory")?;

    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }

    Config::default().save(&path)?;
    println!("Configuration written to: {}", path.display());
    Ok(())
}

/// Resolve the API key and construct the remote client. Any failure here is
/// fatal: nothing is analyzed without a working client.
fn build_workflow(api_key: Option<&str>, config: &Config) -> Result<MediaAnalysisWorkflow> {
    let api_key = api_key
        .filter(|key| !key.trim().is_empty())
        .context("API key missing: set GEMINI_API_KEY or pass --api-key")?;

    let client = GeminiClient::new(api_key, &config.gemini).context("Error initializing AI client")?;

    Ok(MediaAnalysisWorkflow::new(
        Arc::new(client),
        WorkflowSettings::from(config),
    ))
}
