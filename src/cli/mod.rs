use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "summarizer",
    about = "Media Summarizer - Transcribe audio/video files and summarize them in five key points with Gemini",
    version,
    long_about = "Uploads an audio or video file to the Gemini API and returns a full transcript plus a five-point summary in the main spoken language. Run it on a single file, or start a small upload server."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Gemini API key
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Path to a YAML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe and summarize a local audio or video file
    Analyze {
        /// Media file to analyze (mp4, mov, wav, mp3, m4a, mkv, avi, flv, wmv, ogg, flac, webm)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },

    /// Serve an upload form and analysis endpoint over HTTP
    Serve {
        /// Address to listen on (overrides app.bind_address)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file to the user config directory
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },

    /// List supported media formats
    Formats,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Model response as markdown
    Markdown,
    /// Model response followed by processing details
    Text,
    /// JSON with metadata and split sections
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "summarizer",
            "analyze",
            "talk.mp3",
            "--format",
            "json",
            "--api-key",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.api_key.as_deref(), Some("secret"));
        match cli.command {
            Commands::Analyze { file, output, format } => {
                assert_eq!(file, PathBuf::from("talk.mp3"));
                assert!(output.is_none());
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_config_flags_conflict() {
        assert!(Cli::try_parse_from(["summarizer", "config", "--show", "--init"]).is_err());
    }
}
