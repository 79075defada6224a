use anyhow::Result;
use std::path::Path;

use crate::analysis::Analysis;
use crate::cli::OutputFormat;

pub mod formatters;

pub use formatters::*;

/// Render an analysis in the requested format
pub fn render(analysis: &Analysis, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Markdown => format_as_markdown(analysis),
        OutputFormat::Text => format_as_text(analysis),
        OutputFormat::Json => format_as_json(analysis)?,
    })
}

/// Save analysis result to file
pub async fn save_to_file(analysis: &Analysis, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(analysis, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print analysis result to console
pub fn print_to_console(analysis: &Analysis, format: &OutputFormat) -> Result<()> {
    let content = render(analysis, format)?;
    println!("{}", content);
    Ok(())
}
