use anyhow::Result;
use serde::Serialize;

use crate::analysis::prompt::Sections;
use crate::analysis::Analysis;
use crate::utils::format_duration;

/// The model response, untouched
pub fn format_as_markdown(analysis: &Analysis) -> String {
    analysis.text.clone()
}

/// The model response followed by a short processing footer
pub fn format_as_text(analysis: &Analysis) -> String {
    let mut output = analysis.text.trim_end().to_string();

    output.push_str("\n\n---\n");
    output.push_str(&format!("File: {}\n", analysis.filename));
    output.push_str(&format!("Model: {}\n", analysis.model));
    output.push_str(&format!(
        "Processed in: {}\n",
        format_duration(analysis.processing_duration)
    ));
    output.push_str(&format!(
        "Completed at: {}\n",
        analysis.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for warning in &analysis.cleanup_warnings {
        output.push_str(&format!("Warning: {}\n", warning));
    }

    output
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    analysis: &'a Analysis,
    sections: Sections<'a>,
}

/// Metadata, raw text, and the transcript/summary sections when found
pub fn format_as_json(analysis: &Analysis) -> Result<String> {
    let report = JsonReport {
        analysis,
        sections: analysis.sections(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}
