//! Fixed instructions sent with every generation request, and the helper
//! callers use to split the response on its two headings.

use serde::Serialize;

/// Heading that opens the transcript section of every response
pub const TRANSCRIPT_HEADING: &str = "## 📝 Full Transcript";

/// Heading that opens the summary section of every response
pub const SUMMARY_HEADING: &str = "## ✅ Key Point Summary (5 Points)";

/// Number of bullet points the summary must contain
pub const SUMMARY_POINTS: usize = 5;

/// Sampling temperature for every analysis request
pub const TEMPERATURE: f32 = 0.0;

pub const SYSTEM_INSTRUCTION: &str = "You transcribe and summarize audio and video recordings. \
For every file you receive, do two things. \
First, write a complete, verbatim transcript of everything spoken in the recording. \
Second, read that transcript and extract exactly 5 key points (the most important ideas, concepts, or steps) as a bulleted summary. \
Write the summary in the language that is spoken most in the recording. \
If nothing is spoken, leave the transcript empty and still give a bulleted summary that says no speech was detected. \
Always answer using exactly the two markdown headings requested by the user, in that order.";

/// User-turn text placed before the file part
pub fn user_prompt() -> String {
    format!(
        "Analyze the attached file. Produce the full transcript first, then a summary of {points} key points.\n\
         Use exactly this format:\n\
         {transcript}\n\
         [complete verbatim transcript]\n\
         \n\
         {summary}\n\
         [{points} bullet points, in the main spoken language of the recording]",
        points = SUMMARY_POINTS,
        transcript = TRANSCRIPT_HEADING,
        summary = SUMMARY_HEADING,
    )
}

/// Transcript and summary bodies located by their headings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Sections<'a> {
    pub transcript: Option<&'a str>,
    pub summary: Option<&'a str>,
}

impl Sections<'_> {
    pub fn is_complete(&self) -> bool {
        self.transcript.is_some() && self.summary.is_some()
    }
}

/// Split a response on the two fixed headings. A missing heading leaves its
/// section as `None`; the text itself is never rewritten.
pub fn split_sections(text: &str) -> Sections<'_> {
    let transcript_at = text.find(TRANSCRIPT_HEADING);
    let summary_at = text.find(SUMMARY_HEADING);

    let transcript = transcript_at.map(|start| {
        let body_start = start + TRANSCRIPT_HEADING.len();
        let body_end = summary_at.filter(|&end| end > start).unwrap_or(text.len());
        text[body_start..body_end].trim()
    });

    let summary = summary_at.map(|start| {
        let body_start = start + SUMMARY_HEADING.len();
        let body_end = transcript_at.filter(|&end| end > start).unwrap_or(text.len());
        text[body_start..body_end].trim()
    });

    Sections { transcript, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_names_both_headings() {
        let prompt = user_prompt();
        assert!(prompt.contains(TRANSCRIPT_HEADING));
        assert!(prompt.contains(SUMMARY_HEADING));
        assert!(prompt.find(TRANSCRIPT_HEADING) < prompt.find(SUMMARY_HEADING));
    }

    #[test]
    fn test_split_sections() {
        let text = format!(
            "{TRANSCRIPT_HEADING}\nHello and welcome.\n\n{SUMMARY_HEADING}\n- one\n- two\n"
        );
        let sections = split_sections(&text);

        assert_eq!(sections.transcript, Some("Hello and welcome."));
        assert_eq!(sections.summary, Some("- one\n- two"));
        assert!(sections.is_complete());
    }

    #[test]
    fn test_split_sections_with_empty_transcript() {
        let text = format!("{TRANSCRIPT_HEADING}\n\n{SUMMARY_HEADING}\n- No speech detected.");
        let sections = split_sections(&text);

        assert_eq!(sections.transcript, Some(""));
        assert_eq!(sections.summary, Some("- No speech detected."));
    }

    #[test]
    fn test_split_sections_without_headings() {
        let sections = split_sections("free-form answer");
        assert_eq!(sections, Sections::default());
        assert!(!sections.is_complete());
    }
}
