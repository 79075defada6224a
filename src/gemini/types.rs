//! Gemini REST wire types

use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteFile};

// =============================================================================
// Files API
// =============================================================================

#[derive(Debug, Serialize)]
pub struct StartUploadRequest {
    pub file: FileMetadata,
}

#[derive(Debug, Serialize)]
pub struct FileMetadata {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadFileResponse {
    pub file: FileResource,
}

/// File object as returned by `files.get` and the upload finalize step
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub state: Option<FileState>,
    #[serde(default)]
    pub error: Option<Status>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub message: Option<String>,
}

impl FileResource {
    pub fn is_processing(&self) -> bool {
        self.state == Some(FileState::Processing)
    }

    pub fn is_failed(&self) -> bool {
        self.state == Some(FileState::Failed)
    }

    pub fn failure_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|status| status.message.clone())
            .unwrap_or_else(|| format!("{} entered FAILED state", self.name))
    }

    pub fn into_remote_file(self, fallback_mime: &str) -> Result<RemoteFile, RemoteError> {
        let uri = self.uri.ok_or_else(|| {
            RemoteError::InvalidResponse(format!("File {} has no URI", self.name))
        })?;

        Ok(RemoteFile {
            name: self.name,
            uri,
            mime_type: self.mime_type.unwrap_or_else(|| fallback_mime.to_string()),
        })
    }
}

// =============================================================================
// generateContent
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn file(file: &RemoteFile) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Finish reasons that mean the model refused on policy grounds
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

impl GenerateContentResponse {
    /// Text of the first candidate, or the reason there is none
    pub fn into_text(self) -> Result<String, RemoteError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(RemoteError::Blocked(reason));
        }

        let candidate = self
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| RemoteError::InvalidResponse("No candidates returned".to_string()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(RemoteError::Blocked(reason.to_string()));
            }
        }

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(RemoteError::InvalidResponse(format!(
                "Model returned an empty response (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("none")
            )));
        }

        Ok(text)
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}
