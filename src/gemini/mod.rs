//! Remote content-generation service.
//!
//! The analysis workflow only sees the [`RemoteMediaService`] trait; the
//! Gemini REST binding lives in [`client`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod client;
pub mod types;

pub use client::GeminiClient;

/// Reference to bytes stored by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Resource name used for lookups and deletion, e.g. `files/abc123`
    pub name: String,

    /// URI used to reference the file from a generation request
    pub uri: String,

    /// MIME type recorded by the service
    pub mime_type: String,
}

/// One generation call against an uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: String,
    pub prompt: String,
    pub file: RemoteFile,
    pub temperature: f32,
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Gemini API error (HTTP {status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Request rejected by content policy: {0}")]
    Blocked(String),

    #[error("Remote file processing failed: {0}")]
    FileProcessing(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Cannot read local file: {0}")]
    Io(String),

    #[error("Remote call aborted: {0}")]
    Aborted(String),
}

impl RemoteError {
    /// Build an error from a non-success HTTP response body, using the Gemini
    /// error envelope when the body carries one
    pub fn from_error_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<types::ApiError>(body) {
            Ok(envelope) => RemoteError::Api {
                status,
                code: envelope
                    .error
                    .status
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                message: envelope.error.message,
            },
            Err(_) => RemoteError::Api {
                status,
                code: "UNKNOWN".to_string(),
                message: body.trim().to_string(),
            },
        }
    }

    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, RemoteError::Blocked(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

/// The three operations the workflow consumes from the remote service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteMediaService: Send + Sync {
    /// Upload a local file. The service detects the content type itself.
    async fn upload(&self, path: &Path) -> Result<RemoteFile, RemoteError>;

    /// Run one generation request and return the response text
    async fn generate(&self, request: &GenerationRequest) -> Result<String, RemoteError>;

    /// Delete an uploaded file by resource name
    async fn delete(&self, name: &str) -> Result<(), RemoteError>;
}
