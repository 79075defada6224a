use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::gemini::{GenerationRequest, RemoteError, RemoteFile, RemoteMediaService};
use crate::media::MediaUpload;

pub mod prompt;
pub mod staging;

use staging::StagedFile;

/// Result of one successful analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Model response, transcript and summary under their headings
    pub text: String,

    /// Model that produced the text
    pub model: String,

    /// Original filename of the upload
    pub filename: String,

    /// Remote resource name the upload was stored under
    pub remote_file: String,

    /// Wall-clock time for the whole invocation in seconds
    pub processing_duration: f64,

    /// Timestamp when analysis completed
    pub completed_at: chrono::DateTime<chrono::Utc>,

    /// Cleanup failures that did not affect the result
    pub cleanup_warnings: Vec<CleanupWarning>,
}

impl Analysis {
    pub fn sections(&self) -> prompt::Sections<'_> {
        prompt::split_sections(&self.text)
    }
}

/// Terminal failures of an analysis
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("Could not stage the upload locally: {0}")]
    Staging(#[source] std::io::Error),

    #[error("Upload to the remote service failed: {0}")]
    Upload(#[source] RemoteError),

    #[error("Transcription and summary request failed: {0}")]
    Generation(#[source] RemoteError),
}

/// Non-fatal failure to release a resource
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CleanupWarning {
    #[error("Could not delete remote file {name}: {reason}")]
    RemoteFile { name: String, reason: String },

    #[error("Could not delete staged file {}: {reason}", .path.display())]
    StagedFile { path: PathBuf, reason: String },
}

/// Settings the workflow needs from the application config
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub model: String,
    pub staging_dir: PathBuf,
}

impl From<&Config> for WorkflowSettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.gemini.model.clone(),
            staging_dir: config.staging_dir(),
        }
    }
}

/// Stage, upload, analyze, and clean up one media file
pub struct MediaAnalysisWorkflow {
    remote: Arc<dyn RemoteMediaService>,
    settings: WorkflowSettings,
}

impl MediaAnalysisWorkflow {
    pub fn new(remote: Arc<dyn RemoteMediaService>, settings: WorkflowSettings) -> Self {
        Self { remote, settings }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Analyze one upload.
    ///
    /// The staged file is deleted on every path. If the remote service
    /// accepted the upload, exactly one delete request is sent for it, whether
    /// or not generation succeeded. Cleanup failures are logged and recorded
    /// on the result but never turn success into failure.
    pub async fn analyze(&self, upload: &MediaUpload) -> Result<Analysis, AnalysisError> {
        let start_time = Instant::now();

        tracing::info!(
            "Staging {} ({})",
            upload.filename,
            crate::utils::format_file_size(upload.size())
        );
        let staged = StagedFile::create(&self.settings.staging_dir, upload)
            .await
            .map_err(AnalysisError::Staging)?;

        let mut cleanup_warnings = Vec::new();
        let outcome = self.run_remote(staged.path(), &mut cleanup_warnings).await;

        if let Err((path, err)) = staged.close() {
            let warning = CleanupWarning::StagedFile {
                path,
                reason: err.to_string(),
            };
            tracing::warn!("{}", warning);
            cleanup_warnings.push(warning);
        }

        let (text, remote_file) = outcome?;
        let processing_duration = start_time.elapsed().as_secs_f64();

        tracing::info!(
            "Analysis of {} completed in {}",
            upload.filename,
            crate::utils::format_duration(processing_duration)
        );

        Ok(Analysis {
            text,
            model: self.settings.model.clone(),
            filename: upload.filename.clone(),
            remote_file,
            processing_duration,
            completed_at: chrono::Utc::now(),
            cleanup_warnings,
        })
    }

    /// Upload then generate; deletes the remote file once it exists
    async fn run_remote(
        &self,
        staged_path: &Path,
        cleanup_warnings: &mut Vec<CleanupWarning>,
    ) -> Result<(String, String), AnalysisError> {
        tracing::info!("Uploading staged file to the remote service");
        let file = guarded(|| self.remote.upload(staged_path))
            .await
            .map_err(AnalysisError::Upload)?;
        tracing::info!("Upload stored as {}", file.name);

        tracing::info!("Requesting transcript and summary from {}", self.settings.model);
        let request = self.generation_request(file.clone());
        let generated = guarded(|| self.remote.generate(&request)).await;

        tracing::info!("Deleting remote file {}", file.name);
        if let Err(err) = guarded(|| self.remote.delete(&file.name)).await {
            let warning = CleanupWarning::RemoteFile {
                name: file.name.clone(),
                reason: err.to_string(),
            };
            tracing::warn!("{}", warning);
            cleanup_warnings.push(warning);
        }

        let text = generated.map_err(AnalysisError::Generation)?;
        Ok((text, file.name))
    }

    fn generation_request(&self, file: RemoteFile) -> GenerationRequest {
        GenerationRequest {
            model: self.settings.model.clone(),
            system_instruction: prompt::SYSTEM_INSTRUCTION.to_string(),
            prompt: prompt::user_prompt(),
            file,
            temperature: prompt::TEMPERATURE,
        }
    }
}

/// Run a remote call, turning a panic into an error so cleanup still happens
async fn guarded<T, F, Fut>(call: F) -> Result<T, RemoteError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    match AssertUnwindSafe(async move { call().await }).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(RemoteError::Aborted(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic in remote call".to_string()
    }
}
