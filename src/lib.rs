//! Media Summarizer - transcribe audio and video files and summarize them with Gemini
//!
//! A media file is staged to a temporary file, uploaded to the Gemini Files API,
//! analyzed in a single generation request that returns a verbatim transcript and a
//! five-point summary, and then deleted both remotely and locally.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod gemini;
pub mod media;
pub mod output;
pub mod server;
pub mod utils;

pub use analysis::{Analysis, AnalysisError, CleanupWarning, MediaAnalysisWorkflow, WorkflowSettings};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use gemini::{GeminiClient, GenerationRequest, RemoteError, RemoteFile, RemoteMediaService};
pub use media::{check_admission, AdmissionError, MediaFormat, MediaUpload};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
