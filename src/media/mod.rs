use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default ceiling for a single upload (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

/// A media file handed over by the caller for one analysis
#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// Raw file content
    pub bytes: Vec<u8>,

    /// Original filename, including its extension
    pub filename: String,

    /// Content type declared by the client, if any
    pub content_type: Option<String>,
}

impl MediaUpload {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            content_type,
        }
    }

    /// Read a local file into an upload
    pub async fn from_path(path: &Path) -> crate::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self::new(bytes, filename, None))
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercased extension of the original filename, without the dot
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.filename)
    }

    /// Recognised format of the upload, if its extension is supported
    pub fn format(&self) -> Option<MediaFormat> {
        self.extension().as_deref().and_then(MediaFormat::from_extension)
    }

    /// Declared content type, falling back to the extension table when the
    /// declaration is missing or generic
    pub fn effective_content_type(&self) -> String {
        match self.content_type.as_deref() {
            Some(ct) if !ct.trim().is_empty() && !ct.contains("octet-stream") => ct.to_string(),
            _ => self
                .format()
                .map(|format| format.mime_type().to_string())
                .unwrap_or_else(|| GENERIC_CONTENT_TYPE.to_string()),
        }
    }
}

/// Supported media formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Mp4,
    Mov,
    Wav,
    Mp3,
    M4a,
    Mkv,
    Avi,
    Flv,
    Wmv,
    Ogg,
    Flac,
    Webm,
}

impl MediaFormat {
    pub const ALL: [MediaFormat; 12] = [
        MediaFormat::Mp4,
        MediaFormat::Mov,
        MediaFormat::Wav,
        MediaFormat::Mp3,
        MediaFormat::M4a,
        MediaFormat::Mkv,
        MediaFormat::Avi,
        MediaFormat::Flv,
        MediaFormat::Wmv,
        MediaFormat::Ogg,
        MediaFormat::Flac,
        MediaFormat::Webm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mov => "mov",
            MediaFormat::Wav => "wav",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::M4a => "m4a",
            MediaFormat::Mkv => "mkv",
            MediaFormat::Avi => "avi",
            MediaFormat::Flv => "flv",
            MediaFormat::Wmv => "wmv",
            MediaFormat::Ogg => "ogg",
            MediaFormat::Flac => "flac",
            MediaFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        Self::ALL.into_iter().find(|format| format.as_str() == ext)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Mov => "video/quicktime",
            MediaFormat::Wav => "audio/wav",
            MediaFormat::Mp3 => "audio/mpeg",
            MediaFormat::M4a => "audio/m4a",
            MediaFormat::Mkv => "video/x-matroska",
            MediaFormat::Avi => "video/x-msvideo",
            MediaFormat::Flv => "video/x-flv",
            MediaFormat::Wmv => "video/x-ms-wmv",
            MediaFormat::Ogg => "audio/ogg",
            MediaFormat::Flac => "audio/flac",
            MediaFormat::Webm => "video/webm",
        }
    }

    pub fn is_video(&self) -> bool {
        self.mime_type().starts_with("video/")
    }
}

/// Reasons an upload is turned away before analysis starts
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("File is empty: {0}")]
    Empty(String),

    #[error("File size limit exceeded: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}

/// Caller-side checks run before the workflow is invoked
pub fn check_admission(upload: &MediaUpload, max_bytes: u64) -> Result<MediaFormat, AdmissionError> {
    if upload.size() == 0 {
        return Err(AdmissionError::Empty(upload.filename.clone()));
    }

    if upload.size() > max_bytes {
        return Err(AdmissionError::TooLarge {
            size: upload.size(),
            limit: max_bytes,
        });
    }

    upload
        .format()
        .ok_or_else(|| AdmissionError::UnsupportedType(upload.filename.clone()))
}

/// Lowercased extension of a filename, without the dot
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
}
