use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::media::DEFAULT_MAX_UPLOAD_BYTES;

const LOCAL_CONFIG_FILE: &str = "summarizer.yaml";
const APP_DIR_NAME: &str = "media-summarizer";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote service settings
    pub gemini: GeminiConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Model used for transcription and summarization
    pub model: String,

    /// API host, without the version segment
    pub base_url: String,

    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,

    /// How long to wait for an uploaded file to finish server-side processing
    pub activation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for staged uploads (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Uploads above this size are rejected before analysis
    pub max_upload_bytes: u64,

    /// Listen address for `serve`
    pub bind_address: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: crate::gemini::GeminiClient::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 600,
            activation_timeout_secs: 300,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the working directory, or
    /// the user config directory. Falls back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let config = match path {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn discover() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        Self::user_config_path().filter(|path| path.exists())
    }

    /// Default location of the per-user config file
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.gemini.model.trim().is_empty() {
            anyhow::bail!("gemini.model must be configured");
        }

        let base_url = Url::parse(&self.gemini.base_url)
            .with_context(|| format!("Invalid gemini.base_url: {}", self.gemini.base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("gemini.base_url must use HTTP or HTTPS");
        }

        if self.gemini.request_timeout_secs == 0 {
            anyhow::bail!("gemini.request_timeout_secs must be greater than zero");
        }

        if self.app.max_upload_bytes == 0 {
            anyhow::bail!("app.max_upload_bytes must be greater than zero");
        }

        Ok(())
    }

    /// Directory staged uploads are written to
    pub fn staging_dir(&self) -> PathBuf {
        self.app.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Model: {}", self.gemini.model);
        println!("  API Host: {}", self.gemini.base_url);
        println!("  Request Timeout: {}s", self.gemini.request_timeout_secs);
        println!("  File Processing Timeout: {}s", self.gemini.activation_timeout_secs);
        println!("  Staging Directory: {}", self.staging_dir().display());
        println!(
            "  Upload Limit: {}",
            crate::utils::format_file_size(self.app.max_upload_bytes)
        );
        println!("  Bind Address: {}", self.app.bind_address);
    }
}
