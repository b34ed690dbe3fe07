//! Configuration for the generation backend and run limits.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::GenflowError;
use crate::stream::DEFAULT_MAX_BUFFER;

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "GENFLOW_BASE_URL";
/// Environment variable overriding the run timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "GENFLOW_TIMEOUT_SECS";
/// Environment variable overriding the download directory.
pub const ENV_DOWNLOAD_DIR: &str = "GENFLOW_DOWNLOAD_DIR";

/// Endpoints, limits and local paths used by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenflowConfig {
    /// Base URL every endpoint path is joined to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Streaming generation endpoint.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Non-streaming (fallback) generation endpoint.
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    /// Document render endpoint.
    #[serde(default = "default_render_path")]
    pub render_path: String,
    /// Durable per-item storage upload endpoint.
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    /// Experience metadata save endpoint.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,
    /// Countdown for a run, in seconds. Also the fallback request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on buffered, undelimited stream bytes.
    #[serde(default = "default_max_frame_buffer")]
    pub max_frame_buffer: usize,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Directory delivered documents are written to.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_stream_path() -> String {
    "/api/jd2cv-full/langchain-generate/stream".to_string()
}

fn default_generate_path() -> String {
    "/api/jd2cv-full/langchain-generate".to_string()
}

fn default_render_path() -> String {
    "/api/jd2cv-full/v2/generate-pdf".to_string()
}

fn default_upload_path() -> String {
    "/api/jds/upload-pdf".to_string()
}

fn default_metadata_path() -> String {
    "/api/jd2cv-full/langchain-experience".to_string()
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_max_frame_buffer() -> usize {
    DEFAULT_MAX_BUFFER
}

fn default_user_agent() -> String {
    concat!("genflow/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

impl Default for GenflowConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            generate_path: default_generate_path(),
            render_path: default_render_path(),
            upload_path: default_upload_path(),
            metadata_path: default_metadata_path(),
            timeout_secs: default_timeout_secs(),
            max_frame_buffer: default_max_frame_buffer(),
            user_agent: default_user_agent(),
            download_dir: default_download_dir(),
        }
    }
}

impl GenflowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, GenflowError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GenflowError::Config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from defaults overridden by environment
    /// variables.
    pub fn from_env() -> Result<Self, GenflowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, GenflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = secs.trim().parse().map_err(|_| {
                GenflowError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number, got '{secs}'"))
            })?;
        }
        if let Some(dir) = lookup(ENV_DOWNLOAD_DIR) {
            config.download_dir = PathBuf::from(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the run timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the frame buffer limit.
    #[must_use]
    pub fn with_max_frame_buffer(mut self, bytes: usize) -> Self {
        self.max_frame_buffer = bytes;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the download directory.
    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Gets the run timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), GenflowError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(GenflowError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(GenflowError::Config("timeout_secs must be positive".to_string()));
        }
        if self.max_frame_buffer == 0 {
            return Err(GenflowError::Config(
                "max_frame_buffer must be positive".to_string(),
            ));
        }
        let paths = [
            ("stream_path", &self.stream_path),
            ("generate_path", &self.generate_path),
            ("render_path", &self.render_path),
            ("upload_path", &self.upload_path),
            ("metadata_path", &self.metadata_path),
        ];
        for (name, path) in paths {
            if path.trim().is_empty() {
                return Err(GenflowError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}
