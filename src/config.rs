use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::backend::{DEFAULT_PATH_MAX_LENGTH, DEFAULT_PRUNE_DEPTH, PushSettings};
use crate::error::{Result, ViewerError};
use crate::layout::LayoutConfig;
use crate::session::SessionSettings;

pub const DEFAULT_CONFIG_FILE: &str = "codegraph-viewer.toml";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

/// Viewer settings, read from TOML. Every field is optional in the file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub backend_url: String,
    /// Defaults to the backend URL with a websocket scheme and a `/ws` path.
    pub push_url: Option<String>,
    pub reconnect_delay_ms: u64,
    pub keepalive_secs: u64,
    pub request_timeout_ms: u64,
    pub prune_depth: u32,
    pub path_max_length: u32,
    pub search_limit: usize,
    pub export_dir: PathBuf,
    pub layout: LayoutConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_owned(),
            push_url: None,
            reconnect_delay_ms: 5_000,
            keepalive_secs: 30,
            request_timeout_ms: 30_000,
            prune_depth: DEFAULT_PRUNE_DEPTH,
            path_max_length: DEFAULT_PATH_MAX_LENGTH,
            search_limit: 50,
            export_dir: PathBuf::from("."),
            layout: LayoutConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| ViewerError::Config(err.to_string()))
    }

    /// Loads `path` if given, else `./codegraph-viewer.toml` when it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path).map_err(|err| {
            ViewerError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_toml(&text).map_err(|err| match err {
            ViewerError::Config(message) => {
                ViewerError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn with_overrides(mut self, backend_url: Option<String>, push_url: Option<String>) -> Self {
        if let Some(url) = backend_url {
            self.backend_url = url;
        }
        if let Some(url) = push_url {
            self.push_url = Some(url);
        }
        self
    }

    pub fn push_url(&self) -> String {
        if let Some(url) = &self.push_url {
            return url.clone();
        }

        let base = self.backend_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_owned()
        };
        format!("{base}/ws")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            prune_depth: self.prune_depth.max(1),
            path_max_length: self.path_max_length.max(1),
            search_limit: self.search_limit.max(1),
        }
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            keepalive: (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs)),
        }
    }
}
