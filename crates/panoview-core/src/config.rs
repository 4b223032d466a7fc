//! Session and relay configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::ViewerId;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";

/// What to do when the frontend asks the script to restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Replace the current process with a fresh copy of itself.
    #[default]
    Exec,
    /// Log and carry on.
    Ignore,
}

/// Per-session settings.
///
/// ```toml
/// server_url = "localhost:8080"
/// viewer_id = "bunny"
/// interactive_console = true
/// request_timeout_ms = 1000
/// screenshot_timeout_ms = 2000
/// restart = "ignore"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub server_url: Option<String>,
    pub viewer_id: Option<String>,
    pub interactive_console: bool,
    pub request_timeout_ms: u64,
    pub screenshot_timeout_ms: u64,
    pub restart: RestartPolicy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            viewer_id: None,
            interactive_console: false,
            request_timeout_ms: 1000,
            screenshot_timeout_ms: 2000,
            restart: RestartPolicy::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// The configured id, or a freshly generated one.
    pub fn resolve_viewer_id(&self) -> ViewerId {
        match self.viewer_id.as_deref() {
            Some(id) if !id.is_empty() => ViewerId::new(id),
            _ => ViewerId::generate(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.screenshot_timeout_ms)
    }

    /// WebSocket URL for `viewer_id`, see [`normalize_server_url`].
    pub fn connect_url(&self, viewer_id: &ViewerId) -> String {
        normalize_server_url(self.server_url.as_deref(), viewer_id)
    }
}

/// Turn a user-supplied server address into a WebSocket URL.
///
/// Empty means [`DEFAULT_SERVER_URL`]; `http(s)://` becomes `ws(s)://`; a
/// bare host gets `ws://`. `viewer_id` is appended as a query parameter
/// unless the URL already has a query.
pub fn normalize_server_url(raw: Option<&str>, viewer_id: &ViewerId) -> String {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let mut url = match raw {
        None => DEFAULT_SERVER_URL.to_owned(),
        Some(s) if s.starts_with("ws://") || s.starts_with("wss://") => s.to_owned(),
        Some(s) => {
            if let Some(rest) = s.strip_prefix("http://") {
                format!("ws://{rest}")
            } else if let Some(rest) = s.strip_prefix("https://") {
                format!("wss://{rest}")
            } else {
                format!("ws://{s}")
            }
        }
    };
    if !url.contains('?') {
        url.push_str("?viewer_id=");
        url.push_str(viewer_id.as_str());
    }
    url
}

/// Fan-out relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub addr: String,
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_owned(),
            max_connections: 64,
        }
    }
}
