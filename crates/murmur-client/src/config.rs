//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration
//! against a local development backend.

use std::path::PathBuf;
use std::time::Duration;

use murmur_shared::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVER_URL,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the chat backend. The realtime endpoint is derived from it.
    /// Env: `MURMUR_SERVER_URL`
    /// Default: `http://localhost:5000`
    pub server_url: String,

    /// Directory holding the local database.
    /// Env: `MURMUR_DATA_DIR`
    /// Default: `None` (platform data directory).
    pub data_dir: Option<PathBuf>,

    /// Timeout applied to every REST call.
    /// Env: `MURMUR_REQUEST_TIMEOUT_SECS`
    /// Default: 15 seconds
    pub request_timeout: Duration,

    /// Capacity of the realtime event queue and the UI event stream.
    /// Env: `MURMUR_EVENT_BUFFER`
    /// Default: 256
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = var("MURMUR_SERVER_URL") {
            let url = url.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                config.server_url = url.trim_end_matches('/').to_string();
            } else {
                tracing::warn!(value = %url, "Invalid MURMUR_SERVER_URL, using default");
            }
        }

        if let Some(dir) = var("MURMUR_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = var("MURMUR_REQUEST_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid MURMUR_REQUEST_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Some(val) = var("MURMUR_EVENT_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.event_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid MURMUR_EVENT_BUFFER, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}
