use crate::utils::url::DEFAULT_BACKEND_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_UPLOAD_ACK_DELAY_MS: u64 = 1000;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the inference backend (defaults to `http://127.0.0.1:8000`)
    pub backend_url: Option<String>,
    /// Model token selected at startup, e.g. `openai/gpt-4o` or `custom/<id>/<model>`
    pub default_model: Option<String>,
    /// Delay before the upload acknowledgement message is posted
    pub upload_ack_delay_ms: Option<u64>,
    /// Timeout for non-streaming backend calls
    pub request_timeout_secs: Option<u64>,
    /// tracing filter directive, e.g. `spacechat=debug`
    pub log_filter: Option<String>,
}

impl Config {
    pub fn backend_url(&self) -> &str {
        self.backend_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BACKEND_URL)
    }

    pub fn upload_ack_delay(&self) -> Duration {
        Duration::from_millis(
            self.upload_ack_delay_ms
                .unwrap_or(DEFAULT_UPLOAD_ACK_DELAY_MS),
        )
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
