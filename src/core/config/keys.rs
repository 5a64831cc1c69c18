use crate::core::config::io::{project_dirs, write_atomically};
use crate::core::keyring::KeyringSlot;
use crate::core::settings::ApiKeys;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const KEYRING_SERVICE: &str = "spacechat";
pub const KEYRING_USER: &str = "api_keys";

/// Local mirror of the API keys, rewritten after every key change.
///
/// Keys live as one JSON secret in the OS keyring. The JSON file is read and
/// written only while the keyring is unavailable, or when no keyring slot is
/// configured. The backend stays authoritative: on startup its non-empty keys
/// override whatever the cache held.
#[derive(Debug, Clone)]
pub struct KeyCache {
    keyring: Option<KeyringSlot>,
    fallback: Option<PathBuf>,
}

impl KeyCache {
    pub const FILE_NAME: &'static str = "api_keys.json";

    /// File-only cache at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            keyring: None,
            fallback: Some(path.into()),
        }
    }

    pub fn keyring(slot: KeyringSlot, fallback: Option<PathBuf>) -> Self {
        Self {
            keyring: Some(slot),
            fallback,
        }
    }

    /// The `spacechat`/`api_keys` keyring entry, falling back to
    /// `api_keys.json` in the platform data directory.
    pub fn default_location() -> Self {
        let fallback = match project_dirs() {
            Ok(dirs) => Some(dirs.data_dir().join(Self::FILE_NAME)),
            Err(err) => {
                warn!(error = %err, "no data directory for the API key fallback file");
                None
            }
        };
        Self::keyring(KeyringSlot::new(KEYRING_SERVICE, KEYRING_USER), fallback)
    }

    pub fn fallback_path(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }

    pub fn load(&self) -> Result<ApiKeys, Box<dyn Error>> {
        if let Some(slot) = &self.keyring {
            match slot.read() {
                Ok(Some(secret)) => return Ok(serde_json::from_str(&secret)?),
                Ok(None) => return Ok(ApiKeys::default()),
                Err(err) if err.is_unavailable() && self.fallback.is_some() => {
                    warn!(error = %err, "reading API keys from the fallback file");
                }
                Err(err) => return Err(Box::new(err)),
            }
        }

        match &self.fallback {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                Ok(serde_json::from_str(&contents)?)
            }
            _ => Ok(ApiKeys::default()),
        }
    }

    pub fn save(&self, keys: &ApiKeys) -> Result<(), Box<dyn Error>> {
        let contents = serde_json::to_string(keys)?;

        if let Some(slot) = &self.keyring {
            match slot.write(&contents) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_unavailable() && self.fallback.is_some() => {
                    warn!(error = %err, "writing API keys to the fallback file");
                }
                Err(err) => return Err(Box::new(err)),
            }
        }

        match &self.fallback {
            Some(path) => write_atomically(path, contents.as_bytes()),
            None => Ok(()),
        }
    }
}
