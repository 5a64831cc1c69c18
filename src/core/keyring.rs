use std::error::Error;
use std::fmt;

/// Failure talking to the platform credential store.
///
/// `Unavailable` covers a locked or missing keychain service; callers may fall
/// back to another store. `Failed` is anything else and is reported as-is.
#[derive(Debug)]
pub enum KeyringError {
    Unavailable(keyring::Error),
    Failed(keyring::Error),
}

impl KeyringError {
    fn inner(&self) -> &keyring::Error {
        match self {
            KeyringError::Unavailable(err) | KeyringError::Failed(err) => err,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, KeyringError::Unavailable(_))
    }
}

impl From<keyring::Error> for KeyringError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_) => {
                KeyringError::Unavailable(err)
            }
            other => KeyringError::Failed(other),
        }
    }
}

impl fmt::Display for KeyringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringError::Unavailable(err) => write!(f, "keyring unavailable: {err}"),
            KeyringError::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl Error for KeyringError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.inner())
    }
}

/// One secret slot in the platform keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringSlot {
    service: String,
    user: String,
}

impl KeyringSlot {
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, KeyringError> {
        Ok(keyring::Entry::new(&self.service, &self.user)?)
    }

    /// `Ok(None)` when nothing has been stored yet.
    pub fn read(&self) -> Result<Option<String>, KeyringError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn write(&self, secret: &str) -> Result<(), KeyringError> {
        self.entry()?.set_password(secret)?;
        Ok(())
    }
}
