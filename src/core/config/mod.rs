pub mod data;
pub mod io;
pub mod keys;

pub use data::{path_display, Config, DEFAULT_UPLOAD_ACK_DELAY_MS};
pub use io::ConfigError;
pub use keys::{KeyCache, KEYRING_SERVICE, KEYRING_USER};
