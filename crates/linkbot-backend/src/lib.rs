//! Shared types and collaborator traits for the Linkbot firmware updater.

mod error;
mod traits;
mod types;

pub use error::{BridgeError, ConfigError};
pub use traits::{Clock, ConfigStore, FirmwareBridge, SystemClock};
pub use types::{FirmwareDownload, FirmwareVersion, VersionComponent, VersionParseError};
