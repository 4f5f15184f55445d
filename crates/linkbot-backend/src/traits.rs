use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BridgeError, ConfigError};
use crate::types::{FirmwareDownload, FirmwareVersion};

/// Host capabilities the firmware updater relies on.
///
/// Robot I/O lives elsewhere; this only covers the firmware files on local
/// storage, downloading new ones, and handing a pair to the flasher.
#[async_trait]
pub trait FirmwareBridge: Send + Sync {
    /// File names (not paths) present in the local firmware store.
    async fn list_firmware_files(&self) -> Result<Vec<String>, BridgeError>;

    async fn firmware_update(
        &self,
        version: &FirmwareVersion,
        hex_file: &str,
        eeprom_file: &str,
    ) -> Result<(), BridgeError>;

    /// Fetch `download.url` into the firmware store. Implementations verify
    /// the md5 sum before the file becomes visible to `list_firmware_files`.
    async fn save_firmware_file(&self, download: &FirmwareDownload) -> Result<(), BridgeError>;

    /// Version of the running Linkbot Labs application, if known.
    fn linkbot_labs_version(&self) -> Option<FirmwareVersion>;
}

/// Small persistent key-value store. Single writer, last write wins.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// # Errors
    /// Returns an error if the value could not be persisted.
    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError>;

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(number) => number.as_i64(),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }
}

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
