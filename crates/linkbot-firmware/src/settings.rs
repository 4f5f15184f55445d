use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use linkbot_backend::FirmwareVersion;
use linkbot_platform::AppPaths;
use log::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// `host[:port]` serving `/firmware/metadata.json` and the firmware files.
    #[serde(default = "default_firmware_host")]
    pub firmware_host: String,

    #[serde(default)]
    pub firmware_dir: Option<PathBuf>,

    #[serde(default = "default_flasher_program")]
    pub flasher_program: String,

    /// `{hex}`, `{eeprom}` and `{version}` are substituted in every argument.
    #[serde(default = "default_flasher_args")]
    pub flasher_args: Vec<String>,

    /// Overrides the Linkbot Labs version reported to the metadata lookup.
    #[serde(default)]
    pub labs_version: Option<String>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_firmware_host() -> String {
    "localhost:8080".to_string()
}

fn default_flasher_program() -> String {
    "avrdude".to_string()
}

fn default_flasher_args() -> Vec<String> {
    [
        "-p",
        "m128rfa1",
        "-c",
        "stk500v2",
        "-P",
        "/dev/ttyACM0",
        "-U",
        "flash:w:{hex}:i",
        "-U",
        "eeprom:w:{eeprom}:i",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            firmware_host: default_firmware_host(),
            firmware_dir: None,
            flasher_program: default_flasher_program(),
            flasher_args: default_flasher_args(),
            labs_version: None,
            http_timeout_secs: default_http_timeout(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(&paths.settings_file())
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                warn!("Ignoring invalid settings file {}: {error}", path.display());
                Self::default()
            }),
            Err(error) => {
                warn!("Failed to read settings file {}: {error}", path.display());
                Self::default()
            }
        }
    }

    pub fn firmware_dir(&self, paths: &AppPaths) -> PathBuf {
        self.firmware_dir
            .clone()
            .unwrap_or_else(|| paths.firmware_dir())
    }

    /// Running Linkbot Labs version: the configured override, else this
    /// package's own version.
    pub fn labs_version(&self) -> Option<FirmwareVersion> {
        match &self.labs_version {
            Some(raw) => match raw.parse() {
                Ok(version) => Some(version),
                Err(error) => {
                    warn!("Ignoring invalid labs_version setting {raw:?}: {error}");
                    None
                }
            },
            None => env!("CARGO_PKG_VERSION").parse().ok(),
        }
    }
}
