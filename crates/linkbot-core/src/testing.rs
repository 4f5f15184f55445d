use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use linkbot_backend::{
    BridgeError, Clock, ConfigError, ConfigStore, FirmwareBridge, FirmwareDownload,
    FirmwareVersion,
};
use serde_json::Value;

use crate::metadata::{FirmwareMetadata, MetadataError, MetadataSource};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

type Flash = (FirmwareVersion, String, String);

#[derive(Default)]
pub(crate) struct MockBridge {
    files: Mutex<Vec<String>>,
    flashed: Mutex<Vec<Flash>>,
    downloads: Mutex<Vec<FirmwareDownload>>,
    labs_version: Option<FirmwareVersion>,
    fail_downloads: bool,
}

impl MockBridge {
    pub(crate) fn with_files<const N: usize>(files: [&str; N]) -> Self {
        Self {
            files: Mutex::new(files.iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn running(mut self, version: FirmwareVersion) -> Self {
        self.labs_version = Some(version);
        self
    }

    pub(crate) fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    pub(crate) fn flashed(&self) -> Vec<Flash> {
        lock(&self.flashed).clone()
    }

    pub(crate) fn downloads(&self) -> Vec<FirmwareDownload> {
        lock(&self.downloads).clone()
    }

    pub(crate) fn files(&self) -> Vec<String> {
        lock(&self.files).clone()
    }
}

#[async_trait]
impl FirmwareBridge for MockBridge {
    async fn list_firmware_files(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.files())
    }

    async fn firmware_update(
        &self,
        version: &FirmwareVersion,
        hex_file: &str,
        eeprom_file: &str,
    ) -> Result<(), BridgeError> {
        lock(&self.flashed).push((*version, hex_file.to_string(), eeprom_file.to_string()));
        Ok(())
    }

    async fn save_firmware_file(&self, download: &FirmwareDownload) -> Result<(), BridgeError> {
        lock(&self.downloads).push(download.clone());
        if self.fail_downloads {
            return Err(BridgeError::HttpStatus {
                url: download.url.clone(),
                status: 503,
            });
        }
        if let Some(name) = download.url.rsplit('/').next() {
            lock(&self.files).push(name.to_string());
        }
        Ok(())
    }

    fn linkbot_labs_version(&self) -> Option<FirmwareVersion> {
        self.labs_version
    }
}

#[derive(Default)]
pub(crate) struct MemoryConfig {
    values: Mutex<HashMap<String, Value>>,
    read_only: bool,
}

impl MemoryConfig {
    pub(crate) fn with<const N: usize>(entries: [(&str, Value); N]) -> Self {
        Self {
            values: Mutex::new(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value))
                    .collect(),
            ),
            read_only: false,
        }
    }

    pub(crate) fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }
}

impl ConfigStore for MemoryConfig {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        if self.read_only {
            return Err(ConfigError::Write {
                path: "memory".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }
}

pub(crate) struct FixedClock(AtomicI64);

impl FixedClock {
    pub(crate) fn at(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Serves queued documents, then fails with HTTP 503 once the queue is empty.
#[derive(Default)]
pub(crate) struct QueuedMetadata {
    responses: Mutex<VecDeque<Option<FirmwareMetadata>>>,
    fetches: AtomicUsize,
}

impl QueuedMetadata {
    /// `None` entries produce an HTTP 503 error.
    pub(crate) fn new(responses: impl IntoIterator<Item = Option<FirmwareMetadata>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for QueuedMetadata {
    async fn fetch(&self) -> Result<FirmwareMetadata, MetadataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.responses)
            .pop_front()
            .flatten()
            .ok_or(MetadataError::HttpStatus {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body_snippet: String::new(),
            })
    }
}
