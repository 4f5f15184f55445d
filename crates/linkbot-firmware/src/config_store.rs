use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use linkbot_backend::{ConfigError, ConfigStore};
use log::warn;
use serde_json::{Map, Value};

/// JSON-file backed [`ConfigStore`]. Every `set` rewrites the whole file
/// atomically so a crash never leaves a half-written state file behind.
pub struct JsonConfigStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonConfigStore {
    /// Open the store at `path`. A missing or corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = load_values(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_values(path: &Path) -> Map<String, Value> {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Map::new();
    };
    match serde_json::from_str(&data) {
        Ok(Value::Object(values)) => values,
        Ok(_) => {
            warn!("State file {} is not a JSON object, starting fresh", path.display());
            Map::new()
        }
        Err(error) => {
            warn!("Failed to parse state file {}: {error}", path.display());
            Map::new()
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut updated = values.clone();
        updated.insert(key.to_string(), value);
        let data = serde_json::to_vec_pretty(&updated)?;
        write_atomic(&self.path, &data).map_err(|source| ConfigError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        *values = updated;
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "state path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut file = tempfile::Builder::new()
        .prefix(".state")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
