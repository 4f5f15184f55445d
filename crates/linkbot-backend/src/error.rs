use thiserror::Error;

/// Failures reported by a [`crate::FirmwareBridge`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Flasher command failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("Network error during {operation}: {details}")]
    NetworkError {
        operation: &'static str,
        details: String,
    },

    #[error("Download failed with HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid firmware file name: {name}")]
    InvalidFileName { name: String },

    #[error("IO error ({kind}): {message}")]
    IoError {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl BridgeError {
    pub fn network<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::NetworkError {
            operation,
            details: error.to_string(),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::IoError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Failures persisting a value through a [`crate::ConfigStore`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}
