use std::collections::HashMap;

use async_trait::async_trait;
use linkbot_backend::FirmwareVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const METADATA_PATH: &str = "/firmware/metadata.json";

/// Expected md5 sums for the two halves of one firmware version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareChecksums {
    pub hex: String,
    pub eeprom: String,
}

/// The firmware metadata document published next to the firmware files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareMetadata {
    /// Running Linkbot Labs version -> firmware versions, recommended first.
    #[serde(rename = "linkbotlabs-firmware", default)]
    pub linkbotlabs_firmware: HashMap<String, Vec<String>>,
    #[serde(rename = "firmware-md5sums", default)]
    pub firmware_md5sums: HashMap<String, FirmwareChecksums>,
}

impl FirmwareMetadata {
    /// Firmware list advertised for a running application version. Keys are
    /// matched both bare and with a `v` prefix.
    #[must_use]
    pub fn firmware_for(&self, labs_version: &FirmwareVersion) -> Option<&[String]> {
        let bare = labs_version.to_string();
        self.linkbotlabs_firmware
            .get(&bare)
            .or_else(|| self.linkbotlabs_firmware.get(&labs_version.file_stem()))
            .map(Vec::as_slice)
    }

    #[must_use]
    pub fn recommended_for(&self, labs_version: &FirmwareVersion) -> Option<&str> {
        self.firmware_for(labs_version)?.first().map(String::as_str)
    }

    /// Checksums for an advertised firmware version string, falling back to
    /// the canonical spelling of the parsed version.
    #[must_use]
    pub fn checksums_for(
        &self,
        advertised: &str,
        version: &FirmwareVersion,
    ) -> Option<&FirmwareChecksums> {
        self.firmware_md5sums
            .get(advertised)
            .or_else(|| self.firmware_md5sums.get(&version.to_string()))
            .or_else(|| self.firmware_md5sums.get(&version.file_stem()))
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to fetch firmware metadata: {0}")]
    Request(#[source] reqwest::Error),
    #[error("firmware metadata request failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse firmware metadata: {0}")]
    Parse(#[source] reqwest::Error),
}

/// Where firmware metadata comes from.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> Result<FirmwareMetadata, MetadataError>;
}

/// Fetches `http://<host>/firmware/metadata.json`.
#[derive(Debug, Clone)]
pub struct HttpMetadataSource {
    client: reqwest::Client,
    host: String,
}

impl HttpMetadataSource {
    #[must_use]
    pub fn new(client: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}{METADATA_PATH}", self.host)
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch(&self) -> Result<FirmwareMetadata, MetadataError> {
        let response = self
            .client
            .get(self.url())
            .send()
            .await
            .map_err(MetadataError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(MetadataError::HttpStatus {
                status,
                body_snippet,
            });
        }

        response.json().await.map_err(MetadataError::Parse)
    }
}

/// Download URL for one firmware file, e.g. `http://host/firmware/v4.5.1.hex`.
#[must_use]
pub fn firmware_file_url(host: &str, file_name: &str) -> String {
    format!("http://{host}/firmware/{file_name}")
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
