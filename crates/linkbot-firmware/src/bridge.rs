use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use linkbot_backend::{BridgeError, FirmwareBridge, FirmwareDownload, FirmwareVersion};
use linkbot_platform::HideWindow;
use log::{debug, info, warn};
use md5::{Digest, Md5};
use tokio::io::AsyncWriteExt;

/// External program that writes a firmware pair to a robot.
#[derive(Debug, Clone)]
pub struct FlasherCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FlasherCommand {
    fn render_args(&self, version: &FirmwareVersion, hex: &Path, eeprom: &Path) -> Vec<String> {
        let version = version.to_string();
        let hex = hex.display().to_string();
        let eeprom = eeprom.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{hex}", &hex)
                    .replace("{eeprom}", &eeprom)
                    .replace("{version}", &version)
            })
            .collect()
    }
}

/// [`FirmwareBridge`] backed by a local firmware directory, HTTP downloads
/// and an external flasher program.
#[derive(Debug, Clone)]
pub struct LocalBridge {
    firmware_dir: PathBuf,
    client: reqwest::Client,
    flasher: FlasherCommand,
    labs_version: Option<FirmwareVersion>,
}

impl LocalBridge {
    #[must_use]
    pub fn new(
        firmware_dir: PathBuf,
        client: reqwest::Client,
        flasher: FlasherCommand,
        labs_version: Option<FirmwareVersion>,
    ) -> Self {
        Self {
            firmware_dir,
            client,
            flasher,
            labs_version,
        }
    }

    #[must_use]
    pub fn firmware_dir(&self) -> &Path {
        &self.firmware_dir
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<String, BridgeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| BridgeError::network("firmware download", error))?;

        if !response.status().is_success() {
            return Err(BridgeError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Md5::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|error| BridgeError::network("firmware download stream", error))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {downloaded} bytes from {url}");
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Last path segment of a download URL, if it is a plain file name.
fn download_file_name(url: &str) -> Option<&str> {
    let name = url.rsplit('/').next()?;
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['\\', ':', '?', '#'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    valid.then_some(name)
}

#[async_trait]
impl FirmwareBridge for LocalBridge {
    async fn list_firmware_files(&self) -> Result<Vec<String>, BridgeError> {
        let mut entries = match tokio::fs::read_dir(&self.firmware_dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => continue,
                Err(error) => {
                    debug!(
                        "Skipping unreadable firmware entry {}: {error}",
                        entry.path().display()
                    );
                    continue;
                }
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => debug!("Skipping non UTF-8 firmware file name {name:?}"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn firmware_update(
        &self,
        version: &FirmwareVersion,
        hex_file: &str,
        eeprom_file: &str,
    ) -> Result<(), BridgeError> {
        let hex = self.firmware_dir.join(hex_file);
        let eeprom = self.firmware_dir.join(eeprom_file);
        let args = self.flasher.render_args(version, &hex, &eeprom);

        info!("Running flasher: {} {}", self.flasher.program, args.join(" "));
        let output = tokio::process::Command::new(&self.flasher.program)
            .args(&args)
            .hide_window()
            .output()
            .await?;

        if output.status.success() {
            info!("Firmware {version} flashed");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(BridgeError::CommandFailed {
                stderr: if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr
                },
            })
        }
    }

    async fn save_firmware_file(&self, download: &FirmwareDownload) -> Result<(), BridgeError> {
        let file_name =
            download_file_name(&download.url).ok_or_else(|| BridgeError::InvalidFileName {
                name: download.url.clone(),
            })?;

        tokio::fs::create_dir_all(&self.firmware_dir).await?;
        // Partial downloads stay inside the temp dir so they never show up
        // as a firmware half.
        let temp_dir = tempfile::Builder::new()
            .prefix(".download")
            .tempdir_in(&self.firmware_dir)?;
        let partial = temp_dir.path().join(file_name);

        let actual = self.download_to(&download.url, &partial).await?;
        if !actual.eq_ignore_ascii_case(download.md5sum.trim()) {
            warn!("Discarding {file_name}: md5 mismatch");
            return Err(BridgeError::ChecksumMismatch {
                file: file_name.to_string(),
                expected: download.md5sum.to_ascii_lowercase(),
                actual,
            });
        }

        tokio::fs::rename(&partial, self.firmware_dir.join(file_name)).await?;
        info!("Saved firmware file {file_name}");
        Ok(())
    }

    fn linkbot_labs_version(&self) -> Option<FirmwareVersion> {
        self.labs_version
    }
}
