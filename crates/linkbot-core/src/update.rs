use std::collections::BTreeSet;

use linkbot_backend::{BridgeError, ConfigStore, FirmwareBridge, FirmwareVersion};
use log::{debug, info};
use thiserror::Error;

use crate::files::local_firmware_versions;

pub const LATEST_REMOTE_FIRMWARE_VERSION_KEY: &str = "latestRemoteFirmwareVersion";

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("no complete firmware pair is available locally")]
    NoLocalFirmware,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Pick the firmware version to flash.
///
/// The remote-advertised version wins over a numerically larger local one,
/// but only when its file pair is actually on disk.
#[must_use]
pub fn resolve_latest(
    local: &BTreeSet<FirmwareVersion>,
    remote: Option<FirmwareVersion>,
) -> Option<FirmwareVersion> {
    match remote {
        Some(remote) if local.contains(&remote) => Some(remote),
        _ => local.last().copied(),
    }
}

/// Versions with both halves present in the bridge's firmware store.
///
/// # Errors
/// Returns an error if the bridge cannot list its firmware files.
pub async fn available_versions(
    bridge: &dyn FirmwareBridge,
) -> Result<BTreeSet<FirmwareVersion>, BridgeError> {
    let files = bridge.list_firmware_files().await?;
    Ok(local_firmware_versions(&files))
}

/// Last firmware version the metadata server recommended, if it parses.
#[must_use]
pub fn latest_remote_version(config: &dyn ConfigStore) -> Option<FirmwareVersion> {
    let raw = config.get_string(LATEST_REMOTE_FIRMWARE_VERSION_KEY)?;
    match raw.parse() {
        Ok(version) => Some(version),
        Err(error) => {
            debug!("Ignoring persisted remote firmware version {raw:?}: {error}");
            None
        }
    }
}

/// # Errors
/// Returns an error if the bridge cannot list its firmware files.
pub async fn latest_version(
    bridge: &dyn FirmwareBridge,
    config: &dyn ConfigStore,
) -> Result<Option<FirmwareVersion>, BridgeError> {
    let local = available_versions(bridge).await?;
    Ok(resolve_latest(&local, latest_remote_version(config)))
}

/// Flash the latest locally available firmware through the bridge.
///
/// # Errors
/// Returns [`UpdateError::NoLocalFirmware`] when no firmware pair is on disk,
/// or the bridge error from listing or flashing.
pub async fn start_updater(
    bridge: &dyn FirmwareBridge,
    config: &dyn ConfigStore,
) -> Result<FirmwareVersion, UpdateError> {
    let version = latest_version(bridge, config)
        .await?
        .ok_or(UpdateError::NoLocalFirmware)?;

    let hex_file = version.hex_file_name();
    let eeprom_file = version.eeprom_file_name();
    info!("Flashing firmware {version} ({hex_file}, {eeprom_file})");
    bridge
        .firmware_update(&version, &hex_file, &eeprom_file)
        .await?;
    Ok(version)
}
