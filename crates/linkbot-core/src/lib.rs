//! Firmware reconciliation for Linkbot robots.
//!
//! This crate holds the logic that is independent of the host bridge and
//! the binary:
//! - Pairing `.hex`/`.eeprom` files and enumerating local firmware versions.
//! - Fetching the firmware metadata document.
//! - Resolving which firmware to flash and triggering the flash.
//! - Scheduling periodic update checks with persisted resume state.

mod files;
mod metadata;
pub mod scheduler;
mod update;

#[cfg(test)]
mod testing;

/// Firmware file name pairing and local version enumeration.
pub use files::{
    SplitFilename, firmware_file_stems, local_firmware_versions, split_filename,
    version_from_stem,
};
/// Firmware metadata model and fetch helpers.
pub use metadata::{
    FirmwareChecksums, FirmwareMetadata, HttpMetadataSource, METADATA_PATH, MetadataError,
    MetadataSource, firmware_file_url,
};
/// Update-check scheduler.
pub use scheduler::{CHECK_INTERVAL, FirmwareUpdateScheduler, NEXT_CHECK_KEY, RETRY_INTERVAL};
/// Latest-version resolution and the flash trigger.
pub use update::{
    LATEST_REMOTE_FIRMWARE_VERSION_KEY, UpdateError, available_versions, latest_remote_version,
    latest_version, resolve_latest, start_updater,
};
