//! Periodic firmware update checks.
//!
//! The scheduler waits, fetches the firmware metadata document, records the
//! recommended firmware for the running Linkbot Labs version and downloads it
//! if it is missing. A successful check re-arms after [`CHECK_INTERVAL`], a
//! failed one after [`RETRY_INTERVAL`]. The absolute time of the next check is
//! persisted before every wait so a restart resumes the same schedule.

use std::sync::Arc;
use std::time::Duration;

use linkbot_backend::{
    BridgeError, Clock, ConfigStore, FirmwareBridge, FirmwareDownload, FirmwareVersion,
    VersionParseError,
};
use log::{debug, info, warn};
use serde_json::json;
use thiserror::Error;

use crate::metadata::{FirmwareMetadata, MetadataError, MetadataSource, firmware_file_url};
use crate::update::{LATEST_REMOTE_FIRMWARE_VERSION_KEY, available_versions};

pub const NEXT_CHECK_KEY: &str = "nextCheck";
pub const CHECK_INTERVAL: Duration = Duration::from_millis(60_000);
pub const RETRY_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("bridge did not report a running Linkbot Labs version")]
    UnknownLabsVersion,
    #[error("firmware metadata lists no firmware for Linkbot Labs {0}")]
    NoFirmwareListed(FirmwareVersion),
    #[error("advertised firmware version {advertised:?} is invalid: {source}")]
    InvalidAdvertisedVersion {
        advertised: String,
        #[source]
        source: VersionParseError,
    },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to list local firmware: {0}")]
    List(#[source] BridgeError),
    #[error("firmware metadata has no md5 sums for {0}")]
    MissingChecksums(FirmwareVersion),
    #[error("failed to download {file}: {source}")]
    Bridge {
        file: String,
        #[source]
        source: BridgeError,
    },
}

#[derive(Debug)]
pub enum DownloadStatus {
    AlreadyAvailable,
    Downloaded,
    /// Every half that failed; halves not listed here were saved.
    Failed(Vec<DownloadError>),
}

/// Result of a check that reached the metadata server.
#[derive(Debug)]
pub struct CheckReport {
    pub recommended: FirmwareVersion,
    pub download: DownloadStatus,
}

/// Delay until the persisted next check, clamped to `0..=CHECK_INTERVAL`.
///
/// A missing timestamp means "now". The clamp keeps a clock that jumped in
/// either direction from producing a negative or unbounded wait.
#[must_use]
pub fn initial_delay(next_check_ms: Option<i64>, now_ms: i64) -> Duration {
    let ceiling = i64::try_from(CHECK_INTERVAL.as_millis()).unwrap_or(i64::MAX);
    let remaining = next_check_ms
        .unwrap_or(now_ms)
        .saturating_sub(now_ms)
        .clamp(0, ceiling);
    Duration::from_millis(remaining.unsigned_abs())
}

#[must_use]
pub fn next_delay(result: &Result<CheckReport, CheckError>) -> Duration {
    if result.is_ok() {
        CHECK_INTERVAL
    } else {
        RETRY_INTERVAL
    }
}

pub struct FirmwareUpdateScheduler {
    bridge: Arc<dyn FirmwareBridge>,
    config: Arc<dyn ConfigStore>,
    metadata: Arc<dyn MetadataSource>,
    clock: Arc<dyn Clock>,
    firmware_host: String,
}

impl FirmwareUpdateScheduler {
    #[must_use]
    pub fn new(
        bridge: Arc<dyn FirmwareBridge>,
        config: Arc<dyn ConfigStore>,
        metadata: Arc<dyn MetadataSource>,
        clock: Arc<dyn Clock>,
        firmware_host: impl Into<String>,
    ) -> Self {
        Self {
            bridge,
            config,
            metadata,
            clock,
            firmware_host: firmware_host.into(),
        }
    }

    /// Delay before the first check after start-up.
    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        initial_delay(self.config.get_i64(NEXT_CHECK_KEY), self.clock.now_ms())
    }

    /// Persist `nextCheck = now + delay`. A failed write is logged and
    /// otherwise ignored; the worst outcome is an early re-check after restart.
    pub fn schedule(&self, delay: Duration) {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let next_check = self.clock.now_ms().saturating_add(delay_ms);
        if let Err(error) = self.config.set(NEXT_CHECK_KEY, json!(next_check)) {
            warn!("Failed to persist next firmware check time: {error}");
        }
        debug!("Next firmware check in {} ms", delay.as_millis());
    }

    /// Check forever. Checks never overlap.
    pub async fn run(&self) {
        let mut delay = self.startup_delay();
        loop {
            self.schedule(delay);
            tokio::time::sleep(delay).await;
            delay = self.run_check().await;
        }
    }

    /// One check with logging; returns the delay before the next one.
    pub async fn run_check(&self) -> Duration {
        let result = self.check_once().await;
        match &result {
            Ok(report) => match &report.download {
                DownloadStatus::AlreadyAvailable => {
                    debug!("Firmware {} is already available", report.recommended);
                }
                DownloadStatus::Downloaded => {
                    info!("Downloaded firmware {}", report.recommended);
                }
                DownloadStatus::Failed(errors) => {
                    for error in errors {
                        warn!("Firmware {} download failed: {error}", report.recommended);
                    }
                }
            },
            Err(error) => warn!("Firmware update check failed: {error}"),
        }
        next_delay(&result)
    }

    /// Fetch metadata, record the recommended firmware and download it if
    /// missing. Download problems do not fail the check.
    ///
    /// # Errors
    /// Returns an error when the metadata cannot be fetched or does not name
    /// a usable firmware for the running application.
    pub async fn check_once(&self) -> Result<CheckReport, CheckError> {
        let metadata = self.metadata.fetch().await?;
        let labs_version = self
            .bridge
            .linkbot_labs_version()
            .ok_or(CheckError::UnknownLabsVersion)?;
        let advertised = metadata
            .recommended_for(&labs_version)
            .ok_or(CheckError::NoFirmwareListed(labs_version))?
            .to_string();

        if let Err(error) = self
            .config
            .set(LATEST_REMOTE_FIRMWARE_VERSION_KEY, json!(advertised))
        {
            warn!("Failed to persist latest remote firmware version: {error}");
        }

        let recommended: FirmwareVersion =
            advertised
                .parse()
                .map_err(|source| CheckError::InvalidAdvertisedVersion {
                    advertised: advertised.clone(),
                    source,
                })?;

        let download = self
            .ensure_downloaded(&metadata, &advertised, &recommended)
            .await;
        Ok(CheckReport {
            recommended,
            download,
        })
    }

    async fn ensure_downloaded(
        &self,
        metadata: &FirmwareMetadata,
        advertised: &str,
        version: &FirmwareVersion,
    ) -> DownloadStatus {
        match available_versions(self.bridge.as_ref()).await {
            Ok(local) if local.contains(version) => return DownloadStatus::AlreadyAvailable,
            Ok(_) => {}
            Err(error) => return DownloadStatus::Failed(vec![DownloadError::List(error)]),
        }

        let Some(checksums) = metadata.checksums_for(advertised, version) else {
            return DownloadStatus::Failed(vec![DownloadError::MissingChecksums(*version)]);
        };

        info!("Downloading firmware {version}");
        let mut errors = Vec::new();
        for (file, md5sum) in [
            (version.hex_file_name(), &checksums.hex),
            (version.eeprom_file_name(), &checksums.eeprom),
        ] {
            let download = FirmwareDownload {
                url: firmware_file_url(&self.firmware_host, &file),
                md5sum: md5sum.clone(),
            };
            if let Err(source) = self.bridge.save_firmware_file(&download).await {
                errors.push(DownloadError::Bridge { file, source });
            }
        }

        if errors.is_empty() {
            DownloadStatus::Downloaded
        } else {
            DownloadStatus::Failed(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use linkbot_backend::{ConfigStore, FirmwareVersion};
    use serde_json::json;

    use super::*;
    use crate::metadata::{FirmwareChecksums, FirmwareMetadata};
    use crate::testing::{FixedClock, MemoryConfig, MockBridge, QueuedMetadata};

    const NOW: i64 = 1_700_000_000_000;
    const HOST: &str = "firmware.test";

    fn metadata() -> FirmwareMetadata {
        FirmwareMetadata {
            linkbotlabs_firmware: HashMap::from([
                (
                    "1.2.0".to_string(),
                    vec!["4.5.1".to_string(), "4.5.0".to_string()],
                ),
                ("1.3.0".to_string(), vec!["garbage".to_string()]),
            ]),
            firmware_md5sums: HashMap::from([(
                "4.5.1".to_string(),
                FirmwareChecksums {
                    hex: "hexsum".to_string(),
                    eeprom: "eepromsum".to_string(),
                },
            )]),
        }
    }

    struct Fixture {
        bridge: Arc<MockBridge>,
        config: Arc<MemoryConfig>,
        source: Arc<QueuedMetadata>,
        scheduler: FirmwareUpdateScheduler,
    }

    fn fixture(
        bridge: MockBridge,
        config: MemoryConfig,
        responses: Vec<Option<FirmwareMetadata>>,
    ) -> Fixture {
        let bridge = Arc::new(bridge);
        let config = Arc::new(config);
        let source = Arc::new(QueuedMetadata::new(responses));
        let scheduler = FirmwareUpdateScheduler::new(
            bridge.clone(),
            config.clone(),
            source.clone(),
            Arc::new(FixedClock::at(NOW)),
            HOST,
        );
        Fixture {
            bridge,
            config,
            source,
            scheduler,
        }
    }

    #[test]
    fn initial_delay_clamps_past_timestamps_to_zero() {
        assert_eq!(initial_delay(Some(NOW - 5_000), NOW), Duration::ZERO);
    }

    #[test]
    fn initial_delay_clamps_far_future_to_interval() {
        assert_eq!(initial_delay(Some(NOW + 10 * 60 * 1_000), NOW), CHECK_INTERVAL);
    }

    #[test]
    fn initial_delay_keeps_remaining_time_within_interval() {
        assert_eq!(
            initial_delay(Some(NOW + 12_345), NOW),
            Duration::from_millis(12_345)
        );
    }

    #[test]
    fn initial_delay_without_timestamp_is_immediate() {
        assert_eq!(initial_delay(None, NOW), Duration::ZERO);
    }

    #[test]
    fn initial_delay_survives_extreme_values() {
        assert_eq!(initial_delay(Some(i64::MIN), i64::MAX), Duration::ZERO);
        assert_eq!(initial_delay(Some(i64::MAX), i64::MIN), CHECK_INTERVAL);
    }

    #[test]
    fn startup_delay_reads_persisted_next_check() {
        let fx = fixture(
            MockBridge::default(),
            MemoryConfig::with([(NEXT_CHECK_KEY, json!(NOW + 30_000))]),
            Vec::new(),
        );
        assert_eq!(fx.scheduler.startup_delay(), Duration::from_millis(30_000));
    }

    #[test]
    fn schedule_persists_absolute_next_check() {
        let fx = fixture(MockBridge::default(), MemoryConfig::default(), Vec::new());

        fx.scheduler.schedule(RETRY_INTERVAL);

        assert_eq!(fx.config.get_i64(NEXT_CHECK_KEY), Some(NOW + 10_000));
    }

    #[test]
    fn schedule_tolerates_config_write_failure() {
        let fx = fixture(MockBridge::default(), MemoryConfig::read_only(), Vec::new());

        fx.scheduler.schedule(CHECK_INTERVAL);

        assert_eq!(fx.config.get(NEXT_CHECK_KEY), None);
    }

    #[tokio::test]
    async fn check_downloads_missing_recommended_firmware() {
        let fx = fixture(
            MockBridge::with_files(["v4.5.0.hex", "v4.5.0.eeprom"])
                .running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        let report = fx.scheduler.check_once().await.expect("check succeeds");

        assert_eq!(report.recommended, FirmwareVersion::new(4, 5, 1));
        assert!(matches!(report.download, DownloadStatus::Downloaded));
        assert_eq!(
            fx.config.get_string(LATEST_REMOTE_FIRMWARE_VERSION_KEY).as_deref(),
            Some("4.5.1")
        );
        assert_eq!(
            fx.bridge.downloads(),
            vec![
                FirmwareDownload {
                    url: "http://firmware.test/firmware/v4.5.1.hex".to_string(),
                    md5sum: "hexsum".to_string(),
                },
                FirmwareDownload {
                    url: "http://firmware.test/firmware/v4.5.1.eeprom".to_string(),
                    md5sum: "eepromsum".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn check_skips_download_when_pair_is_present() {
        let fx = fixture(
            MockBridge::with_files(["v4.5.1.hex", "v4.5.1.eeprom"])
                .running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        let report = fx.scheduler.check_once().await.expect("check succeeds");

        assert!(matches!(report.download, DownloadStatus::AlreadyAvailable));
        assert!(fx.bridge.downloads().is_empty());
    }

    #[tokio::test]
    async fn check_downloads_even_when_config_write_fails() {
        let fx = fixture(
            MockBridge::default().running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::read_only(),
            vec![Some(metadata())],
        );

        let result = fx.scheduler.check_once().await;

        assert_eq!(next_delay(&result), CHECK_INTERVAL);
        let report = result.expect("check succeeds");
        assert!(matches!(report.download, DownloadStatus::Downloaded));
        assert_eq!(fx.config.get(LATEST_REMOTE_FIRMWARE_VERSION_KEY), None);
        assert_eq!(fx.bridge.downloads().len(), 2);
    }

    #[tokio::test]
    async fn check_downloads_when_only_one_half_is_present() {
        let fx = fixture(
            MockBridge::with_files(["v4.5.1.hex"]).running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        fx.scheduler.check_once().await.expect("check succeeds");

        assert_eq!(fx.bridge.downloads().len(), 2);
    }

    #[tokio::test]
    async fn download_failure_still_rearms_full_interval() {
        let fx = fixture(
            MockBridge::default()
                .running(FirmwareVersion::new(1, 2, 0))
                .failing_downloads(),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        let result = fx.scheduler.check_once().await;

        assert!(matches!(
            result,
            Ok(CheckReport {
                download: DownloadStatus::Failed(ref errors),
                ..
            }) if errors.len() == 2
        ));
        assert_eq!(next_delay(&result), CHECK_INTERVAL);
    }

    #[tokio::test]
    async fn missing_checksums_refuse_download() {
        let mut document = metadata();
        document.firmware_md5sums.clear();
        let fx = fixture(
            MockBridge::default().running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::default(),
            vec![Some(document)],
        );

        let report = fx.scheduler.check_once().await.expect("check succeeds");

        assert!(matches!(
            report.download,
            DownloadStatus::Failed(ref errors)
                if matches!(errors.as_slice(), [DownloadError::MissingChecksums(_)])
        ));
        assert!(fx.bridge.downloads().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_uses_retry_interval() {
        let fx = fixture(
            MockBridge::default().running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::default(),
            vec![None],
        );

        let result = fx.scheduler.check_once().await;

        assert!(matches!(result, Err(CheckError::Metadata(_))));
        assert_eq!(next_delay(&result), RETRY_INTERVAL);
    }

    #[tokio::test]
    async fn unknown_running_version_is_retried() {
        let fx = fixture(
            MockBridge::default().running(FirmwareVersion::new(9, 0, 0)),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        let delay = fx.scheduler.run_check().await;

        assert_eq!(delay, RETRY_INTERVAL);
        assert_eq!(
            fx.config.get_string(LATEST_REMOTE_FIRMWARE_VERSION_KEY),
            None
        );
    }

    #[tokio::test]
    async fn bridge_without_running_version_is_retried() {
        let fx = fixture(
            MockBridge::default(),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        let result = fx.scheduler.check_once().await;

        assert!(matches!(result, Err(CheckError::UnknownLabsVersion)));
    }

    #[tokio::test]
    async fn invalid_advertised_version_is_persisted_but_not_downloaded() {
        let fx = fixture(
            MockBridge::default().running(FirmwareVersion::new(1, 3, 0)),
            MemoryConfig::default(),
            vec![Some(metadata())],
        );

        let result = fx.scheduler.check_once().await;

        assert!(matches!(
            result,
            Err(CheckError::InvalidAdvertisedVersion { ref advertised, .. }) if advertised == "garbage"
        ));
        assert_eq!(
            fx.config.get_string(LATEST_REMOTE_FIRMWARE_VERSION_KEY).as_deref(),
            Some("garbage")
        );
        assert!(fx.bridge.downloads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_alternates_retry_and_check_intervals() {
        let fx = fixture(
            MockBridge::with_files(["v4.5.1.hex", "v4.5.1.eeprom"])
                .running(FirmwareVersion::new(1, 2, 0)),
            MemoryConfig::default(),
            vec![None, Some(metadata())],
        );

        // t=0 fails, t=10s succeeds, t=70s fails again; the timeout lands
        // during the following 10s retry wait.
        let outcome =
            tokio::time::timeout(Duration::from_secs(75), fx.scheduler.run()).await;

        assert!(outcome.is_err(), "scheduler loop never returns");
        assert_eq!(fx.source.fetches(), 3);
        assert_eq!(fx.config.get_i64(NEXT_CHECK_KEY), Some(NOW + 10_000));
    }
}
