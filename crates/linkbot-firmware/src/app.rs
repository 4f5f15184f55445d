use std::sync::Arc;
use std::time::Duration;

use linkbot_backend::{FirmwareVersion, SystemClock};
use linkbot_core::{FirmwareUpdateScheduler, HttpMetadataSource, latest_version, start_updater};
use linkbot_platform::AppPaths;
use log::info;

use crate::bridge::{FlasherCommand, LocalBridge};
use crate::config_store::JsonConfigStore;
use crate::error::AppError;
use crate::settings::AppSettings;

/// Collaborators wired together once per process.
pub struct App {
    bridge: Arc<LocalBridge>,
    config: Arc<JsonConfigStore>,
    scheduler: FirmwareUpdateScheduler,
}

impl App {
    /// # Errors
    /// Returns an error when the application directories cannot be created or
    /// the HTTP client cannot be built.
    pub fn new(paths: &AppPaths, settings: &AppSettings) -> Result<Self, AppError> {
        paths.ensure_dirs().map_err(AppError::Dirs)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .user_agent(format!("linkbot-firmware/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AppError::HttpClient)?;

        let bridge = Arc::new(LocalBridge::new(
            settings.firmware_dir(paths),
            client.clone(),
            FlasherCommand {
                program: settings.flasher_program.clone(),
                args: settings.flasher_args.clone(),
            },
            settings.labs_version(),
        ));
        let config = Arc::new(JsonConfigStore::open(paths.state_file()));
        let metadata = Arc::new(HttpMetadataSource::new(
            client,
            settings.firmware_host.clone(),
        ));
        let scheduler = FirmwareUpdateScheduler::new(
            bridge.clone(),
            config.clone(),
            metadata,
            Arc::new(SystemClock),
            settings.firmware_host.clone(),
        );

        info!(
            "Firmware store {}, metadata host {}",
            bridge.firmware_dir().display(),
            settings.firmware_host
        );

        Ok(Self {
            bridge,
            config,
            scheduler,
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> &FirmwareUpdateScheduler {
        &self.scheduler
    }

    /// # Errors
    /// Returns an error if the firmware store cannot be listed.
    pub async fn latest_version(&self) -> Result<Option<FirmwareVersion>, AppError> {
        Ok(latest_version(self.bridge.as_ref(), self.config.as_ref()).await?)
    }

    /// # Errors
    /// Returns an error if no firmware is available or flashing fails.
    pub async fn flash_latest(&self) -> Result<FirmwareVersion, AppError> {
        Ok(start_updater(self.bridge.as_ref(), self.config.as_ref()).await?)
    }
}
