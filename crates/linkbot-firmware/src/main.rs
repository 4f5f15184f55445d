//! `linkbot-firmware` entry point.
//!
//! - `linkbot-firmware` or `linkbot-firmware run`: check for firmware updates
//!   until interrupted
//! - `linkbot-firmware check`: run a single update check
//! - `linkbot-firmware latest`: print the firmware version that would be flashed
//! - `linkbot-firmware flash`: flash that version

use std::process::ExitCode;

use linkbot_firmware::{App, AppSettings, logging};
use linkbot_platform::AppPaths;
use log::{error, info};

const USAGE: &str = "usage: linkbot-firmware [run|check|latest|flash]";

#[tokio::main]
async fn main() -> ExitCode {
    let command = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());
    if matches!(command.as_str(), "help" | "-h" | "--help") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let settings = AppSettings::load(&paths);
    logging::init_logging(&paths, settings.debug_logging, settings.max_log_size_bytes);

    let app = match App::new(&paths, &settings) {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match command.as_str() {
        "run" => {
            info!("Starting firmware update checks");
            tokio::select! {
                () = app.scheduler().run() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {e}");
                        return ExitCode::FAILURE;
                    }
                    info!("Shutting down");
                }
            }
            ExitCode::SUCCESS
        }
        "check" => {
            let delay = app.scheduler().run_check().await;
            app.scheduler().schedule(delay);
            if delay == linkbot_core::CHECK_INTERVAL {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        "latest" => match app.latest_version().await {
            Ok(Some(version)) => {
                println!("{version}");
                ExitCode::SUCCESS
            }
            Ok(None) => {
                eprintln!("no firmware available locally");
                ExitCode::FAILURE
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
        "flash" => match app.flash_latest().await {
            Ok(version) => {
                println!("flashed firmware {version}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Flash failed: {e}");
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
        other => {
            eprintln!("unknown command: {other}\n{USAGE}");
            ExitCode::FAILURE
        }
    }
}
