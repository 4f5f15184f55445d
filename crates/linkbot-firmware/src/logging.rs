#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use linkbot_platform::AppPaths;

/// Appends to the log file, recreating it if it was deleted while running.
struct ResilientFileWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ResilientFileWriter {
    fn new(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn ensure_file(&self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *guard = Some(file);
        }

        Ok(())
    }
}

impl Write for ResilientFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_file()?;
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ref mut file) = *guard {
            file.write(buf)
        } else {
            Err(io::Error::other("File not available"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ref mut file) = *guard {
            file.flush()
        } else {
            Ok(())
        }
    }
}

/// Keep the newer half of the log, cut at a line boundary, once it grows
/// past `max_log_size`. A missing log is not an error.
fn trim_log_file_if_oversized(log_path: &Path, max_log_size: u64) -> io::Result<()> {
    let len = match std::fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    };
    if len <= max_log_size {
        return Ok(());
    }

    let contents = std::fs::read(log_path)?;
    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(half, |pos| half + pos + 1);
    std::fs::write(log_path, &contents[keep_from..])
}

/// Log to `firmware.log` in the data directory, and to the terminal in debug
/// builds. Only `info` and above are kept unless `debug_enabled` is set.
pub fn init_logging(paths: &AppPaths, debug_enabled: bool, max_log_size: u64) {
    if let Err(error) = paths.ensure_dirs() {
        eprintln!("Failed to create application directories: {error}");
    }
    let log_path = paths.log_file();

    if let Err(error) = trim_log_file_if_oversized(&log_path, max_log_size) {
        eprintln!("Failed to trim log file {}: {error}", log_path.display());
    }

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("linkbot")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    if let Ok(writer) = ResilientFileWriter::new(log_path.clone()) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, writer));
    }

    let _ = CombinedLogger::init(loggers);

    set_debug_logging(debug_enabled);
    log::debug!("Debug logging enabled, log file: {}", log_path.display());
}

pub fn set_debug_logging(enabled: bool) {
    if enabled {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{ResilientFileWriter, set_debug_logging, trim_log_file_if_oversized};

    #[test]
    fn resilient_writer_recreates_missing_file_on_write() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("firmware.log");
        let mut writer =
            ResilientFileWriter::new(log_path.clone()).expect("writer should open log file");

        writer
            .write_all(b"first line\n")
            .expect("initial write should succeed");
        std::fs::remove_file(&log_path).expect("log file should be removable");
        writer
            .write_all(b"second line\n")
            .expect("writer should recreate file after deletion");

        let contents =
            std::fs::read_to_string(&log_path).expect("recreated file should be readable");
        assert_eq!(contents, "second line\n");
    }

    #[test]
    fn trim_log_file_keeps_recent_half() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("firmware.log");
        let original = "line-1\nline-2\nline-3\nline-4\nline-5\n";
        std::fs::write(&log_path, original).expect("test log file should be written");

        trim_log_file_if_oversized(&log_path, 10).expect("log file should be trimmed");

        let trimmed =
            std::fs::read_to_string(&log_path).expect("trimmed log file should be readable");
        assert!(trimmed.starts_with("line-4\n") || trimmed.starts_with("line-3\n"));
        assert!(!trimmed.contains("line-1"));
    }

    #[test]
    fn trim_log_file_ignores_missing_file() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");

        trim_log_file_if_oversized(&temp_dir.path().join("firmware.log"), 0)
            .expect("missing log is not an error");
    }

    #[test]
    fn trim_log_file_reports_unreadable_log() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("firmware.log");
        std::fs::create_dir(&log_path).expect("directory in place of the log");
        std::fs::write(log_path.join("entry"), "x").expect("directory is not empty");

        assert!(trim_log_file_if_oversized(&log_path, 0).is_err());
    }

    #[test]
    fn set_debug_logging_updates_global_level() {
        set_debug_logging(true);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);

        set_debug_logging(false);
        assert_eq!(log::max_level(), log::LevelFilter::Info);
    }
}
