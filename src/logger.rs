use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::ConfigManager;

/// Rotate the file log once it grows past this size
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Initialize the logging system
///
/// Console logging goes through `env_logger` and is controlled by `RUST_LOG`
/// (`error`, `warn`, `info`, `debug`, `trace`; default `info`). Every sync run is
/// additionally appended to `claude-code-archive.log` in the config directory,
/// which matters for unattended, scheduled runs:
///
/// ```bash
/// # Show debug messages on console
/// RUST_LOG=debug claude-code-archive sync
///
/// # No console output (file logging continues)
/// RUST_LOG=off claude-code-archive sync
/// ```
pub fn init_logger() -> Result<()> {
    ConfigManager::ensure_config_dir()?;
    rotate_log_if_needed(&ConfigManager::log_file_path()?)?;

    let default_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(default_level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok(); // Ignore error if logger is already initialized

    log_to_file(&format!("Logger initialized with level: {default_level:?}"))?;

    Ok(())
}

/// Append a line to the file log in the config directory
pub fn log_to_file(message: &str) -> Result<()> {
    append_to(&ConfigManager::log_file_path()?, message)
}

fn append_to(log_path: &Path, message: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;

    Ok(())
}

/// Rename the log to `.log.old` once it exceeds [`MAX_LOG_SIZE`]
pub fn rotate_log_if_needed(log_path: &Path) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(log_path)?;
    if metadata.len() > MAX_LOG_SIZE {
        let old_log_path = log_path.with_extension("log.old");
        if old_log_path.exists() {
            std::fs::remove_file(&old_log_path)?;
        }
        std::fs::rename(log_path, &old_log_path)?;
        log::info!("Log file rotated to {}", old_log_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_append_creates_and_appends() -> Result<()> {
        let temp = TempDir::new()?;
        let log_path = temp.path().join("archive.log");

        append_to(&log_path, "first")?;
        append_to(&log_path, "second")?;

        let contents = std::fs::read_to_string(&log_path)?;
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
        assert_eq!(contents.lines().count(), 2);

        Ok(())
    }

    #[test]
    fn test_rotate_log_creates_backup() -> Result<()> {
        let temp = TempDir::new()?;
        let log_path = temp.path().join("archive.log");

        let mut file = File::create(&log_path)?;
        file.write_all(&vec![b'a'; (MAX_LOG_SIZE + 1) as usize])?;
        drop(file);

        rotate_log_if_needed(&log_path)?;

        assert!(log_path.with_extension("log.old").exists());
        assert!(!log_path.exists());

        Ok(())
    }

    #[test]
    fn test_rotate_small_log_is_noop() -> Result<()> {
        let temp = TempDir::new()?;
        let log_path = temp.path().join("archive.log");
        append_to(&log_path, "tiny")?;

        rotate_log_if_needed(&log_path)?;

        assert!(log_path.exists());
        assert!(!log_path.with_extension("log.old").exists());
        Ok(())
    }
}
