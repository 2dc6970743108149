//! This module defines the logging facilities, built on tracing.
//!
//! Log records go to the terminal (stderr, so that stdout stays a clean data channel for the
//! lookup commands) and to a log file. By default, only the log files of the last 15 runs will
//! be kept.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// -------------------------------------------------------------------------------------------------
// Logger
// -------------------------------------------------------------------------------------------------

/// Configured logging setup, ready to be started.
#[derive(Debug)]
pub(crate) struct Logger {
    verbosity: u8,
    log_dir: PathBuf,
    max_logs: usize,
}

#[derive(Debug, Default)]
pub(crate) struct LoggerBuilder {
    verbosity: u8,
    log_dir: Option<PathBuf>,
    max_logs: Option<usize>,
}

impl LoggerBuilder {
    // --
    // * Builders

    pub(crate) fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub(crate) fn with_log_dir<P: AsRef<Path>>(mut self, log_dir: P) -> Self {
        self.log_dir = Some(log_dir.as_ref().to_path_buf());
        self
    }

    pub(crate) fn with_max_logs(mut self, max_logs: usize) -> Self {
        self.max_logs = Some(max_logs);
        self
    }

    /// Resolves the log directory (creating it if necessary) and returns the configured logger.
    ///
    /// # Errors
    /// Returns an error if the log directory cannot be determined or created.
    pub(crate) fn build(self) -> Result<Logger> {
        let log_dir = match self.log_dir {
            Some(dir) => dir,
            None => get_default_log_dir()?,
        };
        fs::create_dir_all(&log_dir)
            .wrap_err_with(|| format!("Failed to create log directory at {:?}", log_dir))?;

        Ok(Logger {
            verbosity: self.verbosity,
            log_dir,
            max_logs: self.max_logs.unwrap_or(15),
        })
    }
}

impl Logger {
    /// Initializes the global tracing subscriber with a terminal layer and a file layer.
    ///
    /// Performs log rotation first, then opens a fresh timestamped log file. The returned guard
    /// must be kept alive for the duration of the program; dropping it flushes and stops the
    /// non-blocking file writer.
    ///
    /// # Errors
    /// Returns an error if the log file cannot be created or a global subscriber is already set.
    pub(crate) fn start(&self) -> Result<WorkerGuard> {
        rotate_logs(&self.log_dir, self.max_logs)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_file_path = self.log_dir.join(format!("userdeploy_{}.log", timestamp));
        let log_file = fs::File::create(&log_file_path)
            .wrap_err_with(|| format!("Failed to create log file at {:?}", log_file_path))?;
        let (file_writer, guard) = tracing_appender::non_blocking(log_file);

        tracing_subscriber::registry()
            .with(ErrorLayer::default())
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_filter(self.env_filter()),
            )
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer)
                    .with_filter(self.env_filter()),
            )
            .try_init()
            .wrap_err("Failed to initialize logging")?;

        Ok(guard)
    }

    /// Builds the level filter from the verbosity (0 = Info, 1 = Debug, 2 = Trace), unless
    /// overridden through the `UD_LOG` environment variable.
    fn env_filter(&self) -> EnvFilter {
        let level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_env("UD_LOG")
            .unwrap_or_else(|_| EnvFilter::new(format!("userdeploy={}", level)))
    }
}

// -------------------------------------------------------------------------------------------------
// Log directory handling
// -------------------------------------------------------------------------------------------------

/// Get the directory where log files should be stored.
///
/// Uses `$XDG_DATA_HOME/userdeploy/logs` if available, otherwise defaults to
/// `~/.local/share/userdeploy/logs`.
pub(crate) fn get_default_log_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_eyre("Could not determine user's data directory")?
        .join("userdeploy")
        .join("logs"))
}

/// Rotate log files, keeping only the most recent ones.
///
/// # Arguments
///
/// * `log_dir` - Directory containing the log files
/// * `max_logs` - Number of log files to retain
///
/// # Errors
///
/// Returns an error if the directory cannot be read or old files cannot be removed.
fn rotate_logs<P: AsRef<Path>>(log_dir: P, max_logs: usize) -> Result<()> {
    // Get all log files
    let mut log_files: Vec<_> = fs::read_dir(&log_dir)
        .wrap_err_with(|| format!("Failed to read log directory {:?}", log_dir.as_ref()))?
        // Filter out entries which could not be read (should be zero).
        .filter_map(|entry| entry.ok())
        // Filter out entries with extensions other than .log
        .filter(|path| path.path().extension().is_some_and(|ext| ext == "log"))
        .collect();

    // Sort by file name and reverse order -> newest first
    log_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    log_files.reverse();

    // Remove old logs
    for old_log in log_files.iter().skip(max_logs) {
        fs::remove_file(old_log.path())
            .wrap_err_with(|| format!("Failed to remove old log file {:?}", old_log.path()))?;
    }

    Ok(())
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_log_rotation() -> Result<()> {
        let temp_dir = tempdir()?;
        // Create more log files than will be retained
        for i in 0..10 {
            // Simulate different timestamps
            let log_file = temp_dir
                .path()
                .join(format!("userdeploy_20250824_21441{}.log", i));
            File::create(&log_file)?;
        }
        for i in 0..5 {
            let log_file = temp_dir
                .path()
                .join(format!("userdeploy_20250824_21442{}.log", i));
            File::create(&log_file)?;
        }

        // Perform rotation
        rotate_logs(temp_dir.path(), 10)?;

        // Check number of remaining files
        let mut remaining_logs: Vec<_> = fs::read_dir(&temp_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        remaining_logs.sort();

        assert_eq!(remaining_logs.len(), 10, "Should keep exactly 10 log files");
        assert_eq!(
            remaining_logs[0],
            temp_dir.path().join("userdeploy_20250824_214415.log"),
            "Oldest retained file should be userdeploy_20250824_214415.log"
        );
        assert_eq!(
            remaining_logs[remaining_logs.len() - 1],
            temp_dir.path().join("userdeploy_20250824_214424.log"),
            "Newest retained file should be userdeploy_20250824_214424.log"
        );

        Ok(())
    }

    #[test]
    fn test_rotation_ignores_non_log_files() -> Result<()> {
        let temp_dir = tempdir()?;
        File::create(temp_dir.path().join("notes.txt"))?;
        File::create(temp_dir.path().join("userdeploy_20250824_214410.log"))?;

        rotate_logs(temp_dir.path(), 0)?;

        assert!(temp_dir.path().join("notes.txt").exists());
        assert!(!temp_dir.path().join("userdeploy_20250824_214410.log").exists());
        Ok(())
    }

    #[test]
    fn test_get_default_log_dir() -> Result<()> {
        let temp_dir = tempdir()?;

        temp_env::with_var("XDG_DATA_HOME", Some(temp_dir.path()), || -> Result<()> {
            let log_dir = get_default_log_dir()?;
            assert_eq!(
                log_dir,
                temp_dir.path().join("userdeploy").join("logs"),
                "Should use XDG_DATA_HOME when available"
            );
            Ok(())
        })?;

        Ok(())
    }
}
