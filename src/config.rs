//! This module handles the configuration for the userdeploy application.
//!
//! It provides functionality to read, parse, and initialize the configuration from a TOML file or
//! use default values when necessary.

use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// -------------------------------------------------------------------------------------------------
// Userdeploy Config
// -------------------------------------------------------------------------------------------------

/// Representation of the userdeploy configuration.
///
/// This struct deserializes the configuration file. The file is expected to be found under
/// `$HOME/.config/userdeploy/config.toml`.
///
/// # Defaults
///
/// - `registry_cmd`: `"yunohost"` - Account management CLI holding the application users
/// - `use_sudo`: true - Allow privilege escalation for system user/group mutations
/// - `sudo_cmd`: `"sudo"` - Command used for privilege elevation (sudo/doas)
/// - `nologin_shell`: `"/usr/sbin/nologin"` - Shell forced onto accounts that must not log in
/// - `logs_dir`: `"$XDG_DATA_HOME/userdeploy/logs"` or `"~/.local/share/userdeploy/logs"`
/// - `logs_max`: 15 - Maximum number of log files to retain
///
/// # Example Configuration
/// To override options, your `config.toml` might look like this:
///
/// ```toml
/// registry_cmd = "yunohost"
/// sudo_cmd = "doas"
/// nologin_shell = "/sbin/nologin"
/// ```
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct UserdeployConfig {
    /// Path of the configuration file itself.
    #[allow(dead_code)]
    pub(crate) config_file: PathBuf,
    /// Account management CLI holding the application user registry.
    pub(crate) registry_cmd: String,
    /// Use sudo (or doas) to elevate privileges.
    pub(crate) use_sudo: bool,
    /// Command used for privilege elevation (sudo/doas).
    pub(crate) sudo_cmd: String,
    /// Shell assigned to system accounts that must not be able to log in.
    pub(crate) nologin_shell: PathBuf,
    /// Directory of the log files.
    pub(crate) logs_dir: PathBuf,
    /// Maximum number of log files to retain.
    pub(crate) logs_max: usize,
}

// -------------------------------------------------------------------------------------------------
// Config Builder
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UserdeployConfigBuilder {
    pub(crate) config_file: Option<PathBuf>,
    pub(crate) registry_cmd: Option<String>,
    pub(crate) use_sudo: Option<bool>,
    pub(crate) sudo_cmd: Option<String>,
    pub(crate) nologin_shell: Option<PathBuf>,
    pub(crate) logs_dir: Option<PathBuf>,
    pub(crate) logs_max: Option<usize>,
}

impl UserdeployConfigBuilder {
    // --
    // * Builders

    pub(crate) fn with_config_file(&mut self, config_file: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.config_file = config_file;
        new
    }

    pub(crate) fn with_registry_cmd(&mut self, registry_cmd: Option<String>) -> &mut Self {
        let new = self;
        new.registry_cmd = registry_cmd;
        new
    }

    pub(crate) fn with_use_sudo(&mut self, use_sudo: Option<bool>) -> &mut Self {
        let new = self;
        new.use_sudo = use_sudo;
        new
    }

    pub(crate) fn with_sudo_cmd(&mut self, sudo_cmd: Option<String>) -> &mut Self {
        let new = self;
        new.sudo_cmd = sudo_cmd;
        new
    }

    pub(crate) fn with_nologin_shell(&mut self, nologin_shell: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.nologin_shell = nologin_shell;
        new
    }

    pub(crate) fn with_logs_dir(&mut self, logs_dir: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.logs_dir = logs_dir;
        new
    }

    pub(crate) fn with_logs_max(&mut self, logs_max: Option<usize>) -> &mut Self {
        let new = self;
        new.logs_max = logs_max;
        new
    }

    /// Reads and returns the contents of a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    fn read_config_file(&self, path: &Path) -> Result<String> {
        let config_file_content: String = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config from {}", path.display()))?;

        Ok(config_file_content)
    }

    /// Constructs the final configuration by merging defaults, file values, and runtime overrides
    ///
    /// Resolution order (highest priority last):
    /// 1. Default values
    /// 2. Config file values
    /// 3. Explicit builder overrides
    ///
    /// Expands all paths and handles environment variables.
    pub(crate) fn build(&self, verbosity: u8) -> Result<UserdeployConfig> {
        // Determine the config file path based on environment variables
        let config_file_path = if let Some(ref path) = self.config_file {
            Clone::clone(path)
        } else {
            dirs::config_dir()
                .ok_or_eyre("Could not determine user's config directory")?
                .join("userdeploy")
                .join("config.toml")
        };

        // Try to read config file, use empty string if not found
        let conf_string = match self.read_config_file(&config_file_path) {
            Ok(s) => s,
            Err(_) => {
                if verbosity > 0 {
                    eprintln!("No config file found in {}", &config_file_path.display());
                    eprintln!("Default config values will be used")
                }
                "".to_string()
            }
        };
        let parsed_data: UserdeployConfigBuilder = toml::from_str(&conf_string)?;

        const DEFAULT_NOLOGIN_SHELL: &str = "/usr/sbin/nologin";
        const DEFAULT_REGISTRY_CMD: &str = "yunohost";

        let nologin_shell = match &self.nologin_shell {
            Some(path) => crate::utils::file_fs::expand_path(path)?,
            None => match &parsed_data.nologin_shell {
                Some(path) => crate::utils::file_fs::expand_path(path)?,
                None => PathBuf::from(DEFAULT_NOLOGIN_SHELL),
            },
        };

        let logs_dir = match &self.logs_dir {
            Some(path) => crate::utils::file_fs::expand_path(path)?,
            None => match &parsed_data.logs_dir {
                Some(path) => crate::utils::file_fs::expand_path(path)?,
                None => crate::logs::get_default_log_dir()?,
            },
        };

        Ok(UserdeployConfig {
            config_file: config_file_path,
            registry_cmd: match self.registry_cmd {
                Some(ref value) => Clone::clone(value),
                None => parsed_data
                    .registry_cmd
                    .unwrap_or_else(|| DEFAULT_REGISTRY_CMD.to_string()),
            },
            use_sudo: self.use_sudo.unwrap_or(parsed_data.use_sudo.unwrap_or(true)),
            sudo_cmd: match self.sudo_cmd {
                Some(ref value) => Clone::clone(value),
                None => parsed_data.sudo_cmd.unwrap_or_else(|| "sudo".to_string()),
            },
            nologin_shell,
            logs_dir,
            logs_max: self.logs_max.unwrap_or(parsed_data.logs_max.unwrap_or(15)),
        })
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
