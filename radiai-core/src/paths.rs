//! Path constants for configuration and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "radiai";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Extension of the per-binary log files written when file logging is enabled
pub const LOG_FILE_EXTENSION: &str = "log";

/// Get the configuration directory path (~/.config/radiai/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/radiai/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the log file path for a binary (`~/.config/radiai/<binary>.log`)
#[must_use]
pub fn log_file_path(binary: &str) -> PathBuf {
    config_dir().join(binary).with_extension(LOG_FILE_EXTENSION)
}
