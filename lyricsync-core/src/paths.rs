//! Path constants for configuration and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "lyricsync";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "lyricsync.log";

/// Get the configuration directory path (~/.config/lyricsync/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/lyricsync/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the log file path (`~/.cache/lyricsync/lyricsync.log` on Linux)
#[must_use]
pub fn log_file_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(config_dir)
        .join(CONFIG_DIR_NAME)
        .join(LOG_FILE_NAME)
}
