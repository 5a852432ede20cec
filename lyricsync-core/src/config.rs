use crate::error::{CoreError, Result};
use crate::provider::FetchOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricSyncConfig {
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider used for searches until the user picks another
    #[serde(default)]
    pub provider: LyricsProviderType,
    /// Transcript options forwarded to the provider on every fetch
    #[serde(flatten)]
    pub options: FetchOptions,
    /// Extra bracket keywords treated as decoration when relaxing queries
    #[serde(default)]
    pub extra_noise_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsProviderType {
    #[default]
    Lrclib,
    Netease,
}

impl LyricsProviderType {
    /// Stable identifier used in config files and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lrclib => "lrclib",
            Self::Netease => "netease",
        }
    }
}

impl fmt::Display for LyricsProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LyricsProviderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lrclib" => Ok(Self::Lrclib),
            "netease" => Ok(Self::Netease),
            other => Err(CoreError::ConfigInvalid {
                message: format!("unknown lyrics provider '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How often the active line is re-evaluated while playing
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Text shown as the current line when no lyrics were found
    #[serde(default = "default_not_found_message")]
    pub not_found_message: String,
}

const fn default_tick_interval() -> u64 {
    200
}

fn default_not_found_message() -> String {
    "Song not found.".to_string()
}

impl SyncConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            not_found_message: default_not_found_message(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to a file in the cache directory
    #[serde(default)]
    pub file_enabled: bool,
}

impl LyricSyncConfig {
    /// Get the config file path (~/.config/lyricsync/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path or create a template on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template, or an
    /// error if the file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `path`, writing the template there if it is missing
    ///
    /// # Errors
    ///
    /// Same as [`LyricSyncConfig::load_or_create`].
    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error on TOML syntax errors or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sync.tick_interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.tick_interval_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// The commented template written on first run
pub const CONFIG_TEMPLATE: &str = r#"# LyricSync Configuration
# ~/.config/lyricsync/config.toml

[lyrics]
# Provider used for searches: "lrclib" or "netease"
provider = "lrclib"
include_translation = false
include_romanization = false
multi_person_word_by_word = false
# Accept plain lyrics (no timing) when no synced lyrics exist
unsynced_fallback = false
# Extra words that mark bracketed title text as decoration, e.g. ["sped up"]
extra_noise_keywords = []

[sync]
# How often the active line is re-evaluated while playing
tick_interval_ms = 200
not_found_message = "Song not found."

[logging]
# Also write logs to ~/.cache/lyricsync/lyricsync.log
file_enabled = false
"#;
