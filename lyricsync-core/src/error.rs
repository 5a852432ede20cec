use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it if needed and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Lyrics errors
    #[error("Lyrics provider {provider} failed: {reason}")]
    LyricsProviderFailed { provider: String, reason: String },

    // Network errors
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest_middleware::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
