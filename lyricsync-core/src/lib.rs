pub mod bridge;
pub mod clock;
pub mod config;
pub mod error;
pub mod index;
pub mod lrc;
pub mod paths;
pub mod playback;
pub mod provider;
pub mod query;
pub mod resolver;
pub mod sync;
pub mod time;

pub use bridge::PlaybackBridge;
pub use clock::extrapolate;
pub use config::{
    LoggingConfig, LyricSyncConfig, LyricsConfig, LyricsProviderType, SyncConfig, CONFIG_TEMPLATE,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::CoreError;
pub use index::{active_index, active_line_index};
pub use lrc::{LrcMetadata, LrcParser, LyricLine, LyricWord, SharedParser, Transcript, TranscriptParser};
pub use paths::{config_dir, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME};
pub use playback::{ArtRef, PlaybackSample, SongIdentity};
pub use provider::{FetchOptions, LyricsProvider, ProviderRegistry, SongMatch};
pub use query::{QueryPlanner, QueryTier, SearchQuery, DEFAULT_NOISE_KEYWORDS};
pub use resolver::{resolve, ResolvedLyrics, SearchRequest};
pub use sync::{SyncEngine, SyncEvent, SyncPhase, SyncSnapshot};
pub use time::format_position;
