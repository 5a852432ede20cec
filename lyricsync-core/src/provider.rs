use crate::config::LyricsProviderType;
use crate::error::CoreError;
use crate::query::SearchQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A song a provider found for a search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMatch {
    /// Title as the provider knows it
    pub title: String,
    /// Artist as the provider knows it
    pub artist: String,
    /// Provider-specific ID (e.g., LRCLIB's numeric ID as string)
    pub provider_id: String,
    /// Track duration in milliseconds, if the provider reports it
    pub duration_ms: Option<i64>,
}

impl SongMatch {
    /// Create a new song match
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            provider_id: provider_id.into(),
            duration_ms: None,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// User-selected transcript options passed to every fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct FetchOptions {
    /// Append translated lines where the provider has them
    #[serde(default)]
    pub include_translation: bool,
    /// Append romanized lines where the provider has them
    #[serde(default)]
    pub include_romanization: bool,
    /// Ask for word-by-word timing with per-singer lines when available
    #[serde(default)]
    pub multi_person_word_by_word: bool,
    /// Accept plain (untimed) lyrics when no synced version exists
    #[serde(default)]
    pub unsynced_fallback: bool,
}

/// Trait for lyrics providers.
///
/// Both calls report "nothing there" as `Ok(None)`. `Err` is reserved for
/// transport or decoding failures; the resolver treats it like a miss for the
/// candidate being tried.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Find the `page`-th matching song for a query (0 = best match)
    async fn lookup(&self, query: &SearchQuery, page: u32)
        -> Result<Option<SongMatch>, CoreError>;

    /// Download the raw time-tagged transcript for a matched song
    async fn fetch_transcript(
        &self,
        song: &SongMatch,
        options: &FetchOptions,
    ) -> Result<Option<String>, CoreError>;
}

/// Lyrics providers available to the engine, keyed by config type
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<LyricsProviderType, Arc<dyn LyricsProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one of the same type
    #[must_use]
    pub fn with(mut self, kind: LyricsProviderType, provider: Arc<dyn LyricsProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// Look up a provider by type
    #[must_use]
    pub fn get(&self, kind: LyricsProviderType) -> Option<Arc<dyn LyricsProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Names of all registered providers
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.values().map(|p| p.name()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
