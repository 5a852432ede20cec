use async_trait::async_trait;
use lyricsync_core::{CoreError, FetchOptions, LyricsProvider, SearchQuery, SongMatch};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::provider::lrclib";

const LRCLIB_API_URL: &str = "https://lrclib.net/api";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

/// LRCLIB.net lyrics provider
pub struct LrclibProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl LrclibProvider {
    /// Create a new LRCLIB provider with default 10-second timeout and 3 retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, CoreError> {
        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("LyricSync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            base_url: LRCLIB_API_URL.to_string(),
        })
    }

    /// Point the provider at another LRCLIB instance
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self, query: &SearchQuery) -> String {
        format!(
            "{}/search?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(&query.title),
            urlencoding::encode(&query.artist)
        )
    }

    fn get_url(&self, id: &str) -> String {
        format!("{}/get/{}", self.base_url, urlencoding::encode(id))
    }

    fn failed(&self, reason: String) -> CoreError {
        CoreError::LyricsProviderFailed {
            provider: self.name().to_string(),
            reason,
        }
    }
}

/// A record from LRCLIB's search and get endpoints.
/// Unused fields (albumName, ...) are ignored by serde.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    id: i64,
    track_name: String,
    artist_name: String,
    duration: Option<f64>,
    #[serde(default)]
    instrumental: bool,
    plain_lyrics: Option<String>,
    synced_lyrics: Option<String>,
}

impl LrclibRecord {
    fn synced(&self) -> Option<&str> {
        self.synced_lyrics.as_deref().filter(|s| !s.trim().is_empty())
    }

    fn plain(&self) -> Option<&str> {
        self.plain_lyrics.as_deref().filter(|s| !s.trim().is_empty())
    }

    fn has_lyrics(&self) -> bool {
        !self.instrumental && (self.synced().is_some() || self.plain().is_some())
    }

    fn duration_ms(&self) -> Option<i64> {
        let secs = self.duration.filter(|d| d.is_finite() && *d >= 0.0)?;
        #[allow(clippy::cast_possible_truncation)]
        let ms = (secs * 1000.0).round() as i64;
        Some(ms)
    }

    fn to_song_match(&self) -> SongMatch {
        let song = SongMatch::new(&self.track_name, &self.artist_name, self.id.to_string());
        match self.duration_ms() {
            Some(ms) => song.with_duration_ms(ms),
            None => song,
        }
    }

    /// Raw transcript text honoring the unsynced fallback option
    fn transcript(&self, options: &FetchOptions) -> Option<String> {
        if self.instrumental {
            debug!(target: LOG_TARGET, "Track is instrumental (lrclib id: {})", self.id);
            return None;
        }
        if let Some(synced) = self.synced() {
            return Some(synced.to_string());
        }
        if options.unsynced_fallback {
            if let Some(plain) = self.plain() {
                debug!(target: LOG_TARGET, "Using plain lyrics (lrclib id: {})", self.id);
                return Some(plain.to_string());
            }
        }
        None
    }
}

/// Pick the `page`-th result that has lyrics, synced records first
fn nth_with_lyrics(mut records: Vec<LrclibRecord>, page: u32) -> Option<LrclibRecord> {
    records.retain(LrclibRecord::has_lyrics);
    records.sort_by_key(|r| r.synced().is_none());
    let index = usize::try_from(page).ok()?;
    records.into_iter().nth(index)
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &'static str {
        "lrclib"
    }

    async fn lookup(&self, query: &SearchQuery, page: u32) -> Result<Option<SongMatch>, CoreError> {
        let url = self.search_url(query);
        debug!(target: LOG_TARGET, "LRCLIB GET (search): {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "LRCLIB search returned status: {}", response.status());
            return Err(self.failed(format!("search returned status: {}", response.status())));
        }

        let records: Vec<LrclibRecord> = response.json().await?;
        let total = records.len();
        let Some(record) = nth_with_lyrics(records, page) else {
            info!(
                target: LOG_TARGET,
                "LRCLIB has no result #{} for {} ({} raw results)", page, query, total
            );
            return Ok(None);
        };

        info!(
            target: LOG_TARGET,
            "LRCLIB match #{} for {}: {} - {} (id: {}, duration: {:?})",
            page,
            query,
            record.artist_name,
            record.track_name,
            record.id,
            record.duration
        );
        Ok(Some(record.to_song_match()))
    }

    async fn fetch_transcript(
        &self,
        song: &SongMatch,
        options: &FetchOptions,
    ) -> Result<Option<String>, CoreError> {
        let url = self.get_url(&song.provider_id);
        debug!(target: LOG_TARGET, "LRCLIB GET (record): {}", url);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!(target: LOG_TARGET, "LRCLIB record {} not found", song.provider_id);
            return Ok(None);
        }
        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "LRCLIB returned status: {}", response.status());
            return Err(self.failed(format!("get returned status: {}", response.status())));
        }

        let record: LrclibRecord = response.json().await?;
        Ok(record.transcript(options))
    }
}
