//! NetEase Cloud Music lyrics provider.
//!
//! Uses the public web API: `search/get` for matching and `song/lyric` for
//! the LRC body plus optional translated and romanized tracks.

use async_trait::async_trait;
use lyricsync_core::{CoreError, FetchOptions, LyricsProvider, SearchQuery, SongMatch, Transcript};
use reqwest::header::REFERER;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::provider::netease";

const NETEASE_API_URL: &str = "https://music.163.com/api";
const NETEASE_REFERER: &str = "https://music.163.com/";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// NetEase Cloud Music lyrics provider
pub struct NeteaseProvider {
    client: ClientWithMiddleware,
    base_url: String,
}

impl NeteaseProvider {
    /// Create a new NetEase provider with default 10-second timeout and 3 retries.
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
            base_url: NETEASE_API_URL.to_string(),
        })
    }

    /// Point the provider at another API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self, query: &SearchQuery, page: u32) -> String {
        let terms = format!("{} {}", query.title, query.artist);
        format!(
            "{}/search/get?s={}&type=1&offset={}&limit=1",
            self.base_url,
            urlencoding::encode(terms.trim()),
            page
        )
    }

    fn lyric_url(&self, id: &str) -> String {
        format!(
            "{}/song/lyric?id={}&lv=1&tv=1&rv=1",
            self.base_url,
            urlencoding::encode(id)
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CoreError> {
        debug!(target: LOG_TARGET, "NetEase GET: {}", url);
        let response = self
            .client
            .get(url)
            .header(REFERER, NETEASE_REFERER)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(target: LOG_TARGET, "NetEase returned status: {}", response.status());
            return Err(CoreError::LyricsProviderFailed {
                provider: self.name().to_string(),
                reason: format!("NetEase returned status: {}", response.status()),
            });
        }

        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    songs: Vec<NeteaseSong>,
}

#[derive(Debug, Deserialize)]
struct NeteaseSong {
    id: i64,
    name: String,
    #[serde(default)]
    artists: Vec<NeteaseArtist>,
    /// Milliseconds
    duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NeteaseArtist {
    name: String,
}

impl NeteaseSong {
    fn to_song_match(&self) -> SongMatch {
        let artist = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let song = SongMatch::new(&self.name, artist, self.id.to_string());
        match self.duration.filter(|d| *d > 0) {
            Some(ms) => song.with_duration_ms(ms),
            None => song,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LyricResponse {
    #[serde(default)]
    nolyric: bool,
    #[serde(default)]
    uncollected: bool,
    lrc: Option<LyricBody>,
    tlyric: Option<LyricBody>,
    romalrc: Option<LyricBody>,
}

#[derive(Debug, Deserialize)]
struct LyricBody {
    #[serde(default)]
    lyric: Option<String>,
}

fn body_text(body: Option<&LyricBody>) -> Option<&str> {
    body.and_then(|b| b.lyric.as_deref())
        .filter(|text| !text.trim().is_empty())
}

impl LyricResponse {
    /// Combined raw transcript. Translation and romanization tracks are
    /// appended after the original; the parser's stable sort then places
    /// each extra line right after the original line with the same time tag.
    fn transcript(&self, options: &FetchOptions) -> Option<String> {
        if self.nolyric || self.uncollected {
            return None;
        }
        let original = body_text(self.lrc.as_ref())?;

        if !Transcript::parse(original).is_synced() {
            return options.unsynced_fallback.then(|| original.to_string());
        }

        let mut combined = original.trim_end().to_string();
        let extras = [
            (options.include_translation, body_text(self.tlyric.as_ref())),
            (options.include_romanization, body_text(self.romalrc.as_ref())),
        ];
        for extra in extras
            .into_iter()
            .filter_map(|(wanted, extra)| extra.filter(|_| wanted))
        {
            combined.push('\n');
            combined.push_str(extra.trim_end());
        }
        Some(combined)
    }
}

#[async_trait]
impl LyricsProvider for NeteaseProvider {
    fn name(&self) -> &'static str {
        "netease"
    }

    async fn lookup(&self, query: &SearchQuery, page: u32) -> Result<Option<SongMatch>, CoreError> {
        let response: SearchResponse = self.get_json(&self.search_url(query, page)).await?;

        let song = response
            .result
            .and_then(|r| r.songs.into_iter().next())
            .map(|s| s.to_song_match());

        match &song {
            Some(song) => info!(
                target: LOG_TARGET,
                "NetEase match #{} for {}: {} - {} (id: {})",
                page,
                query,
                song.artist,
                song.title,
                song.provider_id
            ),
            None => info!(target: LOG_TARGET, "NetEase has no result #{} for {}", page, query),
        }
        Ok(song)
    }

    async fn fetch_transcript(
        &self,
        song: &SongMatch,
        options: &FetchOptions,
    ) -> Result<Option<String>, CoreError> {
        let response: LyricResponse = self.get_json(&self.lyric_url(&song.provider_id)).await?;
        let transcript = response.transcript(options);
        if transcript.is_none() {
            debug!(
                target: LOG_TARGET,
                "NetEase has no usable lyrics for id {} (nolyric: {}, uncollected: {})",
                song.provider_id,
                response.nolyric,
                response.uncollected
            );
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LYRIC_RESPONSE: &str = r#"{
        "sgc": false, "code": 200,
        "lrc": {"version": 3, "lyric": "[00:01.00]こんにちは\n[00:03.50]世界\n"},
        "tlyric": {"version": 1, "lyric": "[00:01.00]Hello\n[00:03.50]World\n"},
        "romalrc": {"version": 1, "lyric": "[00:01.00]konnichiwa\n[00:03.50]sekai\n"}
    }"#;

    fn lyric_response() -> LyricResponse {
        serde_json::from_str(LYRIC_RESPONSE).unwrap()
    }

    #[test]
    fn test_search_response_to_match() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"result": {"songs": [{"id": 186016, "name": "Song",
                "artists": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}],
                "duration": 240000}], "songCount": 12}, "code": 200}"#,
        )
        .unwrap();
        let song = response.result.unwrap().songs[0].to_song_match();
        assert_eq!(song.title, "Song");
        assert_eq!(song.artist, "A, B");
        assert_eq!(song.provider_id, "186016");
        assert_eq!(song.duration_ms, Some(240_000));
    }

    #[test]
    fn test_empty_search_response() {
        let response: SearchResponse = serde_json::from_str(r#"{"result": {}, "code": 200}"#).unwrap();
        assert!(response.result.unwrap().songs.is_empty());
        let response: SearchResponse = serde_json::from_str(r#"{"code": 200}"#).unwrap();
        assert!(response.result.is_none());
    }

    #[test]
    fn test_original_only_by_default() {
        let raw = lyric_response().transcript(&FetchOptions::default()).unwrap();
        assert_eq!(raw, "[00:01.00]こんにちは\n[00:03.50]世界");
    }

    #[test]
    fn test_translation_follows_original_line() {
        let options = FetchOptions {
            include_translation: true,
            ..FetchOptions::default()
        };
        let raw = lyric_response().transcript(&options).unwrap();
        let transcript = Transcript::parse(&raw);
        let texts: Vec<&str> = transcript.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["こんにちは", "Hello", "世界", "World"]);
    }

    #[test]
    fn test_translation_and_romanization() {
        let options = FetchOptions {
            include_translation: true,
            include_romanization: true,
            ..FetchOptions::default()
        };
        let transcript = Transcript::parse(&lyric_response().transcript(&options).unwrap());
        assert_eq!(transcript.len(), 6);
        assert_eq!(transcript.lines[2].text, "konnichiwa");
    }

    #[test]
    fn test_no_lyric_flags() {
        let response: LyricResponse =
            serde_json::from_str(r#"{"nolyric": true, "code": 200}"#).unwrap();
        assert!(response.transcript(&FetchOptions::default()).is_none());

        let response: LyricResponse =
            serde_json::from_str(r#"{"uncollected": true, "code": 200}"#).unwrap();
        assert!(response.transcript(&FetchOptions::default()).is_none());
    }

    #[test]
    fn test_untimed_text_needs_fallback() {
        let response: LyricResponse =
            serde_json::from_str(r#"{"lrc": {"lyric": "just words\nno tags"}, "code": 200}"#).unwrap();
        assert!(response.transcript(&FetchOptions::default()).is_none());

        let options = FetchOptions {
            unsynced_fallback: true,
            ..FetchOptions::default()
        };
        assert_eq!(
            response.transcript(&options).as_deref(),
            Some("just words\nno tags")
        );
    }

    #[test]
    fn test_urls() {
        let provider = NeteaseProvider::new().unwrap().with_base_url("http://127.0.0.1:4000/api");
        assert_eq!(
            provider.search_url(&SearchQuery::new("Song", "A&B"), 2),
            "http://127.0.0.1:4000/api/search/get?s=Song%20A%26B&type=1&offset=2&limit=1"
        );
        assert_eq!(
            provider.lyric_url("186016"),
            "http://127.0.0.1:4000/api/song/lyric?id=186016&lv=1&tv=1&rv=1"
        );
    }
}
