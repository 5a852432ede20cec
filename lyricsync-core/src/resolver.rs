//! Ordered, best-effort lyrics search over relaxed query candidates.

use crate::lrc::{Transcript, TranscriptParser};
use crate::provider::{FetchOptions, LyricsProvider, SongMatch};
use crate::query::SearchQuery;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::resolver";

/// A transcript together with the query and match that produced it
#[derive(Debug, Clone)]
pub struct ResolvedLyrics {
    pub transcript: Transcript,
    pub query: SearchQuery,
    pub song: SongMatch,
}

/// Everything a single search needs besides the candidates
pub struct SearchRequest<'a> {
    pub provider: &'a dyn LyricsProvider,
    pub parser: &'a dyn TranscriptParser,
    pub options: FetchOptions,
    /// Index into alternative results; 0 is the best match
    pub page: u32,
    pub cancel: &'a CancellationToken,
}

/// Try `candidates` in order and return the first non-empty transcript.
///
/// With `page > 0` only the verbatim (first) candidate is searched, so asking
/// for the next alternative never silently changes the search terms. Provider
/// errors, misses and empty parses all move on to the next candidate. Returns
/// `None` when every candidate is exhausted or the search was cancelled.
pub async fn resolve(
    candidates: &[SearchQuery],
    request: &SearchRequest<'_>,
) -> Option<ResolvedLyrics> {
    let attempts = if request.page > 0 {
        &candidates[..candidates.len().min(1)]
    } else {
        candidates
    };

    for query in attempts {
        if request.cancel.is_cancelled() {
            debug!(target: LOG_TARGET, "Search cancelled before {}", query);
            return None;
        }

        if let Some(resolved) = try_candidate(query, request).await {
            info!(
                target: LOG_TARGET,
                "Resolved {} lines via {} on {} (page {}, id {})",
                resolved.transcript.len(),
                query,
                request.provider.name(),
                request.page,
                resolved.song.provider_id
            );
            return Some(resolved);
        }
    }

    info!(
        target: LOG_TARGET,
        "No lyrics on {} after {} candidate(s) (page {})",
        request.provider.name(),
        attempts.len(),
        request.page
    );
    None
}

async fn try_candidate(query: &SearchQuery, request: &SearchRequest<'_>) -> Option<ResolvedLyrics> {
    let provider = request.provider;

    let song = match provider.lookup(query, request.page).await {
        Ok(Some(song)) => song,
        Ok(None) => {
            debug!(target: LOG_TARGET, "{} has no match for {}", provider.name(), query);
            return None;
        }
        Err(e) => {
            warn!(target: LOG_TARGET, "Lookup on {} failed for {}: {}", provider.name(), query, e);
            return None;
        }
    };

    if request.cancel.is_cancelled() {
        return None;
    }

    let raw = match provider.fetch_transcript(&song, &request.options).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(
                target: LOG_TARGET,
                "{} has no transcript for {} - {}",
                provider.name(),
                song.artist,
                song.title
            );
            return None;
        }
        Err(e) => {
            warn!(
                target: LOG_TARGET,
                "Fetching transcript from {} failed for {} - {}: {}",
                provider.name(),
                song.artist,
                song.title,
                e
            );
            return None;
        }
    };

    if request.cancel.is_cancelled() {
        return None;
    }

    let transcript = request.parser.parse(&raw);
    if transcript.is_empty() {
        debug!(target: LOG_TARGET, "Transcript for {} parsed to zero lines", query);
        return None;
    }

    Some(ResolvedLyrics {
        transcript,
        query: query.clone(),
        song,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::lrc::LrcParser;
    use crate::query::QueryPlanner;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Provider answering from a fixed table keyed by (title, artist)
    #[derive(Default)]
    struct TableProvider {
        lyrics: HashMap<(String, String), String>,
        failing: Vec<(String, String)>,
        lookups: Mutex<Vec<(String, String, u32)>>,
    }

    impl TableProvider {
        fn with(mut self, title: &str, artist: &str, raw: &str) -> Self {
            self.lyrics
                .insert((title.to_string(), artist.to_string()), raw.to_string());
            self
        }

        fn failing(mut self, title: &str, artist: &str) -> Self {
            self.failing.push((title.to_string(), artist.to_string()));
            self
        }

        fn lookups(&self) -> Vec<(String, String, u32)> {
            self.lookups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LyricsProvider for TableProvider {
        fn name(&self) -> &'static str {
            "table"
        }

        async fn lookup(
            &self,
            query: &SearchQuery,
            page: u32,
        ) -> Result<Option<SongMatch>, CoreError> {
            self.lookups
                .lock()
                .unwrap()
                .push((query.title.clone(), query.artist.clone(), page));
            let key = (query.title.clone(), query.artist.clone());
            if self.failing.contains(&key) {
                return Err(CoreError::LyricsProviderFailed {
                    provider: "table".to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            Ok(self
                .lyrics
                .contains_key(&key)
                .then(|| SongMatch::new(&query.title, &query.artist, "1")))
        }

        async fn fetch_transcript(
            &self,
            song: &SongMatch,
            _options: &FetchOptions,
        ) -> Result<Option<String>, CoreError> {
            Ok(self
                .lyrics
                .get(&(song.title.clone(), song.artist.clone()))
                .cloned())
        }
    }

    async fn run(provider: &TableProvider, candidates: &[SearchQuery], page: u32) -> Option<ResolvedLyrics> {
        let cancel = CancellationToken::new();
        let request = SearchRequest {
            provider,
            parser: &LrcParser,
            options: FetchOptions::default(),
            page,
            cancel: &cancel,
        };
        resolve(candidates, &request).await
    }

    fn candidates(title: &str, artist: &str) -> Vec<SearchQuery> {
        QueryPlanner::new::<&str>(&[]).unwrap().candidates(title, artist)
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let provider = TableProvider::default().with("Song", "Artist", "[00:01.00]hello");
        let candidates = candidates("Song (Official Video)", "Artist feat. X");

        let resolved = run(&provider, &candidates, 0).await.unwrap();
        assert_eq!(resolved.query.title, "Song");
        assert_eq!(resolved.transcript.len(), 1);
        assert_eq!(provider.lookups().len(), 2);
    }

    #[tokio::test]
    async fn test_verbatim_hit_skips_later_candidates() {
        let provider = TableProvider::default()
            .with("Song (Live)", "Artist", "[00:01.00]live")
            .with("Song", "Artist", "[00:01.00]studio");
        let candidates = candidates("Song (Live)", "Artist");

        let resolved = run(&provider, &candidates, 0).await.unwrap();
        assert_eq!(resolved.transcript.lines[0].text, "live");
        assert_eq!(provider.lookups().len(), 1);
    }

    #[tokio::test]
    async fn test_paging_only_tries_verbatim() {
        let provider = TableProvider::default().with("Song", "Artist", "[00:01.00]hello");
        let candidates = candidates("Song (Official Video)", "Artist feat. X");
        assert!(candidates.len() > 1);

        let resolved = run(&provider, &candidates, 1).await;
        assert!(resolved.is_none());
        assert_eq!(
            provider.lookups(),
            vec![("Song (Official Video)".to_string(), "Artist feat. X".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_failure_advances_to_next_candidate() {
        let provider = TableProvider::default()
            .failing("Song [HD]", "Artist")
            .with("Song", "Artist", "[00:01.00]hello");
        let candidates = candidates("Song [HD]", "Artist");

        let resolved = run(&provider, &candidates, 0).await.unwrap();
        assert_eq!(resolved.query.title, "Song");
    }

    #[tokio::test]
    async fn test_empty_parse_advances() {
        let provider = TableProvider::default()
            .with("Song [HD]", "Artist", "[ti:only metadata]")
            .with("Song", "Artist", "[00:01.00]hello");
        let candidates = candidates("Song [HD]", "Artist");

        let resolved = run(&provider, &candidates, 0).await.unwrap();
        assert_eq!(resolved.query.title, "Song");
    }

    #[tokio::test]
    async fn test_exhaustion_is_not_found() {
        let provider = TableProvider::default();
        let candidates = candidates("Song (Official Video)", "Artist");
        assert!(run(&provider, &candidates, 0).await.is_none());
        assert_eq!(provider.lookups().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_search_stops() {
        let provider = TableProvider::default().with("Song", "Artist", "[00:01.00]hello");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = SearchRequest {
            provider: &provider,
            parser: &LrcParser,
            options: FetchOptions::default(),
            page: 0,
            cancel: &cancel,
        };
        assert!(resolve(&candidates("Song", "Artist"), &request).await.is_none());
        assert!(provider.lookups().is_empty());
    }
}
