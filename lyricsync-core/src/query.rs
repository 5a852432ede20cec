//! Search query relaxation.
//!
//! Player metadata is often decorated for video platforms ("Song (Official
//! Video)", "Artist feat. Someone"). The planner turns one raw title/artist
//! pair into up to three progressively cleaner candidates; the verbatim pair
//! always comes first.

use crate::error::{CoreError, Result};
use regex::Regex;
use std::fmt;
use tracing::debug;

const LOG_TARGET: &str = "lyricsync::query";

/// Bracket contents that mark a span as decoration rather than part of the title
pub const DEFAULT_NOISE_KEYWORDS: &[&str] = &[
    "official",
    "video",
    "lyrics",
    "lyric",
    "visualizer",
    "visualiser",
    "audio",
    "remastered",
    "remaster",
    "live",
    "remix",
    "instrumental",
    "karaoke",
    "version",
    "hd",
    "hq",
    "4k",
    "mv",
    "feat",
    "ft",
    "featuring",
];

/// Well-formed, non-nested `(...)` or `[...]` span with its leading whitespace
const BRACKET_SPAN: &str = r"\s*(?:\(([^()\[\]]*)\)|\[([^()\[\]]*)\])";
const FEAT_SUFFIX: &str = r"(?i)\s+(?:feat\.?|ft\.|featuring)\s.*$";

/// Upper bound on bracket-stripping passes for nested spans
const MAX_STRIP_PASSES: usize = 8;

/// How much a candidate was relaxed from the player's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTier {
    Verbatim,
    Cleaned,
    Aggressive,
}

impl fmt::Display for QueryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Verbatim => "verbatim",
            Self::Cleaned => "cleaned",
            Self::Aggressive => "aggressive",
        })
    }
}

/// One title/artist pair to search for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub artist: String,
    pub tier: QueryTier,
}

impl SearchQuery {
    /// Create a verbatim query
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            tier: QueryTier::Verbatim,
        }
    }

    fn same_terms(&self, title: &str, artist: &str) -> bool {
        self.title == title && self.artist == artist
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.tier)
    }
}

/// Builds ordered search candidates from raw metadata
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    bracket: Regex,
    noise: Regex,
    feat: Regex,
    whitespace: Regex,
}

impl QueryPlanner {
    /// Create a planner using the default noise keywords plus `extra_keywords`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] if the keyword list cannot be
    /// compiled into a pattern.
    pub fn new<S: AsRef<str>>(extra_keywords: &[S]) -> Result<Self> {
        let keywords: Vec<String> = DEFAULT_NOISE_KEYWORDS
            .iter()
            .copied()
            .chain(extra_keywords.iter().map(AsRef::as_ref))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        let noise_pattern = format!(r"(?i)\b(?:{})\b", keywords.join("|"));

        Ok(Self {
            bracket: compile(BRACKET_SPAN)?,
            noise: compile(&noise_pattern)?,
            feat: compile(FEAT_SUFFIX)?,
            whitespace: compile(r"\s{2,}")?,
        })
    }

    /// Ordered candidates for `title`/`artist`: verbatim, then cleaned, then
    /// aggressive, skipping tiers that add nothing new.
    #[must_use]
    pub fn candidates(&self, title: &str, artist: &str) -> Vec<SearchQuery> {
        let verbatim = SearchQuery::new(title, artist);

        let cleaned_title = self.strip_feat(&self.strip_noise_spans(title));
        let cleaned_artist = self.strip_feat(&self.strip_noise_spans(artist));
        let cleaned = SearchQuery {
            title: cleaned_title,
            artist: cleaned_artist,
            tier: QueryTier::Cleaned,
        };

        let aggressive = SearchQuery {
            title: self.strip_all_spans(&cleaned.title),
            artist: cleaned.artist.clone(),
            tier: QueryTier::Aggressive,
        };

        let mut candidates = vec![verbatim];

        if !cleaned.title.is_empty() && !candidates[0].same_terms(&cleaned.title, &cleaned.artist) {
            candidates.push(cleaned.clone());
        }

        if !aggressive.title.is_empty() && !cleaned.same_terms(&aggressive.title, &aggressive.artist)
        {
            candidates.push(aggressive);
        }

        debug!(
            target: LOG_TARGET,
            "Planned {} candidate(s) for {} - {}",
            candidates.len(),
            artist,
            title
        );

        candidates
    }

    /// Remove bracketed spans whose contents look like decoration
    fn strip_noise_spans(&self, input: &str) -> String {
        let stripped = self.bracket.replace_all(input, |caps: &regex::Captures<'_>| {
            let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            if self.noise.is_match(inner) {
                String::new()
            } else {
                caps[0].to_string()
            }
        });
        self.tidy(&stripped)
    }

    /// Remove every bracketed span, innermost first
    fn strip_all_spans(&self, input: &str) -> String {
        let mut current = input.to_string();
        for _ in 0..MAX_STRIP_PASSES {
            let next = self.bracket.replace_all(&current, "").into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        self.tidy(&current)
    }

    fn strip_feat(&self, input: &str) -> String {
        self.tidy(&self.feat.replace(input, ""))
    }

    fn tidy(&self, input: &str) -> String {
        self.whitespace.replace_all(input.trim(), " ").into_owned()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CoreError::ConfigInvalid {
        message: format!("invalid search cleanup pattern: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> QueryPlanner {
        QueryPlanner::new::<&str>(&[]).unwrap()
    }

    fn pairs(candidates: &[SearchQuery]) -> Vec<(&str, &str)> {
        candidates
            .iter()
            .map(|c| (c.title.as_str(), c.artist.as_str()))
            .collect()
    }

    #[test]
    fn test_verbatim_first_then_cleaned() {
        let candidates = planner().candidates("Song (Official Video)", "Artist feat. X");
        assert_eq!(
            pairs(&candidates),
            vec![("Song (Official Video)", "Artist feat. X"), ("Song", "Artist")]
        );
        assert_eq!(candidates[0].tier, QueryTier::Verbatim);
        assert_eq!(candidates[1].tier, QueryTier::Cleaned);
    }

    #[test]
    fn test_plain_title_single_candidate() {
        let candidates = planner().candidates("Bohemian Rhapsody", "Queen");
        assert_eq!(pairs(&candidates), vec![("Bohemian Rhapsody", "Queen")]);
    }

    #[test]
    fn test_aggressive_tier_strips_non_noise_brackets() {
        let candidates = planner().candidates("Song (Acoustic) [Official Audio]", "Band");
        assert_eq!(
            pairs(&candidates),
            vec![
                ("Song (Acoustic) [Official Audio]", "Band"),
                ("Song (Acoustic)", "Band"),
                ("Song", "Band"),
            ]
        );
        assert_eq!(candidates[2].tier, QueryTier::Aggressive);
    }

    #[test]
    fn test_aggressive_without_cleaned_tier() {
        let candidates = planner().candidates("Song (Taylor's Edit)", "Band");
        assert_eq!(
            pairs(&candidates),
            vec![("Song (Taylor's Edit)", "Band"), ("Song", "Band")]
        );
        assert_eq!(candidates[1].tier, QueryTier::Aggressive);
    }

    #[test]
    fn test_keywords_are_case_insensitive_and_whole_word() {
        let candidates = planner().candidates("Alive [LIVE at Wembley]", "Band");
        assert_eq!(candidates[1].title, "Alive");

        // "Olive" must not trigger the "live" keyword
        let candidates = planner().candidates("Song (Olive Tree)", "Band");
        assert_eq!(candidates[1].tier, QueryTier::Aggressive);
    }

    #[test]
    fn test_feat_suffix_in_title() {
        let candidates = planner().candidates("Song ft. Somebody", "Band");
        assert_eq!(pairs(&candidates)[1], ("Song", "Band"));

        let candidates = planner().candidates("Song featuring Somebody Else", "Band");
        assert_eq!(pairs(&candidates)[1], ("Song", "Band"));
    }

    #[test]
    fn test_bracketed_feat_is_noise() {
        let candidates = planner().candidates("Song (feat. Somebody)", "Band");
        assert_eq!(pairs(&candidates)[1], ("Song", "Band"));
    }

    #[test]
    fn test_unmatched_brackets_fail_open() {
        let candidates = planner().candidates("Song (Live", "Band");
        assert_eq!(pairs(&candidates), vec![("Song (Live", "Band")]);

        let candidates = planner().candidates("Song ]Video[", "Band");
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_nested_brackets_stripped_in_aggressive_tier() {
        let candidates = planner().candidates("Song (Take (2019))", "Band");
        assert_eq!(candidates.last().map(|c| c.title.as_str()), Some("Song"));
    }

    #[test]
    fn test_blank_cleaned_title_is_skipped() {
        let candidates = planner().candidates("(Official Video)", "Band");
        assert_eq!(pairs(&candidates), vec![("(Official Video)", "Band")]);
    }

    #[test]
    fn test_extra_keywords() {
        let planner = QueryPlanner::new(&["sped up"]).unwrap();
        let candidates = planner.candidates("Song (Sped Up)", "Band");
        assert_eq!(candidates[1].tier, QueryTier::Cleaned);
        assert_eq!(candidates[1].title, "Song");
    }

    #[test]
    fn test_artist_brackets_cleaned() {
        let candidates = planner().candidates("Song", "Band (Official)");
        assert_eq!(pairs(&candidates), vec![("Song", "Band (Official)"), ("Song", "Band")]);
    }
}
