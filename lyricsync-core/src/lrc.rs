//! LRC transcript parsing.
//!
//! Parsing never fails: unparseable tags are skipped, and input without any
//! usable time tag becomes an untimed transcript (every line has no
//! timestamp, so it never becomes the active line).

use std::sync::Arc;

/// Parsed transcript containing metadata and ordered lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub metadata: LrcMetadata,
    pub lines: Vec<LyricLine>,
}

/// LRC metadata from ID tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LrcMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub author: Option<String>,
    pub offset_ms: i64,
}

/// A single line of lyrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    /// Milliseconds from track start; `None` for lines without a usable time tag
    pub timestamp_ms: Option<i64>,
    pub text: String,
    /// Word-level timing for enhanced LRC
    pub words: Option<Vec<LyricWord>>,
}

/// Word-level timing for enhanced LRC format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricWord {
    pub start_ms: i64,
    pub end_ms: Option<i64>,
    pub text: String,
}

impl LyricLine {
    /// Create a timed line
    pub fn timed(timestamp_ms: i64, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            text: text.into(),
            words: None,
        }
    }

    /// Create a line with no timestamp
    pub fn untimed(text: impl Into<String>) -> Self {
        Self {
            timestamp_ms: None,
            text: text.into(),
            words: None,
        }
    }
}

/// Turns raw provider text into a [`Transcript`]. Must not fail; unusable
/// input yields an empty transcript.
pub trait TranscriptParser: Send + Sync {
    fn parse(&self, raw: &str) -> Transcript;
}

/// Default parser for (enhanced) LRC text
#[derive(Debug, Clone, Copy, Default)]
pub struct LrcParser;

impl TranscriptParser for LrcParser {
    fn parse(&self, raw: &str) -> Transcript {
        Transcript::parse(raw)
    }
}

/// Shared parser handle
pub type SharedParser = Arc<dyn TranscriptParser>;

impl Transcript {
    /// Build a transcript from already-timed lines, sorting them by timestamp.
    #[must_use]
    pub fn from_lines(mut lines: Vec<LyricLine>) -> Self {
        sort_lines(&mut lines);
        Self {
            metadata: LrcMetadata::default(),
            lines,
        }
    }

    /// Parse an LRC string into a transcript
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut metadata = LrcMetadata::default();
        let mut lines = Vec::new();
        let mut plain = Vec::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Try to parse as ID tag first
            if let Some((tag, value)) = parse_id_tag(line) {
                match tag.to_lowercase().as_str() {
                    "ti" => metadata.title = Some(value),
                    "ar" => metadata.artist = Some(value),
                    "al" => metadata.album = Some(value),
                    "au" => metadata.author = Some(value),
                    "offset" => {
                        if let Ok(offset) = value.trim_start_matches('+').parse::<i64>() {
                            metadata.offset_ms = offset;
                        }
                    }
                    _ => {} // Ignore unknown tags
                }
                continue;
            }

            match parse_lyric_line(line) {
                Some(parsed) => lines.extend(parsed),
                // Bracketed lines that are neither tags nor timestamps are noise
                None if !line.starts_with('[') => plain.push(LyricLine::untimed(line)),
                None => {}
            }
        }

        if lines.is_empty() {
            return Self {
                metadata,
                lines: plain,
            };
        }

        if metadata.offset_ms != 0 {
            for line in &mut lines {
                line.timestamp_ms = line
                    .timestamp_ms
                    .map(|t| apply_offset(t, metadata.offset_ms));
                if let Some(ref mut words) = line.words {
                    for word in words {
                        word.start_ms = apply_offset(word.start_ms, metadata.offset_ms);
                        word.end_ms = word.end_ms.map(|e| apply_offset(e, metadata.offset_ms));
                    }
                }
            }
        }

        sort_lines(&mut lines);

        Self { metadata, lines }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether at least one line carries a timestamp
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.lines.iter().any(|l| l.timestamp_ms.is_some())
    }

    /// Text of the line at `index`, if any
    #[must_use]
    pub fn text_at(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|l| l.text.as_str())
    }
}

/// Stable sort; untimed lines keep their relative order at the end.
fn sort_lines(lines: &mut [LyricLine]) {
    lines.sort_by_key(|l| l.timestamp_ms.unwrap_or(i64::MAX));
}

/// Parse an ID tag like [ti:Title] or [ar:Artist]
fn parse_id_tag(line: &str) -> Option<(String, String)> {
    if !line.starts_with('[') || !line.contains(':') {
        return None;
    }

    let end = line.find(']')?;
    let content = &line[1..end];

    let first_colon = content.find(':')?;
    let tag = &content[..first_colon];

    // A numeric tag part means this is a timestamp, not an ID tag
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    // Only alphabetic tags are metadata; anything else is a malformed timestamp
    if !tag.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let value = content[first_colon + 1..].trim().to_string();
    Some((tag.to_string(), value))
}

/// Parse a lyric line like [00:12.34]Hello world or [00:12.34][00:15.67]Same lyrics
fn parse_lyric_line(line: &str) -> Option<Vec<LyricLine>> {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while remaining.starts_with('[') {
        let Some(end) = remaining.find(']') else {
            break;
        };
        let Some(time) = parse_timestamp(&remaining[1..end]) else {
            break;
        };
        timestamps.push(time);
        remaining = &remaining[end + 1..];
    }

    if timestamps.is_empty() {
        return None;
    }

    let text = remaining.trim();
    let words = parse_enhanced_words(text);
    let text = words.as_ref().map_or_else(
        || text.to_string(),
        |w| {
            w.iter()
                .map(|word| word.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        },
    );

    Some(
        timestamps
            .into_iter()
            .map(|timestamp| LyricLine {
                timestamp_ms: Some(timestamp),
                text: text.clone(),
                words: words.clone(),
            })
            .collect(),
    )
}

/// Parse a timestamp string like "00:12.34", "00:12.345", "00:12:34" or "00:12"
fn parse_timestamp(s: &str) -> Option<i64> {
    let parts: Vec<&str> = s.trim().split(':').collect();

    match parts.as_slice() {
        [minutes, seconds] => {
            let minutes: i64 = parse_digits(minutes)?;
            let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
            let whole: i64 = parse_digits(whole)?;
            let fraction = parse_fraction_ms(fraction)?;
            to_millis(minutes, whole, fraction)
        }
        [minutes, seconds, hundredths] => {
            let minutes: i64 = parse_digits(minutes)?;
            let seconds: i64 = parse_digits(seconds)?;
            let fraction = parse_fraction_ms(hundredths)?;
            to_millis(minutes, seconds, fraction)
        }
        _ => None,
    }
}

fn to_millis(minutes: i64, seconds: i64, fraction_ms: i64) -> Option<i64> {
    minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(fraction_ms)
}

fn parse_digits(s: &str) -> Option<i64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Convert a fractional-seconds digit string to milliseconds ("5" → 500, "34" → 340)
fn parse_fraction_ms(s: &str) -> Option<i64> {
    if s.is_empty() {
        return Some(0);
    }
    let digits: String = s.chars().take(3).collect();
    let value = parse_digits(&digits)?;
    match digits.len() {
        1 => Some(value * 100),
        2 => Some(value * 10),
        _ => Some(value),
    }
}

/// Parse enhanced LRC format with word timing
/// Format: <mm:ss.xx> word1 <mm:ss.xx> word2 ...
fn parse_enhanced_words(text: &str) -> Option<Vec<LyricWord>> {
    if !text.contains('<') {
        return None;
    }

    let mut words: Vec<LyricWord> = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        if remaining.starts_with('<') {
            let Some(end) = remaining.find('>') else {
                break;
            };
            let start = parse_timestamp(&remaining[1..end]);
            remaining = &remaining[end + 1..];

            if let Some(start_ms) = start {
                let word_end = remaining.find('<').unwrap_or(remaining.len());
                let word_text = remaining[..word_end].trim();
                if !word_text.is_empty() {
                    words.push(LyricWord {
                        start_ms,
                        end_ms: None,
                        text: word_text.to_string(),
                    });
                }
                remaining = &remaining[word_end..];
            }
        } else {
            let next = remaining.find('<').unwrap_or(remaining.len());
            remaining = &remaining[next..];
        }
    }

    for i in 1..words.len() {
        words[i - 1].end_ms = Some(words[i].start_ms);
    }

    if words.is_empty() {
        None
    } else {
        Some(words)
    }
}

/// Apply a millisecond offset, clamping at zero
fn apply_offset(timestamp_ms: i64, offset_ms: i64) -> i64 {
    timestamp_ms.saturating_add(offset_ms).max(0)
}
