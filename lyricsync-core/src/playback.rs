use std::sync::Arc;
use tokio::time::Instant;

/// Album art attached to a song notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ArtRef {
    /// Art reachable through a URI (file, content or http)
    Uri(String),
    /// Encoded image bytes handed over directly by the player
    RawImage(Arc<[u8]>),
    #[default]
    None,
}

impl ArtRef {
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// The song the external player reports as current
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongIdentity {
    pub title: String,
    pub artist: String,
    pub art: ArtRef,
}

impl SongIdentity {
    /// Create a song identity without art
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            art: ArtRef::None,
        }
    }

    /// Attach album art
    #[must_use]
    pub fn with_art(mut self, art: ArtRef) -> Self {
        self.art = art;
        self
    }

    /// Whether `other` is the same song. Only title and artist count; an
    /// art-only change is still the same song.
    #[must_use]
    pub fn same_song(&self, other: &Self) -> bool {
        self.title == other.title && self.artist == other.artist
    }
}

/// A position reading from the external player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSample {
    pub is_playing: bool,
    /// Position in milliseconds at `sampled_at`, never negative
    pub position_ms: i64,
    /// When the position was read
    pub sampled_at: Instant,
    /// Playback rate, always positive
    pub speed: f64,
}

impl PlaybackSample {
    /// Create a sample taken now at normal speed
    #[must_use]
    pub fn new(is_playing: bool, position_ms: i64) -> Self {
        Self::at(is_playing, position_ms, Instant::now(), 1.0)
    }

    /// Create a sample taken at a specific instant.
    ///
    /// Negative positions clamp to zero, and a speed that is not a positive
    /// finite number falls back to 1.0.
    #[must_use]
    pub fn at(is_playing: bool, position_ms: i64, sampled_at: Instant, speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self {
            is_playing,
            position_ms: position_ms.max(0),
            sampled_at,
            speed,
        }
    }

    /// Set the playback speed
    #[must_use]
    pub fn with_speed(self, speed: f64) -> Self {
        Self::at(self.is_playing, self.position_ms, self.sampled_at, speed)
    }

    /// Extrapolated position at `now`
    #[must_use]
    pub fn position_at(&self, now: Instant) -> i64 {
        crate::clock::extrapolate(self, now)
    }
}
