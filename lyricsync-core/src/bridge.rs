//! Last-value-wins hand-off between the player observer and the engine.
//!
//! The observer writes; the engine (and any passive reader) sees only the
//! newest value. Intermediate values written between two reads are dropped.

use crate::playback::{PlaybackSample, SongIdentity};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

const LOG_TARGET: &str = "lyricsync::bridge";

/// Shared cell holding the current song and the current playback sample.
///
/// Construct one per observed player and hand the same `Arc` to the observer
/// and to the [`SyncEngine`](crate::SyncEngine).
#[derive(Debug)]
pub struct PlaybackBridge {
    song_tx: watch::Sender<Option<SongIdentity>>,
    playback_tx: watch::Sender<Option<PlaybackSample>>,
}

impl PlaybackBridge {
    /// Create an empty bridge
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish the current song, or `None` when the player went away.
    ///
    /// Every call notifies subscribers, even when the value is unchanged;
    /// deciding whether it is a new song is the reader's job.
    pub fn publish_song(&self, song: Option<SongIdentity>) {
        debug!(
            target: LOG_TARGET,
            "Song update: {:?}",
            song.as_ref().map(|s| (&s.artist, &s.title))
        );
        self.song_tx.send_replace(song);
    }

    /// Publish the latest playback sample, or `None` when unknown
    pub fn publish_playback(&self, sample: Option<PlaybackSample>) {
        self.playback_tx.send_replace(sample);
    }

    /// Clear both signals
    pub fn clear(&self) {
        self.publish_song(None);
        self.publish_playback(None);
    }

    /// Latest song
    #[must_use]
    pub fn song(&self) -> Option<SongIdentity> {
        self.song_tx.borrow().clone()
    }

    /// Latest playback sample
    #[must_use]
    pub fn playback(&self) -> Option<PlaybackSample> {
        *self.playback_tx.borrow()
    }

    /// Subscribe to song updates
    #[must_use]
    pub fn subscribe_song(&self) -> watch::Receiver<Option<SongIdentity>> {
        self.song_tx.subscribe()
    }

    /// Subscribe to playback sample updates
    #[must_use]
    pub fn subscribe_playback(&self) -> watch::Receiver<Option<PlaybackSample>> {
        self.playback_tx.subscribe()
    }
}

impl Default for PlaybackBridge {
    fn default() -> Self {
        let (song_tx, _) = watch::channel(None);
        let (playback_tx, _) = watch::channel(None);
        Self {
            song_tx,
            playback_tx,
        }
    }
}
