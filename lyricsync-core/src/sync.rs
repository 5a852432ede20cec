//! The sync engine: turns song and playback signals into a published snapshot
//! of the active lyric line.
//!
//! Two tasks consume the bridge. The song task owns the Idle/Fetching/Synced
//! lifecycle and spawns one cancellable search per identity change. The
//! playback task recomputes on every sample and keeps a tick loop alive while
//! playing. Both are keyed by generation counters so a superseded search or
//! tick loop can never publish.

use crate::bridge::PlaybackBridge;
use crate::config::{LyricSyncConfig, LyricsProviderType, SyncConfig};
use crate::error::Result;
use crate::index::active_index;
use crate::lrc::{LrcParser, SharedParser, Transcript};
use crate::playback::{ArtRef, PlaybackSample, SongIdentity};
use crate::provider::{FetchOptions, ProviderRegistry};
use crate::query::{QueryPlanner, SearchQuery};
use crate::resolver::{resolve, ResolvedLyrics, SearchRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::sync";

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// No song
    #[default]
    Idle,
    /// A search is in flight for the current song
    Fetching,
    /// The latest search settled, with or without lyrics
    Synced,
}

/// Published engine state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    pub song_title: String,
    pub song_artist: String,
    pub cover_art: ArtRef,
    pub transcript: Arc<Transcript>,
    /// Text of the active line, or the not-found message after a failed search
    pub active_line_text: Option<String>,
    pub active_line_index: Option<usize>,
    pub is_loading: bool,
    pub is_playing: bool,
    /// Last computed playback position, written on every tick
    pub current_timestamp_ms: i64,
    pub lyric_offset_ms: i64,
    pub phase: SyncPhase,
}

/// Events emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A different song started
    TrackChanged { title: String, artist: String },
    /// A lyrics search began
    SearchStarted {
        provider: LyricsProviderType,
        page: u32,
    },
    /// A search produced lyrics
    LyricsLoaded { lines: usize, query: SearchQuery },
    /// A search finished without lyrics
    LyricsNotFound,
    /// The active line moved
    LineChanged { index: usize, text: String },
    /// Playback was resumed
    PlaybackResumed { position_ms: i64 },
    /// Playback was paused
    PlaybackPaused { position_ms: i64 },
    /// The player went away
    PlaybackStopped,
}

/// Mutable control state shared by the engine's tasks
#[derive(Debug, Default)]
struct ControlState {
    identity: Option<SongIdentity>,
    query: Option<SearchQuery>,
    page: u32,
    last_not_found: bool,
    provider: LyricsProviderType,
    offset_ms: i64,
    sample_playing: bool,
    fetch_generation: u64,
    fetch_token: Option<CancellationToken>,
    tick_generation: u64,
    tick_token: Option<CancellationToken>,
}

/// Engine that keeps the active lyric line in step with playback
pub struct SyncEngine {
    bridge: Arc<PlaybackBridge>,
    providers: ProviderRegistry,
    parser: SharedParser,
    planner: QueryPlanner,
    config: SyncConfig,
    options: FetchOptions,
    snapshot_tx: watch::Sender<SyncSnapshot>,
    event_tx: broadcast::Sender<SyncEvent>,
    control: Mutex<ControlState>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl SyncEngine {
    /// Create an engine using the LRC parser
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the configured noise
    /// keywords cannot be compiled.
    pub fn new(
        bridge: Arc<PlaybackBridge>,
        providers: ProviderRegistry,
        config: &LyricSyncConfig,
    ) -> Result<Arc<Self>> {
        Self::with_parser(bridge, providers, Arc::new(LrcParser), config)
    }

    /// Create an engine with a custom transcript parser
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid (a zero tick interval) or
    /// the configured noise keywords cannot be compiled.
    pub fn with_parser(
        bridge: Arc<PlaybackBridge>,
        providers: ProviderRegistry,
        parser: SharedParser,
        config: &LyricSyncConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let planner = QueryPlanner::new(&config.lyrics.extra_noise_keywords)?;
        let (snapshot_tx, _) = watch::channel(SyncSnapshot::default());
        let (event_tx, _) = broadcast::channel(64);

        if providers.is_empty() {
            warn!(target: LOG_TARGET, "No lyrics providers registered, every search will report not found");
        } else if providers.get(config.lyrics.provider).is_none() {
            warn!(
                target: LOG_TARGET,
                "Configured provider {} is not registered (available: {:?})",
                config.lyrics.provider,
                providers.names()
            );
        }

        Ok(Arc::new(Self {
            bridge,
            providers,
            parser,
            planner,
            config: config.sync.clone(),
            options: config.lyrics.options,
            snapshot_tx,
            event_tx,
            control: Mutex::new(ControlState {
                provider: config.lyrics.provider,
                ..ControlState::default()
            }),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }))
    }

    /// Spawn the song and playback tasks. They run until [`Self::cancel_token`]
    /// is cancelled. Only the first call has any effect.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(target: LOG_TARGET, "Sync engine already started");
            return;
        }
        info!(
            target: LOG_TARGET,
            "Starting sync engine (tick {}ms, providers {:?})",
            self.config.tick_interval_ms,
            self.providers.names()
        );

        let song_rx = self.bridge.subscribe_song();
        tokio::spawn(Arc::clone(self).run_song_loop(song_rx));

        let playback_rx = self.bridge.subscribe_playback();
        tokio::spawn(Arc::clone(self).run_playback_loop(playback_rx));
    }

    /// Token that stops every engine task when cancelled
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to sync events
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Search again with user-supplied terms instead of the player's.
    /// Ignored while no song is playing.
    pub fn set_query(self: &Arc<Self>, title: &str, artist: &str) {
        let mut control = self.control();
        if control.identity.is_none() {
            debug!(target: LOG_TARGET, "Ignoring manual query while idle");
            return;
        }
        info!(target: LOG_TARGET, "Manual query: {} - {}", artist, title);
        control.query = Some(SearchQuery::new(title, artist));
        control.page = 0;
        self.begin_fetch(&mut control, None);
    }

    /// Try the next alternative result, or start over after a failed search.
    /// Ignored while no song is playing.
    pub fn refresh(self: &Arc<Self>) {
        let mut control = self.control();
        if control.identity.is_none() {
            debug!(target: LOG_TARGET, "Ignoring refresh while idle");
            return;
        }
        control.page = if control.last_not_found {
            0
        } else {
            control.page.saturating_add(1)
        };
        info!(target: LOG_TARGET, "Refreshing lyrics (page {})", control.page);
        self.begin_fetch(&mut control, None);
    }

    /// Switch lyrics provider. Re-searches from the best match when a song is
    /// playing and the provider actually changed.
    pub fn set_provider(self: &Arc<Self>, provider: LyricsProviderType) {
        let mut control = self.control();
        if control.provider == provider {
            return;
        }
        if self.providers.get(provider).is_none() {
            warn!(target: LOG_TARGET, "Provider {} is not registered", provider);
        }
        info!(target: LOG_TARGET, "Switching provider {} -> {}", control.provider, provider);
        control.provider = provider;
        if control.identity.is_some() {
            control.page = 0;
            self.begin_fetch(&mut control, None);
        }
    }

    /// Shift lyric timing; positive values delay the lyrics.
    /// Ignored while no song is playing, a new song starts at zero anyway.
    pub fn set_lyric_offset(&self, offset_ms: i64) {
        let mut control = self.control();
        if control.identity.is_none() {
            debug!(target: LOG_TARGET, "Ignoring lyric offset while idle");
            return;
        }
        control.offset_ms = offset_ms;
        let sample = self.bridge.playback();
        let position = sample.map_or_else(
            || self.snapshot_tx.borrow().current_timestamp_ms,
            |s| s.position_at(Instant::now()),
        );
        let playing = sample.is_some_and(|s| s.is_playing);
        self.recompute(&control, position, playing);
    }

    fn control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_song_loop(self: Arc<Self>, mut rx: watch::Receiver<Option<SongIdentity>>) {
        loop {
            let song = rx.borrow_and_update().clone();
            self.on_song(song);

            tokio::select! {
                () = self.cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(target: LOG_TARGET, "Song loop stopped");
    }

    async fn run_playback_loop(self: Arc<Self>, mut rx: watch::Receiver<Option<PlaybackSample>>) {
        loop {
            let sample = *rx.borrow_and_update();
            self.on_playback(sample);

            tokio::select! {
                () = self.cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(target: LOG_TARGET, "Playback loop stopped");
    }

    fn on_song(self: &Arc<Self>, song: Option<SongIdentity>) {
        let mut control = self.control();

        let Some(song) = song else {
            if control.identity.take().is_some() {
                info!(target: LOG_TARGET, "Song cleared, resetting");
                Self::cancel_fetch(&mut control);
                control.query = None;
                control.page = 0;
                control.last_not_found = false;
                control.offset_ms = 0;
                self.sync_ticking(&mut control);
                self.snapshot_tx.send_replace(SyncSnapshot::default());
                let _ = self.event_tx.send(SyncEvent::PlaybackStopped);
            }
            return;
        };

        let current = control
            .identity
            .as_ref()
            .map(|current| (current.same_song(&song), current.art == song.art));
        if let Some((true, same_art)) = current {
            if !same_art {
                if song.art.is_none() {
                    debug!(target: LOG_TARGET, "Cover art cleared");
                } else {
                    debug!(target: LOG_TARGET, "Cover art updated");
                }
                let art = song.art.clone();
                control.identity = Some(song);
                self.snapshot_tx.send_modify(|snap| snap.cover_art = art);
            }
            return;
        }

        info!(target: LOG_TARGET, "Track changed: {} - {}", song.artist, song.title);
        control.query = Some(SearchQuery::new(&song.title, &song.artist));
        control.page = 0;
        control.last_not_found = false;
        control.offset_ms = 0;

        let _ = self.event_tx.send(SyncEvent::TrackChanged {
            title: song.title.clone(),
            artist: song.artist.clone(),
        });

        self.begin_fetch(&mut control, Some(&song));
        control.identity = Some(song);
        self.sync_ticking(&mut control);
    }

    fn on_playback(self: &Arc<Self>, sample: Option<PlaybackSample>) {
        let mut control = self.control();
        let is_playing = sample.is_some_and(|s| s.is_playing);
        let position_ms = sample.map(|s| s.position_at(Instant::now()));

        if control.identity.is_some() {
            // Also the final recompute on pause, with the frozen position
            match position_ms {
                Some(position) => self.recompute(&control, position, is_playing),
                None => {
                    self.snapshot_tx.send_if_modified(|snap| {
                        let changed = snap.is_playing;
                        snap.is_playing = false;
                        changed
                    });
                }
            }

            if is_playing != control.sample_playing {
                let position_ms = position_ms.unwrap_or_default();
                let event = if is_playing {
                    SyncEvent::PlaybackResumed { position_ms }
                } else {
                    SyncEvent::PlaybackPaused { position_ms }
                };
                let _ = self.event_tx.send(event);
            }
        }

        control.sample_playing = is_playing;
        self.sync_ticking(&mut control);
    }

    /// Write the position and re-evaluate the active line. Subscribers are
    /// notified only when the line, the play state or the offset changed.
    fn recompute(&self, control: &ControlState, position_ms: i64, is_playing: bool) {
        let mut line_changed = None;

        self.snapshot_tx.send_if_modified(|snap| {
            let (notify, line) = place_position(snap, position_ms, is_playing, control.offset_ms);
            line_changed = line;
            notify
        });

        self.emit_line_changed(line_changed, position_ms);
    }

    fn emit_line_changed(&self, line_changed: Option<(usize, String)>, position_ms: i64) {
        if let Some((index, text)) = line_changed {
            debug!(target: LOG_TARGET, "Line {} at {}ms: {}", index, position_ms, text);
            let _ = self.event_tx.send(SyncEvent::LineChanged { index, text });
        }
    }

    /// Start a search for the current query. A new song's identity is
    /// published in the same snapshot write that enters Fetching.
    fn begin_fetch(self: &Arc<Self>, control: &mut ControlState, song: Option<&SongIdentity>) {
        Self::cancel_fetch(control);
        let Some(query) = control.query.clone() else {
            return;
        };

        let generation = control.fetch_generation;
        let token = self.cancel.child_token();
        control.fetch_token = Some(token.clone());
        control.last_not_found = false;

        let page = control.page;
        let provider = control.provider;

        let offset_ms = control.offset_ms;
        self.snapshot_tx.send_modify(|snap| {
            if let Some(song) = song {
                snap.song_title.clone_from(&song.title);
                snap.song_artist.clone_from(&song.artist);
                snap.cover_art = song.art.clone();
                snap.lyric_offset_ms = offset_ms;
            }
            snap.transcript = Arc::new(Transcript::default());
            snap.active_line_index = None;
            snap.active_line_text = None;
            snap.is_loading = true;
            snap.phase = SyncPhase::Fetching;
        });
        let _ = self.event_tx.send(SyncEvent::SearchStarted { provider, page });

        tokio::spawn(Arc::clone(self).run_fetch(generation, token, query, page, provider));
    }

    /// Cancel the in-flight search and invalidate its generation
    fn cancel_fetch(control: &mut ControlState) {
        if let Some(token) = control.fetch_token.take() {
            token.cancel();
        }
        control.fetch_generation = control.fetch_generation.wrapping_add(1);
    }

    async fn run_fetch(
        self: Arc<Self>,
        generation: u64,
        token: CancellationToken,
        query: SearchQuery,
        page: u32,
        provider_type: LyricsProviderType,
    ) {
        let resolved = if let Some(provider) = self.providers.get(provider_type) {
            let candidates = self.planner.candidates(&query.title, &query.artist);
            let request = SearchRequest {
                provider: provider.as_ref(),
                parser: self.parser.as_ref(),
                options: self.options,
                page,
                cancel: &token,
            };

            tokio::select! {
                () = token.cancelled() => {
                    debug!(target: LOG_TARGET, "Search for {} cancelled", query);
                    return;
                }
                resolved = resolve(&candidates, &request) => resolved,
            }
        } else {
            warn!(target: LOG_TARGET, "No {} provider registered, treating as not found", provider_type);
            None
        };

        self.settle_fetch(generation, resolved);
    }

    fn settle_fetch(&self, generation: u64, resolved: Option<ResolvedLyrics>) {
        let mut control = self.control();
        if control.fetch_generation != generation {
            debug!(target: LOG_TARGET, "Discarding result of superseded search");
            return;
        }
        control.fetch_token = None;

        let sample = self.bridge.playback();
        let position_ms = sample.map_or(0, |s| s.position_at(Instant::now()));
        let is_playing = sample.is_some_and(|s| s.is_playing);

        match resolved {
            Some(resolved) => {
                control.last_not_found = false;
                let lines = resolved.transcript.len();
                let offset_ms = control.offset_ms;
                let mut line_changed = None;
                // Lyrics land with their active line already placed
                self.snapshot_tx.send_modify(|snap| {
                    snap.transcript = Arc::new(resolved.transcript);
                    snap.active_line_index = None;
                    snap.active_line_text = None;
                    snap.is_loading = false;
                    snap.phase = SyncPhase::Synced;
                    line_changed = place_position(snap, position_ms, is_playing, offset_ms).1;
                });
                let _ = self.event_tx.send(SyncEvent::LyricsLoaded {
                    lines,
                    query: resolved.query,
                });
                self.emit_line_changed(line_changed, position_ms);
            }
            None => {
                control.last_not_found = true;
                let message = self.config.not_found_message.clone();
                self.snapshot_tx.send_modify(|snap| {
                    snap.transcript = Arc::new(Transcript::default());
                    snap.active_line_index = None;
                    snap.active_line_text = Some(message);
                    snap.is_loading = false;
                    snap.phase = SyncPhase::Synced;
                });
                let _ = self.event_tx.send(SyncEvent::LyricsNotFound);
            }
        }
    }

    /// Start or stop the tick loop so it runs exactly while a song is playing
    fn sync_ticking(self: &Arc<Self>, control: &mut ControlState) {
        let wanted = control.identity.is_some() && control.sample_playing;
        match (wanted, control.tick_token.is_some()) {
            (true, false) => {
                control.tick_generation = control.tick_generation.wrapping_add(1);
                let token = self.cancel.child_token();
                control.tick_token = Some(token.clone());
                tokio::spawn(Arc::clone(self).run_ticks(
                    control.tick_generation,
                    token,
                    self.config.tick_interval(),
                ));
            }
            (false, true) => {
                if let Some(token) = control.tick_token.take() {
                    token.cancel();
                }
                control.tick_generation = control.tick_generation.wrapping_add(1);
            }
            _ => {}
        }
    }

    async fn run_ticks(self: Arc<Self>, generation: u64, token: CancellationToken, period: Duration) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(sample) = self.bridge.playback().filter(|s| s.is_playing) else {
                continue;
            };
            let control = self.control();
            if control.tick_generation != generation {
                break;
            }
            self.recompute(&control, sample.position_at(Instant::now()), true);
        }
        debug!(target: LOG_TARGET, "Tick loop {} stopped", generation);
    }
}

/// Write the position into `snap` and re-evaluate the active line.
/// Returns whether subscribers need a notification, plus the new line when
/// the active line moved onto one.
fn place_position(
    snap: &mut SyncSnapshot,
    position_ms: i64,
    is_playing: bool,
    offset_ms: i64,
) -> (bool, Option<(usize, String)>) {
    snap.current_timestamp_ms = position_ms;
    let mut notify = snap.is_playing != is_playing || snap.lyric_offset_ms != offset_ms;
    snap.is_playing = is_playing;
    snap.lyric_offset_ms = offset_ms;

    let mut line_changed = None;
    if snap.phase == SyncPhase::Synced && !snap.transcript.is_empty() {
        let index = active_index(&snap.transcript, position_ms, offset_ms);
        if index != snap.active_line_index {
            let text = index
                .and_then(|i| snap.transcript.text_at(i))
                .map(str::to_owned);
            if let (Some(index), Some(text)) = (index, text.as_ref()) {
                line_changed = Some((index, text.clone()));
            }
            snap.active_line_index = index;
            snap.active_line_text = text;
            notify = true;
        }
    }
    (notify, line_changed)
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
