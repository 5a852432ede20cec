mod commands;

use crate::commands::ObserverCommand;
use lyricsync_core::{
    format_position, CoreError, LyricSyncConfig, LyricsProviderType, PlaybackBridge,
    ProviderRegistry, SyncEngine, SyncEvent, SyncSnapshot,
};
use lyricsync_lyrics_lrclib::LrclibProvider;
use lyricsync_lyrics_netease::NeteaseProvider;
use std::fs::File;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    // Tracing comes up before the full config load, so peek at [logging] only
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    let config = match LyricSyncConfig::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(
                "Wrote a new configuration template to {}; using defaults",
                path.display()
            );
            LyricSyncConfig::default()
        }
        Err(e) => {
            error!(
                "Failed to load {}: {e}",
                LyricSyncConfig::config_path().display()
            );
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = runtime.block_on(run(&config, cancel_token)) {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: &LyricSyncConfig, cancel_token: CancellationToken) -> Result<(), CoreError> {
    let providers = create_providers();
    info!(
        "Initialized lyrics providers {:?} (selected: {})",
        providers.names(),
        config.lyrics.provider
    );

    let bridge = PlaybackBridge::new();
    let engine = SyncEngine::new(Arc::clone(&bridge), providers, config)?;
    engine.start();

    tokio::spawn(log_sync_events(Arc::clone(&engine)));
    tokio::spawn(print_active_lines(engine.subscribe()));

    read_observer_commands(&bridge, &engine, &cancel_token).await;

    engine.cancel_token().cancel();
    info!("Shutdown complete");
    Ok(())
}

fn create_providers() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    info!("Initializing LRCLIB provider");
    match LrclibProvider::new() {
        Ok(provider) => registry = registry.with(LyricsProviderType::Lrclib, Arc::new(provider)),
        Err(e) => error!("Failed to create LRCLIB provider: {}", e),
    }

    info!("Initializing NetEase provider");
    match NeteaseProvider::new() {
        Ok(provider) => registry = registry.with(LyricsProviderType::Netease, Arc::new(provider)),
        Err(e) => error!("Failed to create NetEase provider: {}", e),
    }

    registry
}

/// Feed stdin observer messages into the bridge and engine until Ctrl+C.
/// Input ending early leaves the engine running on the last known state.
async fn read_observer_commands(
    bridge: &PlaybackBridge,
    engine: &Arc<SyncEngine>,
    cancel_token: &CancellationToken,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0_u64;

    loop {
        let line = tokio::select! {
            () = cancel_token.cancelled() => return,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                line_number += 1;
                match ObserverCommand::parse_line(&line) {
                    Ok(Some(command)) => {
                        debug!("Observer command: {:?}", command);
                        command.apply(bridge, engine);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping malformed input line {}: {}", line_number, e),
                }
            }
            Ok(None) => {
                info!("Observer input closed, press Ctrl+C to exit");
                break;
            }
            Err(e) => {
                error!("Failed to read observer input: {}", e);
                break;
            }
        }
    }

    cancel_token.cancelled().await;
}

/// Print the active line to stdout whenever it changes
async fn print_active_lines(mut rx: watch::Receiver<SyncSnapshot>) {
    let mut last: Option<(Option<usize>, Option<String>)> = None;

    while rx.changed().await.is_ok() {
        let (current, position) = {
            let snapshot = rx.borrow_and_update();
            (
                (
                    snapshot.active_line_index,
                    snapshot.active_line_text.clone(),
                ),
                snapshot.current_timestamp_ms,
            )
        };

        if last.as_ref() == Some(&current) {
            continue;
        }
        if let (_, Some(text)) = &current {
            println!("[{}] {}", format_position(position), text);
        }
        last = Some(current);
    }
}

/// Log all sync events to the console
async fn log_sync_events(sync_engine: Arc<SyncEngine>) {
    let mut rx = sync_engine.subscribe_events();

    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                SyncEvent::TrackChanged { title, artist } => {
                    info!("Track changed: {} - {}", artist, title);
                }
                SyncEvent::SearchStarted { provider, page } => {
                    info!("Searching {} (page {})", provider, page);
                }
                SyncEvent::LyricsLoaded { lines, query } => {
                    info!("Lyrics loaded: {} lines via {}", lines, query);
                }
                SyncEvent::LyricsNotFound => {
                    info!("No lyrics found for current track");
                }
                SyncEvent::LineChanged { index, text } => {
                    debug!("Line {}: {}", index, text);
                }
                SyncEvent::PlaybackResumed { position_ms } => {
                    info!("Playback resumed at {}", format_position(*position_ms));
                }
                SyncEvent::PlaybackPaused { position_ms } => {
                    info!("Playback paused at {}", format_position(*position_ms));
                }
                SyncEvent::PlaybackStopped => {
                    info!("Playback stopped");
                }
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                info!("Sync event channel closed");
                break;
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                info!("Missed {} sync events", n);
            }
        }
    }
}

/// Check if file logging is enabled by reading the config file.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled() -> bool {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        file_enabled: bool,
    }

    let config_path = LyricSyncConfig::config_path();
    let Ok(content) = std::fs::read_to_string(&config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.file_enabled)
        .unwrap_or(false)
}

/// Initialize tracing with stderr output and optional file logging.
/// Stdout is reserved for lyric lines.
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest_retry=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = lyricsync_core::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
