//! JSON-lines protocol spoken by the external player observer on stdin.
//!
//! One object per line, discriminated by `type`:
//!
//! ```text
//! {"type":"song","title":"Bohemian Rhapsody","artist":"Queen","art_uri":"file:///tmp/a.png"}
//! {"type":"playback","playing":true,"position_ms":12000,"speed":1.0}
//! {"type":"clear"}
//! {"type":"query","title":"Bohemian Rhapsody","artist":"Queen"}
//! {"type":"refresh"}
//! {"type":"provider","provider":"netease"}
//! {"type":"offset","ms":-250}
//! ```

use lyricsync_core::{
    ArtRef, LyricsProviderType, PlaybackBridge, PlaybackSample, SongIdentity, SyncEngine,
};
use serde::Deserialize;
use std::sync::Arc;

/// A single observer message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverCommand {
    /// The player reports its current song
    Song {
        title: String,
        artist: String,
        #[serde(default)]
        art_uri: Option<String>,
    },
    /// The player went away
    Clear,
    /// A fresh playback position sample
    Playback {
        playing: bool,
        position_ms: i64,
        #[serde(default)]
        speed: Option<f64>,
    },
    /// Search with user-supplied terms
    Query { title: String, artist: String },
    /// Try the next alternative result
    Refresh,
    /// Switch lyrics provider
    Provider { provider: LyricsProviderType },
    /// Shift lyric timing
    Offset { ms: i64 },
}

impl ObserverCommand {
    /// Parse one input line. Blank lines and `#` comments yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed or unknown messages.
    pub fn parse_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    /// Forward the command to the bridge (player signals) or the engine
    /// (user actions)
    pub fn apply(self, bridge: &PlaybackBridge, engine: &Arc<SyncEngine>) {
        match self {
            Self::Song {
                title,
                artist,
                art_uri,
            } => {
                let art = art_uri.map_or(ArtRef::None, ArtRef::Uri);
                bridge.publish_song(Some(SongIdentity::new(title, artist).with_art(art)));
            }
            Self::Clear => bridge.clear(),
            Self::Playback {
                playing,
                position_ms,
                speed,
            } => {
                let sample = PlaybackSample::new(playing, position_ms);
                let sample = speed.map_or(sample, |speed| sample.with_speed(speed));
                bridge.publish_playback(Some(sample));
            }
            Self::Query { title, artist } => engine.set_query(&title, &artist),
            Self::Refresh => engine.refresh(),
            Self::Provider { provider } => engine.set_provider(provider),
            Self::Offset { ms } => engine.set_lyric_offset(ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_song() {
        let command =
            ObserverCommand::parse_line(r#"{"type":"song","title":"Song","artist":"Artist"}"#)
                .unwrap();
        assert_eq!(
            command,
            Some(ObserverCommand::Song {
                title: "Song".to_string(),
                artist: "Artist".to_string(),
                art_uri: None,
            })
        );
    }

    #[test]
    fn test_parse_playback_with_speed() {
        let command = ObserverCommand::parse_line(
            r#"{"type":"playback","playing":true,"position_ms":1500,"speed":1.25}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            Some(ObserverCommand::Playback {
                playing: true,
                position_ms: 1500,
                speed: Some(1.25),
            })
        );
    }

    #[test]
    fn test_parse_user_actions() {
        assert_eq!(
            ObserverCommand::parse_line(r#"{"type":"provider","provider":"netease"}"#).unwrap(),
            Some(ObserverCommand::Provider {
                provider: LyricsProviderType::Netease
            })
        );
        assert_eq!(
            ObserverCommand::parse_line(r#"{"type":"offset","ms":-250}"#).unwrap(),
            Some(ObserverCommand::Offset { ms: -250 })
        );
        assert_eq!(
            ObserverCommand::parse_line(r#" {"type":"refresh"} "#).unwrap(),
            Some(ObserverCommand::Refresh)
        );
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(ObserverCommand::parse_line("   ").unwrap(), None);
        assert_eq!(ObserverCommand::parse_line("# demo script").unwrap(), None);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(ObserverCommand::parse_line("not json").is_err());
        assert!(ObserverCommand::parse_line(r#"{"type":"rewind"}"#).is_err());
        assert!(ObserverCommand::parse_line(r#"{"type":"song","title":"x"}"#).is_err());
        assert!(ObserverCommand::parse_line(r#"{"type":"provider","provider":"spotify"}"#).is_err());
    }

    #[test]
    fn test_apply_forwards_to_bridge() {
        let bridge = PlaybackBridge::new();
        let engine = SyncEngine::new(
            Arc::clone(&bridge),
            lyricsync_core::ProviderRegistry::new(),
            &lyricsync_core::LyricSyncConfig::default(),
        )
        .unwrap();

        ObserverCommand::Song {
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            art_uri: Some("file:///cover.png".to_string()),
        }
        .apply(&bridge, &engine);
        let song = bridge.song().unwrap();
        assert_eq!(song.title, "Song");
        assert_eq!(song.art, ArtRef::Uri("file:///cover.png".to_string()));

        ObserverCommand::Playback {
            playing: false,
            position_ms: 4200,
            speed: Some(2.0),
        }
        .apply(&bridge, &engine);
        let sample = bridge.playback().unwrap();
        assert_eq!(sample.position_ms, 4200);
        assert!((sample.speed - 2.0).abs() < f64::EPSILON);

        ObserverCommand::Clear.apply(&bridge, &engine);
        assert!(bridge.song().is_none());
        assert!(bridge.playback().is_none());
    }
}
