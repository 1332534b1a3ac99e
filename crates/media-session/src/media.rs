//! Capture, playback and host-audio seams.

use crate::errors::{CaptureError, EngineError, PlaybackError};

use async_trait::async_trait;
use common::types::{MediaKind, PeerId, TrackSource};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Reference to a media track carried in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    pub id: String,
    pub kind: MediaKind,
}

/// An ordered set of tracks assigned to a sink as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStream {
    tracks: Vec<TrackRef>,
}

impl MediaStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream holding one track.
    #[must_use]
    pub fn from_track(track: TrackRef) -> Self {
        Self {
            tracks: vec![track],
        }
    }

    /// Add a track; duplicates by id are ignored.
    pub fn add_track(&mut self, track: TrackRef) {
        if !self.tracks.iter().any(|t| t.id == track.id) {
            self.tracks.push(track);
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Events raised by a local track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    /// The track stopped for good (device unplugged, host stopped sharing).
    Ended,
    /// The source stopped delivering frames.
    Muted,
    /// The source resumed delivering frames.
    Unmuted,
}

/// Local capture device access.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Prompt for and acquire a track. May wait indefinitely on a permission prompt.
    async fn acquire(&self, source: TrackSource) -> Result<Arc<dyn LocalTrack>, CaptureError>;
}

/// A captured local track.
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    fn source(&self) -> TrackSource;
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;

    /// Release the underlying device.
    fn stop(&self);

    fn subscribe(&self) -> broadcast::Receiver<TrackEvent>;

    fn track_ref(&self) -> TrackRef {
        TrackRef {
            id: self.id().to_string(),
            kind: self.source().media_kind(),
        }
    }
}

/// Buffering readiness of a sink, ordered from empty to fully buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Playback health of a consumer, independent of transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackStatus {
    Loading,
    Playing,
    Paused,
}

impl PlaybackStatus {
    /// Derive the status from a sink's readiness and paused flag.
    #[must_use]
    pub fn from_sink(ready_state: ReadyState, paused: bool) -> Self {
        if ready_state >= ReadyState::HaveCurrentData && !paused {
            PlaybackStatus::Playing
        } else if ready_state == ReadyState::HaveNothing {
            PlaybackStatus::Loading
        } else if paused {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Loading
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
        }
    }
}

/// A playback target (video or audio element).
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Assign (or clear, with `None`) the sink's stream.
    fn attach(&self, stream: Option<MediaStream>);

    fn stream(&self) -> Option<MediaStream>;
    fn ready_state(&self) -> ReadyState;
    fn is_paused(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn is_muted(&self) -> bool;

    /// Start playback. May be rejected by host autoplay policy.
    async fn play(&self) -> Result<(), PlaybackError>;

    /// Whether playback is stalled: paused, or not yet buffered.
    fn is_stalled(&self) -> bool {
        self.is_paused() || self.ready_state() < ReadyState::HaveCurrentData
    }

    fn playback_status(&self) -> PlaybackStatus {
        PlaybackStatus::from_sink(self.ready_state(), self.is_paused())
    }
}

/// Creates sinks for remote peers.
pub trait SinkFactory: Send + Sync {
    fn create_sink(&self, peer_id: &PeerId, kind: MediaKind) -> Arc<dyn MediaSink>;
}

/// Host audio context used to keep the session from being throttled.
#[async_trait]
pub trait KeepAliveAudio: Send + Sync {
    /// Start a continuous signal at `gain`.
    async fn start(&self, gain: f32) -> Result<(), EngineError>;

    /// Resume a suspended audio context.
    async fn resume(&self) -> Result<(), EngineError>;

    fn stop(&self);
}
