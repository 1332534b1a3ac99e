//! Message and state types for the session actor.

use crate::errors::{ProduceError, TransportFailure};
use crate::media::{PlaybackStatus, TrackEvent};
use crate::registry::Peer;
use crate::transport::TransportState;

use common::types::{ConsumerId, MediaKind, PeerId, ProducerId, TrackSource};
use tokio::sync::oneshot;

/// Messages handled by the `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Flip the microphone track's enabled flag.
    ToggleAudio { respond_to: oneshot::Sender<bool> },

    /// Flip the camera track's enabled flag.
    ToggleVideo { respond_to: oneshot::Sender<bool> },

    /// Start screen sharing. `Ok(false)` when already sharing.
    ShareScreen {
        respond_to: oneshot::Sender<Result<bool, ProduceError>>,
    },

    /// Stop screen sharing. `false` when not sharing.
    StopScreenShare { respond_to: oneshot::Sender<bool> },

    /// Snapshot of the session state.
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },

    /// Exposed peer list (local participant excluded).
    GetPeers {
        respond_to: oneshot::Sender<Vec<Peer>>,
    },

    /// Playback status of one peer's consumers.
    GetPeerPlayback {
        peer_id: PeerId,
        respond_to: oneshot::Sender<Option<PeerPlayback>>,
    },

    /// Host page visibility changed.
    SetVisibility { visibility: Visibility },

    /// Presentation window shown or hidden.
    SetVisible { visible: bool },

    /// Leave the room and tear the session down.
    Leave { respond_to: oneshot::Sender<()> },

    /// Reported by a local track watcher.
    LocalTrackEvent {
        source: TrackSource,
        track_id: String,
        event: TrackEvent,
    },
}

/// Host page visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        matches!(self, Visibility::Hidden)
    }
}

/// Signals consumed by a presentation component hosting the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidgetSignal {
    /// The session is live.
    pub active: bool,
    /// The presentation window is shown.
    pub visible: bool,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Left,
    ChannelClosed,
}

impl EndReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::Left => "left",
            EndReason::ChannelClosed => "channel_closed",
        }
    }
}

/// Events broadcast to session subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The exposed peer list changed.
    PeersChanged(Vec<Peer>),
    /// A local audio/video flag changed.
    LocalMediaChanged { kind: MediaKind, enabled: bool },
    /// Screen sharing started or stopped.
    ScreenShareChanged { active: bool },
    /// A transport failed; the session continues degraded.
    TransportFailed(TransportFailure),
    /// The session ended.
    Ended(EndReason),
}

/// Local publishing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
    pub audio_producer: Option<ProducerId>,
    pub video_producer: Option<ProducerId>,
    pub screen_producer: Option<ProducerId>,
    /// Source currently rendered in the local preview.
    pub active_video_source: Option<TrackSource>,
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub room_id: String,
    pub display_name: String,
    pub local_peer_id: Option<PeerId>,
    pub local_media: LocalMediaState,
    pub send_transport: Option<TransportState>,
    pub receive_transport: Option<TransportState>,
    pub transport_failures: Vec<TransportFailure>,
    pub peers: Vec<Peer>,
    pub consumer_managers: usize,
}

impl SessionState {
    /// Whether any transport has failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.transport_failures.is_empty()
    }
}

/// Playback status of one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerStatus {
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub playback: PlaybackStatus,
}

/// Playback status of every consumer owned for one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPlayback {
    pub peer_id: PeerId,
    /// False while the manager waits for a receive transport.
    pub active: bool,
    pub consumers: Vec<ConsumerStatus>,
}
