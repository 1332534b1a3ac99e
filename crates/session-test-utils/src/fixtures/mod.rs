//! Pre-configured test data and a session harness.
//!
//! Provides:
//! - A deterministic session configuration
//! - Builders for room notifications
//! - `SessionHarness`, which wires every mock into a running session

use crate::mock_channel::{ChannelRemote, MockChannel};
use crate::mock_engine::MockDevice;
use crate::mock_media::{MockCaptureSource, MockKeepAliveAudio, MockSink, MockSinkFactory};

use common::protocol::{
    AvailablePeers, PeerDetails, PeerLeft, PeerMediaStateChanged, ServerNotification,
};
use common::types::{MediaKind, PeerId};
use media_session::actors::{SessionEvent, SessionHandle};
use media_session::{Config, MediaSession, SessionDeps, SessionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Display name used by `test_config`.
pub const TEST_DISPLAY_NAME: &str = "Alice";

/// Room joined by `test_config`.
pub const TEST_ROOM_ID: &str = "test-room";

/// A session configuration with fixed names and the default timings.
#[must_use]
pub fn test_config() -> Config {
    Config {
        room_id: TEST_ROOM_ID.to_string(),
        display_name: TEST_DISPLAY_NAME.to_string(),
        ..Config::default()
    }
}

/// A remote participant with audio and video enabled.
#[must_use]
pub fn peer_details(id: &str, display_name: &str) -> PeerDetails {
    PeerDetails {
        id: PeerId::from(id),
        display_name: display_name.to_string(),
        audio_enabled: true,
        video_enabled: true,
    }
}

#[must_use]
pub fn peer_joined(id: &str, display_name: &str) -> ServerNotification {
    ServerNotification::PeerJoined(peer_details(id, display_name))
}

#[must_use]
pub fn peer_left(id: &str) -> ServerNotification {
    ServerNotification::PeerLeft(PeerLeft {
        id: PeerId::from(id),
    })
}

/// A roster snapshot of `(id, display_name)` pairs.
#[must_use]
pub fn available_peers(peers: &[(&str, &str)]) -> ServerNotification {
    ServerNotification::SetAvailablePeers(AvailablePeers {
        other_peer_details: peers
            .iter()
            .map(|(id, name)| peer_details(id, name))
            .collect(),
    })
}

#[must_use]
pub fn media_state(id: &str, kind: MediaKind, enabled: bool) -> ServerNotification {
    ServerNotification::PeerMediaStateChanged(PeerMediaStateChanged {
        peer_id: PeerId::from(id),
        kind,
        enabled,
    })
}

/// Let spawned actors drain their mailboxes.
///
/// Under a paused clock the sleep completes as soon as every task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Builds a media session on top of mocks.
///
/// Every mock is public so tests can configure it before `start` and keep a
/// reference for assertions afterwards.
pub struct SessionHarness {
    pub config: Config,
    pub channel: Arc<MockChannel>,
    pub device: Arc<MockDevice>,
    pub capture: Arc<MockCaptureSource>,
    pub sinks: Arc<MockSinkFactory>,
    pub keep_alive: Arc<MockKeepAliveAudio>,
    pub preview: Arc<MockSink>,
}

impl Default for SessionHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHarness {
    /// A harness where every step succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: test_config(),
            channel: MockChannel::builder().build(),
            device: MockDevice::new(),
            capture: MockCaptureSource::new(),
            sinks: MockSinkFactory::new(),
            keep_alive: MockKeepAliveAudio::new(),
            preview: Arc::new(MockSink::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Arc<MockChannel>) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: Arc<MockDevice>) -> Self {
        self.device = device;
        self
    }

    #[must_use]
    pub fn with_capture(mut self, capture: Arc<MockCaptureSource>) -> Self {
        self.capture = capture;
        self
    }

    #[must_use]
    pub fn with_sinks(mut self, sinks: Arc<MockSinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Run the setup sequence.
    pub async fn start(self) -> Result<RunningSession, SessionError> {
        let (remote, channel_events) = ChannelRemote::new();
        let deps = SessionDeps {
            channel: self.channel.clone(),
            channel_events,
            device: self.device.clone(),
            capture: self.capture.clone(),
            sinks: self.sinks.clone(),
            keep_alive: self.keep_alive.clone(),
            preview: Some(self.preview.clone()),
        };

        let (handle, task) = MediaSession::start(self.config, deps).await?;
        let events = handle.subscribe();

        Ok(RunningSession {
            handle,
            task,
            remote,
            events,
            channel: self.channel,
            device: self.device,
            capture: self.capture,
            sinks: self.sinks,
            keep_alive: self.keep_alive,
            preview: self.preview,
        })
    }
}

/// A started session and the mocks behind it.
pub struct RunningSession {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub remote: ChannelRemote,
    pub events: broadcast::Receiver<SessionEvent>,
    pub channel: Arc<MockChannel>,
    pub device: Arc<MockDevice>,
    pub capture: Arc<MockCaptureSource>,
    pub sinks: Arc<MockSinkFactory>,
    pub keep_alive: Arc<MockKeepAliveAudio>,
    pub preview: Arc<MockSink>,
}

impl RunningSession {
    /// Every event received so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
