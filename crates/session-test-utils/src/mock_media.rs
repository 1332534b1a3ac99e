//! Mock capture devices, playback sinks and keep-alive audio.
//!
//! `MockSink` follows the playback rules of a host media element closely
//! enough to exercise autoplay fallback and stall recovery:
//! - A fresh sink is paused with nothing buffered
//! - Attaching a stream resets buffering
//! - A successful `play` unpauses and fully buffers the sink
//! - `reject_unmuted_play` models an autoplay policy that only allows muted playback
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::{MockCaptureSource, MockSinkFactory};
//!
//! let capture = MockCaptureSource::builder().deny(TrackSource::Audio).build();
//! let sinks = MockSinkFactory::rejecting_unmuted_play();
//! ```

use async_trait::async_trait;
use common::types::{MediaKind, PeerId, TrackSource};
use media_session::errors::{CaptureError, EngineError, PlaybackError};
use media_session::media::{
    CaptureSource, KeepAliveAudio, LocalTrack, MediaSink, MediaStream, ReadyState, SinkFactory,
    TrackEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

// ----------------------------------------------------------------------------
// Capture
// ----------------------------------------------------------------------------

/// A captured track controlled by test code.
pub struct MockTrack {
    id: String,
    source: TrackSource,
    enabled: AtomicBool,
    stopped: AtomicBool,
    events: broadcast::Sender<TrackEvent>,
}

impl MockTrack {
    #[must_use]
    pub fn new(id: impl Into<String>, source: TrackSource) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            id: id.into(),
            source,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            events,
        }
    }

    /// End the track, as when the device is unplugged or the host stops sharing.
    pub fn end(&self) {
        self.emit(TrackEvent::Ended);
    }

    pub fn emit(&self, event: TrackEvent) {
        let _ = self.events.send(event);
    }

    /// Whether the device was released.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl LocalTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> TrackSource {
        self.source
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.events.subscribe()
    }
}

/// Capture source that grants every request unless configured otherwise.
pub struct MockCaptureSource {
    denied: HashSet<TrackSource>,
    missing: HashSet<TrackSource>,
    acquired: Mutex<HashMap<TrackSource, Vec<Arc<MockTrack>>>>,
    counter: AtomicUsize,
}

impl MockCaptureSource {
    /// Create a new MockCaptureSource builder.
    #[must_use]
    pub fn builder() -> MockCaptureSourceBuilder {
        MockCaptureSourceBuilder::default()
    }

    /// A capture source that grants everything.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Every track acquired for `source`, in order.
    #[must_use]
    pub fn tracks(&self, source: TrackSource) -> Vec<Arc<MockTrack>> {
        self.acquired
            .lock()
            .unwrap()
            .get(&source)
            .cloned()
            .unwrap_or_default()
    }

    /// The most recent track acquired for `source`.
    #[must_use]
    pub fn last_track(&self, source: TrackSource) -> Option<Arc<MockTrack>> {
        self.tracks(source).pop()
    }
}

#[async_trait]
impl CaptureSource for MockCaptureSource {
    async fn acquire(&self, source: TrackSource) -> Result<Arc<dyn LocalTrack>, CaptureError> {
        if self.denied.contains(&source) {
            return Err(CaptureError::PermissionDenied(source));
        }
        if self.missing.contains(&source) {
            return Err(CaptureError::NotFound(source));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let track = Arc::new(MockTrack::new(format!("{source}-{n}"), source));
        self.acquired
            .lock()
            .unwrap()
            .entry(source)
            .or_default()
            .push(Arc::clone(&track));
        Ok(track)
    }
}

/// Builder for MockCaptureSource configuration.
#[derive(Default)]
pub struct MockCaptureSourceBuilder {
    denied: HashSet<TrackSource>,
    missing: HashSet<TrackSource>,
}

impl MockCaptureSourceBuilder {
    /// Deny permission for `source`.
    #[must_use]
    pub fn deny(mut self, source: TrackSource) -> Self {
        self.denied.insert(source);
        self
    }

    /// Report that no device exists for `source`.
    #[must_use]
    pub fn not_found(mut self, source: TrackSource) -> Self {
        self.missing.insert(source);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MockCaptureSource> {
        Arc::new(MockCaptureSource {
            denied: self.denied,
            missing: self.missing,
            acquired: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        })
    }
}

// ----------------------------------------------------------------------------
// Playback
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct SinkState {
    stream: Option<MediaStream>,
    ready_state: ReadyState,
    paused: bool,
    muted: bool,
    reject_all: bool,
    reject_unmuted: bool,
    stall_play: bool,
    play_calls: usize,
    attach_history: Vec<Option<MediaStream>>,
}

impl Default for SinkState {
    fn default() -> Self {
        Self {
            stream: None,
            ready_state: ReadyState::HaveNothing,
            paused: true,
            muted: false,
            reject_all: false,
            reject_unmuted: false,
            stall_play: false,
            play_calls: 0,
            attach_history: Vec::new(),
        }
    }
}

/// In-memory playback sink.
#[derive(Debug, Default)]
pub struct MockSink {
    state: Mutex<SinkState>,
}

impl MockSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only allow muted playback.
    pub fn reject_unmuted_play(&self, reject: bool) {
        self.state.lock().unwrap().reject_unmuted = reject;
    }

    /// Reject every playback attempt.
    pub fn reject_all_play(&self, reject: bool) {
        self.state.lock().unwrap().reject_all = reject;
    }

    /// Make every `play` hang, as when the host never settles the call.
    pub fn stall_play(&self, stall: bool) {
        self.state.lock().unwrap().stall_play = stall;
    }

    /// Force the paused flag, as when the host pauses a background element.
    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    /// Force the buffering state, as when the network stalls.
    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().unwrap().ready_state = ready_state;
    }

    /// Number of `play` attempts, successful or not.
    #[must_use]
    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    /// Every stream passed to `attach`, in order.
    #[must_use]
    pub fn attach_history(&self) -> Vec<Option<MediaStream>> {
        self.state.lock().unwrap().attach_history.clone()
    }
}

#[async_trait]
impl MediaSink for MockSink {
    fn attach(&self, stream: Option<MediaStream>) {
        let mut state = self.state.lock().unwrap();
        state.attach_history.push(stream.clone());
        state.stream = stream;
        state.ready_state = ReadyState::HaveNothing;
        state.paused = true;
    }

    fn stream(&self) -> Option<MediaStream> {
        self.state.lock().unwrap().stream.clone()
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready_state
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().unwrap().muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            state.play_calls += 1;
            state.stall_play
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();

        if state.reject_all || (state.reject_unmuted && !state.muted) {
            return Err(PlaybackError::NotAllowed(
                "play() requires user interaction".to_string(),
            ));
        }
        if state.stream.is_none() {
            return Err(PlaybackError::NoStream);
        }

        state.paused = false;
        state.ready_state = ReadyState::HaveEnoughData;
        Ok(())
    }
}

/// Sink factory that remembers every sink it created.
#[derive(Default)]
pub struct MockSinkFactory {
    reject_unmuted: bool,
    stall_play: bool,
    sinks: Mutex<HashMap<(PeerId, MediaKind), Arc<MockSink>>>,
    created: AtomicUsize,
}

impl MockSinkFactory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A factory whose sinks only allow muted playback.
    #[must_use]
    pub fn rejecting_unmuted_play() -> Arc<Self> {
        Arc::new(Self {
            reject_unmuted: true,
            ..Self::default()
        })
    }

    /// A factory whose sinks never finish `play`.
    #[must_use]
    pub fn stalling_play() -> Arc<Self> {
        Arc::new(Self {
            stall_play: true,
            ..Self::default()
        })
    }

    /// The latest sink created for `peer_id` and `kind`.
    #[must_use]
    pub fn sink(&self, peer_id: &str, kind: MediaKind) -> Option<Arc<MockSink>> {
        self.sinks
            .lock()
            .unwrap()
            .get(&(PeerId::from(peer_id), kind))
            .cloned()
    }

    /// Total number of sinks created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl SinkFactory for MockSinkFactory {
    fn create_sink(&self, peer_id: &PeerId, kind: MediaKind) -> Arc<dyn MediaSink> {
        let sink = Arc::new(MockSink::new());
        sink.reject_unmuted_play(self.reject_unmuted);
        sink.stall_play(self.stall_play);
        self.created.fetch_add(1, Ordering::SeqCst);
        self.sinks
            .lock()
            .unwrap()
            .insert((peer_id.clone(), kind), Arc::clone(&sink));
        sink
    }
}

// ----------------------------------------------------------------------------
// Keep-alive audio
// ----------------------------------------------------------------------------

/// Keep-alive audio that counts its calls.
#[derive(Debug, Default)]
pub struct MockKeepAliveAudio {
    started: AtomicUsize,
    resumed: AtomicUsize,
    stopped: AtomicUsize,
    last_gain: Mutex<Option<f32>>,
    fail_start: AtomicBool,
}

impl MockKeepAliveAudio {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `start` fail, as when the host blocks audio contexts.
    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn resumed(&self) -> usize {
        self.resumed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_gain(&self) -> Option<f32> {
        *self.last_gain.lock().unwrap()
    }
}

#[async_trait]
impl KeepAliveAudio for MockKeepAliveAudio {
    async fn start(&self, gain: f32) -> Result<(), EngineError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        *self.last_gain.lock().unwrap() = Some(gain);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::Failed("audio context blocked".to_string()));
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.resumed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}
