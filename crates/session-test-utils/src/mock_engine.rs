//! Mock media engine.
//!
//! `MockDevice` hands out `MockTransport`s that drive their observer the way
//! a real engine does: the first produce or consume triggers the connect
//! handshake and reports `connecting` then `connected`. Produce round-trips
//! through the observer, so the producer id comes from the signaling mock.
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::MockDevice;
//!
//! let device = MockDevice::builder()
//!     .cannot_produce(MediaKind::Video)
//!     .fail_transport(Direction::Receive)
//!     .build();
//! ```

use async_trait::async_trait;
use common::protocol::{ConsumerDetails, RtpCapabilities, TransportOptions};
use common::types::{ConsumerId, Direction, MediaKind, ProducerId, TrackSource, TransportId};
use media_session::engine::{
    Consumer, EngineTransport, MediaDevice, Producer, TransportObserver,
};
use media_session::errors::EngineError;
use media_session::media::{LocalTrack, TrackRef};
use media_session::transport::TransportState;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted media device.
pub struct MockDevice {
    fail_load: bool,
    unsupported: HashSet<MediaKind>,
    failing_transports: HashSet<Direction>,
    failing_consumes: HashSet<MediaKind>,
    failing_produces: HashSet<TrackSource>,
    loaded: Mutex<Option<RtpCapabilities>>,
    transports: Mutex<HashMap<Direction, Arc<MockTransport>>>,
}

impl MockDevice {
    /// Create a new MockDevice builder.
    #[must_use]
    pub fn builder() -> MockDeviceBuilder {
        MockDeviceBuilder::default()
    }

    /// A device that supports everything.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// The last transport created for `direction`.
    #[must_use]
    pub fn transport(&self, direction: Direction) -> Option<Arc<MockTransport>> {
        self.transports.lock().unwrap().get(&direction).cloned()
    }

    fn create_transport(
        &self,
        direction: Direction,
        options: TransportOptions,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        if self.failing_transports.contains(&direction) {
            return Err(EngineError::Failed(format!(
                "{direction} transport creation failed"
            )));
        }

        let transport = Arc::new(MockTransport {
            id: options.id,
            direction,
            observer,
            failing_consumes: self.failing_consumes.clone(),
            failing_produces: self.failing_produces.clone(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            producers: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
        });
        self.transports
            .lock()
            .unwrap()
            .insert(direction, Arc::clone(&transport));
        Ok(transport)
    }
}

#[async_trait]
impl MediaDevice for MockDevice {
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), EngineError> {
        if self.fail_load {
            return Err(EngineError::UnsupportedCapabilities(
                "mock device rejects every codec".to_string(),
            ));
        }
        *self.loaded.lock().unwrap() = Some(router_capabilities.clone());
        Ok(())
    }

    fn loaded(&self) -> bool {
        self.loaded.lock().unwrap().is_some()
    }

    fn can_produce(&self, kind: MediaKind) -> bool {
        let supported = self
            .loaded
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|caps| caps.supports(kind));
        supported && !self.unsupported.contains(&kind)
    }

    fn rtp_capabilities(&self) -> RtpCapabilities {
        let mut caps = self.loaded.lock().unwrap().clone().unwrap_or_default();
        caps.codecs.retain(|codec| !self.unsupported.contains(&codec.kind));
        caps
    }

    fn create_send_transport(
        &self,
        options: TransportOptions,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        self.create_transport(Direction::Send, options, observer)
    }

    fn create_recv_transport(
        &self,
        options: TransportOptions,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn EngineTransport>, EngineError> {
        self.create_transport(Direction::Receive, options, observer)
    }
}

/// Builder for MockDevice configuration.
#[derive(Default)]
pub struct MockDeviceBuilder {
    fail_load: bool,
    unsupported: HashSet<MediaKind>,
    failing_transports: HashSet<Direction>,
    failing_consumes: HashSet<MediaKind>,
    failing_produces: HashSet<TrackSource>,
}

impl MockDeviceBuilder {
    /// Make `load` reject the router capabilities.
    #[must_use]
    pub fn fail_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Report that `kind` cannot be produced.
    #[must_use]
    pub fn cannot_produce(mut self, kind: MediaKind) -> Self {
        self.unsupported.insert(kind);
        self
    }

    /// Make creating the `direction` transport fail.
    #[must_use]
    pub fn fail_transport(mut self, direction: Direction) -> Self {
        self.failing_transports.insert(direction);
        self
    }

    /// Make consuming tracks of `kind` fail.
    #[must_use]
    pub fn fail_consume(mut self, kind: MediaKind) -> Self {
        self.failing_consumes.insert(kind);
        self
    }

    /// Make producing tracks from `source` fail.
    #[must_use]
    pub fn fail_produce(mut self, source: TrackSource) -> Self {
        self.failing_produces.insert(source);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<MockDevice> {
        Arc::new(MockDevice {
            fail_load: self.fail_load,
            unsupported: self.unsupported,
            failing_transports: self.failing_transports,
            failing_consumes: self.failing_consumes,
            failing_produces: self.failing_produces,
            loaded: Mutex::new(None),
            transports: Mutex::new(HashMap::new()),
        })
    }
}

/// Engine transport driven by test code.
pub struct MockTransport {
    id: TransportId,
    direction: Direction,
    observer: Arc<dyn TransportObserver>,
    failing_consumes: HashSet<MediaKind>,
    failing_produces: HashSet<TrackSource>,
    connected: AtomicBool,
    closed: AtomicBool,
    producers: Mutex<Vec<Arc<MockProducer>>>,
    consumers: Mutex<Vec<Arc<MockConsumer>>>,
}

impl MockTransport {
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Report a connection state change, as the engine would.
    pub fn emit_state(&self, state: TransportState) {
        self.observer.connection_state_changed(state);
    }

    /// Whether the connect handshake has run.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn producers(&self) -> Vec<Arc<MockProducer>> {
        self.producers.lock().unwrap().clone()
    }

    #[must_use]
    pub fn consumers(&self) -> Vec<Arc<MockConsumer>> {
        self.consumers.lock().unwrap().clone()
    }

    async fn ensure_connected(&self) -> Result<(), EngineError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.emit_state(TransportState::Connecting);
        self.observer
            .connect(Default::default())
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        self.emit_state(TransportState::Connected);
        Ok(())
    }
}

#[async_trait]
impl EngineTransport for MockTransport {
    fn id(&self) -> &TransportId {
        &self.id
    }

    async fn produce(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn Producer>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        if self.failing_produces.contains(&track.source()) {
            return Err(EngineError::Failed(format!(
                "{} produce failed",
                track.source()
            )));
        }
        self.ensure_connected().await?;

        let kind = track.source().media_kind();
        let id = self
            .observer
            .produce(kind, json!({ "trackId": track.id() }))
            .await
            .map_err(|e| EngineError::Failed(e.to_string()))?;

        let producer = Arc::new(MockProducer::new(id, kind, track.id()));
        self.producers.lock().unwrap().push(Arc::clone(&producer));
        Ok(producer)
    }

    async fn consume(&self, details: ConsumerDetails) -> Result<Arc<dyn Consumer>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        if self.failing_consumes.contains(&details.kind) {
            return Err(EngineError::Failed(format!("{} consume failed", details.kind)));
        }
        self.ensure_connected().await?;

        let consumer = Arc::new(MockConsumer::new(details));
        self.consumers.lock().unwrap().push(Arc::clone(&consumer));
        Ok(consumer)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Producer returned by `MockTransport::produce`.
#[derive(Debug)]
pub struct MockProducer {
    id: ProducerId,
    kind: MediaKind,
    track_id: String,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl MockProducer {
    fn new(id: ProducerId, kind: MediaKind, track_id: &str) -> Self {
        Self {
            id,
            kind,
            track_id: track_id.to_string(),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Id of the local track bound to this producer.
    #[must_use]
    pub fn track_id(&self) -> &str {
        &self.track_id
    }
}

impl Producer for MockProducer {
    fn id(&self) -> &ProducerId {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Consumer returned by `MockTransport::consume`.
#[derive(Debug)]
pub struct MockConsumer {
    id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    closed: AtomicBool,
}

impl MockConsumer {
    fn new(details: ConsumerDetails) -> Self {
        Self {
            id: details.id,
            producer_id: details.producer_id,
            kind: details.kind,
            closed: AtomicBool::new(false),
        }
    }
}

impl Consumer for MockConsumer {
    fn id(&self) -> &ConsumerId {
        &self.id
    }

    fn producer_id(&self) -> &ProducerId {
        &self.producer_id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn track(&self) -> TrackRef {
        TrackRef {
            id: format!("track-{}", self.id),
            kind: self.kind,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
