//! In-memory media router for room service tests.
//!
//! Tracks transports, producers and consumers the way a routing engine
//! does, without moving any media. Consumers start paused.
//!
//! # Example
//!
//! ```rust,ignore
//! use session_test_utils::MockWorker;
//!
//! let worker = MockWorker::new();
//! let controller = RoomControllerHandle::new(config, worker.clone());
//! // ... drive the room ...
//! let router = worker.router(0).unwrap();
//! assert!(router.consumers().iter().all(|c| !c.paused));
//! ```

use async_trait::async_trait;
use common::protocol::{
    ConsumerDetails, DtlsParameters, RtpCapabilities, RtpCodecCapability, TransportOptions,
};
use common::types::{ConsumerId, MediaKind, ProducerId, TransportId};
use room_service::router::{MediaRouter, MediaWorker};
use room_service::RouterError;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Router factory that remembers every router it created.
#[derive(Default)]
pub struct MockWorker {
    routers: Mutex<Vec<Arc<MockRouter>>>,
    fail: AtomicBool,
}

impl MockWorker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent `create_router` fail.
    pub fn fail_create(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// The `index`-th router created.
    #[must_use]
    pub fn router(&self, index: usize) -> Option<Arc<MockRouter>> {
        self.routers.lock().unwrap().get(index).cloned()
    }

    #[must_use]
    pub fn routers_created(&self) -> usize {
        self.routers.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaWorker for MockWorker {
    async fn create_router(
        &self,
        media_codecs: Vec<RtpCodecCapability>,
    ) -> Result<Arc<dyn MediaRouter>, RouterError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RouterError::Failed("worker unavailable".to_string()));
        }
        let router = Arc::new(MockRouter::new(media_codecs));
        self.routers.lock().unwrap().push(Arc::clone(&router));
        Ok(router)
    }
}

/// A producer registered on a mock router.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedProducer {
    pub id: ProducerId,
    pub transport_id: TransportId,
    pub kind: MediaKind,
}

/// A consumer registered on a mock router.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedConsumer {
    pub id: ConsumerId,
    pub transport_id: TransportId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub paused: bool,
}

#[derive(Default)]
struct RouterState {
    /// Transport id to connected flag.
    transports: HashMap<TransportId, bool>,
    producers: HashMap<ProducerId, RoutedProducer>,
    consumers: HashMap<ConsumerId, RoutedConsumer>,
}

/// In-memory router.
pub struct MockRouter {
    capabilities: RtpCapabilities,
    state: Mutex<RouterState>,
}

impl MockRouter {
    #[must_use]
    pub fn new(media_codecs: Vec<RtpCodecCapability>) -> Self {
        Self {
            capabilities: RtpCapabilities {
                codecs: media_codecs,
                header_extensions: Vec::new(),
            },
            state: Mutex::new(RouterState::default()),
        }
    }

    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.state.lock().unwrap().transports.len()
    }

    #[must_use]
    pub fn is_connected(&self, transport_id: &TransportId) -> bool {
        self.state
            .lock()
            .unwrap()
            .transports
            .get(transport_id)
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn producers(&self) -> Vec<RoutedProducer> {
        self.state.lock().unwrap().producers.values().cloned().collect()
    }

    #[must_use]
    pub fn consumers(&self) -> Vec<RoutedConsumer> {
        self.state.lock().unwrap().consumers.values().cloned().collect()
    }

    #[must_use]
    pub fn consumer(&self, consumer_id: &ConsumerId) -> Option<RoutedConsumer> {
        self.state.lock().unwrap().consumers.get(consumer_id).cloned()
    }
}

#[async_trait]
impl MediaRouter for MockRouter {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.capabilities.clone()
    }

    async fn create_webrtc_transport(&self) -> Result<TransportOptions, RouterError> {
        let id = TransportId::new();
        self.state
            .lock()
            .unwrap()
            .transports
            .insert(id.clone(), false);
        Ok(TransportOptions {
            id,
            ice_parameters: json!({"usernameFragment": "router", "password": "router"}),
            ice_candidates: json!([]),
            dtls_parameters: DtlsParameters::default(),
            sctp_parameters: None,
        })
    }

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        _dtls_parameters: DtlsParameters,
    ) -> Result<(), RouterError> {
        let mut state = self.state.lock().unwrap();
        let connected = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| RouterError::TransportNotFound(transport_id.clone()))?;
        *connected = true;
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        _rtp_parameters: Value,
    ) -> Result<ProducerId, RouterError> {
        let mut state = self.state.lock().unwrap();
        if !state.transports.contains_key(transport_id) {
            return Err(RouterError::TransportNotFound(transport_id.clone()));
        }
        let id = ProducerId::new();
        state.producers.insert(
            id.clone(),
            RoutedProducer {
                id: id.clone(),
                transport_id: transport_id.clone(),
                kind,
            },
        );
        Ok(id)
    }

    fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool {
        self.state
            .lock()
            .unwrap()
            .producers
            .get(producer_id)
            .is_some_and(|p| rtp_capabilities.supports(p.kind))
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerDetails, RouterError> {
        let mut state = self.state.lock().unwrap();
        if !state.transports.contains_key(transport_id) {
            return Err(RouterError::TransportNotFound(transport_id.clone()));
        }
        let kind = state
            .producers
            .get(producer_id)
            .map(|p| p.kind)
            .ok_or_else(|| RouterError::ProducerNotFound(producer_id.clone()))?;
        if !rtp_capabilities.supports(kind) {
            return Err(RouterError::CannotConsume(producer_id.clone()));
        }

        let id = ConsumerId::new();
        state.consumers.insert(
            id.clone(),
            RoutedConsumer {
                id: id.clone(),
                transport_id: transport_id.clone(),
                producer_id: producer_id.clone(),
                kind,
                paused: true,
            },
        );
        Ok(ConsumerDetails {
            id,
            producer_id: producer_id.clone(),
            kind,
            rtp_parameters: json!({}),
        })
    }

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<(), RouterError> {
        let mut state = self.state.lock().unwrap();
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| RouterError::ConsumerNotFound(consumer_id.clone()))?;
        consumer.paused = false;
        Ok(())
    }

    fn close_transport(&self, transport_id: &TransportId) {
        let mut state = self.state.lock().unwrap();
        state.transports.remove(transport_id);
        let closed: Vec<ProducerId> = state
            .producers
            .values()
            .filter(|p| &p.transport_id == transport_id)
            .map(|p| p.id.clone())
            .collect();
        state.producers.retain(|_, p| &p.transport_id != transport_id);
        state.consumers.retain(|_, c| {
            &c.transport_id != transport_id && !closed.contains(&c.producer_id)
        });
    }

    fn close_producer(&self, producer_id: &ProducerId) {
        let mut state = self.state.lock().unwrap();
        state.producers.remove(producer_id);
        state.consumers.retain(|_, c| &c.producer_id != producer_id);
    }
}
