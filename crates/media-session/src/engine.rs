//! Media engine seams.
//!
//! The orchestrator drives an external media engine (device, transports,
//! producers, consumers) through these traits. Transports report back
//! through a `TransportObserver` the orchestrator hands in at creation.

use crate::errors::{EngineError, SignalingError};
use crate::media::{LocalTrack, TrackRef};
use crate::transport::TransportState;

use async_trait::async_trait;
use common::protocol::{ConsumerDetails, DtlsParameters, RtpCapabilities, TransportOptions};
use common::types::{ConsumerId, MediaKind, ProducerId, TransportId};
use serde_json::Value;
use std::sync::Arc;

/// Local media engine handle.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    /// Load the routing capabilities. Must precede any transport creation.
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), EngineError>;

    /// Whether `load` has completed.
    fn loaded(&self) -> bool;

    /// Whether the loaded capabilities allow producing `kind`.
    fn can_produce(&self, kind: MediaKind) -> bool;

    /// The device's own receive capabilities, sent with `join`.
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Instantiate the outbound transport.
    fn create_send_transport(
        &self,
        options: TransportOptions,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn EngineTransport>, EngineError>;

    /// Instantiate the inbound transport.
    fn create_recv_transport(
        &self,
        options: TransportOptions,
        observer: Arc<dyn TransportObserver>,
    ) -> Result<Arc<dyn EngineTransport>, EngineError>;
}

/// Callbacks the engine invokes on a transport's owner.
#[async_trait]
pub trait TransportObserver: Send + Sync {
    /// Connect handshake: forward the local DTLS parameters to the room.
    async fn connect(&self, dtls_parameters: DtlsParameters) -> Result<(), SignalingError>;

    /// Producer registration (send transports only): obtain the server-side id.
    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerId, SignalingError>;

    /// The transport's connection state changed.
    fn connection_state_changed(&self, state: TransportState);
}

/// An engine transport.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    fn id(&self) -> &TransportId;

    /// Bind a local track, creating a producer.
    async fn produce(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn Producer>, EngineError>;

    /// Create a consumer from a room-supplied descriptor.
    async fn consume(&self, details: ConsumerDetails) -> Result<Arc<dyn Consumer>, EngineError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A published local track.
pub trait Producer: Send + Sync {
    fn id(&self) -> &ProducerId;
    fn kind(&self) -> MediaKind;
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// A subscribed remote track.
pub trait Consumer: Send + Sync {
    fn id(&self) -> &ConsumerId;
    fn producer_id(&self) -> &ProducerId;
    fn kind(&self) -> MediaKind;
    fn track(&self) -> TrackRef;
    fn close(&self);
    fn is_closed(&self) -> bool;
}
