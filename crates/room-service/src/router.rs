//! Media routing engine seam.
//!
//! The engine that forwards RTP between peers is external. A room owns one
//! `MediaRouter`, created from a `MediaWorker` with the room's codec set.
//! Consumers are always created paused; the consuming peer resumes them
//! once its playback is wired.

use crate::errors::RouterError;

use async_trait::async_trait;
use common::protocol::{
    ConsumerDetails, DtlsParameters, RtpCapabilities, RtpCodecCapability, TransportOptions,
};
use common::types::{ConsumerId, MediaKind, ProducerId, TransportId};
use serde_json::Value;
use std::sync::Arc;

/// Factory of routers.
#[async_trait]
pub trait MediaWorker: Send + Sync {
    async fn create_router(
        &self,
        media_codecs: Vec<RtpCodecCapability>,
    ) -> Result<Arc<dyn MediaRouter>, RouterError>;
}

/// One room's routing engine.
#[async_trait]
pub trait MediaRouter: Send + Sync {
    /// Capabilities announced to joining clients.
    fn rtp_capabilities(&self) -> RtpCapabilities;

    async fn create_webrtc_transport(&self) -> Result<TransportOptions, RouterError>;

    async fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), RouterError>;

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerId, RouterError>;

    /// Whether a client with `rtp_capabilities` can receive `producer_id`.
    fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool;

    /// Create a paused consumer of `producer_id` on `transport_id`.
    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerDetails, RouterError>;

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<(), RouterError>;

    /// Close a transport and every producer and consumer on it.
    fn close_transport(&self, transport_id: &TransportId);

    fn close_producer(&self, producer_id: &ProducerId);
}
