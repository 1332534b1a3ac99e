//! Capability negotiation.
//!
//! Fetches the room's routing capabilities and loads them into the local
//! media device. Every later setup step takes the resulting handle.

use crate::engine::MediaDevice;
use crate::errors::{EngineError, NegotiationError};
use crate::signaling::Signaling;

use common::protocol::RtpCapabilities;
use common::types::MediaKind;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Negotiated capabilities bound to a loaded device.
#[derive(Clone)]
pub struct CapabilityHandle {
    device: Arc<dyn MediaDevice>,
    router_capabilities: RtpCapabilities,
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityHandle")
            .field("codecs", &self.router_capabilities.codecs.len())
            .field("can_produce_audio", &self.can_produce(MediaKind::Audio))
            .field("can_produce_video", &self.can_produce(MediaKind::Video))
            .finish()
    }
}

impl CapabilityHandle {
    /// Whether the session may produce `kind`.
    #[must_use]
    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.router_capabilities.supports(kind) && self.device.can_produce(kind)
    }

    /// The device's receive capabilities, announced on join.
    #[must_use]
    pub fn rtp_capabilities(&self) -> RtpCapabilities {
        self.device.rtp_capabilities()
    }

    #[must_use]
    pub fn router_capabilities(&self) -> &RtpCapabilities {
        &self.router_capabilities
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn MediaDevice> {
        &self.device
    }
}

/// Query the routing capabilities and load them into `device`.
///
/// # Errors
///
/// Fails if the query fails, the returned set is empty, or the device
/// cannot use any of it.
#[instrument(skip_all, name = "session.negotiate")]
pub async fn negotiate(
    signaling: &Signaling,
    device: Arc<dyn MediaDevice>,
) -> Result<CapabilityHandle, NegotiationError> {
    let router_capabilities = signaling.get_router_rtp_capabilities().await?;
    if router_capabilities.is_empty() {
        return Err(NegotiationError::EmptyCapabilities);
    }

    device.load(&router_capabilities).await?;
    if !device.loaded() {
        return Err(NegotiationError::Unsupported(EngineError::NotLoaded));
    }

    let handle = CapabilityHandle {
        device,
        router_capabilities,
    };

    if !handle.can_produce(MediaKind::Audio)
        && !handle.can_produce(MediaKind::Video)
        && handle.rtp_capabilities().is_empty()
    {
        return Err(NegotiationError::Unsupported(
            EngineError::UnsupportedCapabilities("no usable codec".to_string()),
        ));
    }

    info!(
        target: "session.actor",
        codecs = handle.router_capabilities.codecs.len(),
        audio = handle.can_produce(MediaKind::Audio),
        video = handle.can_produce(MediaKind::Video),
        "Capabilities negotiated"
    );

    Ok(handle)
}
