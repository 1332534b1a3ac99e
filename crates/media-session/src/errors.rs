//! Media session error types.
//!
//! Errors are split along the containment boundaries of the session:
//!
//! - `NegotiationError`, and `SessionError::Transport` when both transports
//!   fail, abort session setup and reach the session owner.
//! - `TransportFailure` is fatal for one transport only; the session keeps
//!   running degraded while the sibling transport is healthy.
//! - `ProduceError` (per kind) and `ConsumeError` (per track) are logged and
//!   contained by their owning manager.
//! - A stalled playback is a detected condition handled by the recovery loop,
//!   not an error value.

use common::error::ProtocolError;
use common::types::{ConsumerId, Direction, MediaKind, TrackSource};
use thiserror::Error;

/// Signaling channel failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    /// The remote side rejected the request.
    #[error("Request {method} rejected: {reason}")]
    Rejected { method: String, reason: String },

    /// No response arrived within the request timeout.
    #[error("Request {method} timed out")]
    Timeout { method: String },

    /// The channel is closed.
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// The response did not match the expected shape.
    #[error("Invalid response to {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    /// A payload could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl SignalingError {
    /// Returns a short label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            SignalingError::Rejected { .. } => "rejected",
            SignalingError::Timeout { .. } => "timeout",
            SignalingError::ChannelClosed => "channel_closed",
            SignalingError::InvalidResponse { .. } => "invalid_response",
            SignalingError::Protocol(_) => "protocol",
        }
    }
}

/// Media engine failures (device, transports, producers, consumers).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The device has not loaded routing capabilities yet.
    #[error("Device not loaded")]
    NotLoaded,

    /// The device cannot work with the given capabilities.
    #[error("Unsupported capabilities: {0}")]
    UnsupportedCapabilities(String),

    /// The transport or handle is closed.
    #[error("Engine object closed")]
    Closed,

    /// Any other engine failure.
    #[error("Engine failure: {0}")]
    Failed(String),
}

/// Local capture failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The user (or host policy) denied access to the device.
    #[error("Permission denied for {0} capture")]
    PermissionDenied(TrackSource),

    /// No device of the requested kind exists.
    #[error("No {0} capture device found")]
    NotFound(TrackSource),

    /// Any other capture failure.
    #[error("Capture failed: {0}")]
    Failed(String),
}

/// Sink playback failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// Playback blocked by host policy (typically unmuted autoplay).
    #[error("Playback not allowed: {0}")]
    NotAllowed(String),

    /// The sink has no stream attached.
    #[error("No stream attached")]
    NoStream,

    /// Playback was interrupted.
    #[error("Playback aborted: {0}")]
    Aborted(String),
}

/// Capability negotiation failures. Always abort session setup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// The routing capabilities could not be fetched.
    #[error("Failed to query routing capabilities: {0}")]
    Signaling(#[from] SignalingError),

    /// The room returned no codecs.
    #[error("Routing capabilities are empty")]
    EmptyCapabilities,

    /// The local device rejected the capabilities.
    #[error("Routing capabilities unsupported: {0}")]
    Unsupported(#[from] EngineError),
}

/// Failure of one transport. Fatal for that transport only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    /// Transport parameters could not be obtained.
    #[error("{direction} transport signaling failed: {source}")]
    Signaling {
        direction: Direction,
        source: SignalingError,
    },

    /// The engine could not instantiate the transport.
    #[error("{direction} transport creation failed: {source}")]
    Engine {
        direction: Direction,
        source: EngineError,
    },

    /// The connection state machine reached `failed`.
    #[error("{direction} transport connection failed")]
    ConnectionFailed { direction: Direction },
}

impl TransportFailure {
    /// Which transport failed.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            TransportFailure::Signaling { direction, .. }
            | TransportFailure::Engine { direction, .. }
            | TransportFailure::ConnectionFailed { direction } => *direction,
        }
    }
}

/// Failure to publish one local source. Contained per kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProduceError {
    /// The negotiated capabilities cannot carry this kind.
    #[error("Cannot produce {0}: unsupported by negotiated capabilities")]
    Unsupported(TrackSource),

    /// There is no usable send transport.
    #[error("No send transport available")]
    NoTransport,

    /// The capture source rejected the request.
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// The engine failed to create the producer.
    #[error("Producer creation failed: {0}")]
    Engine(#[from] EngineError),
}

/// Failure to consume from a peer or one of its tracks. Contained per track.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsumeError {
    /// The consumable track list could not be fetched.
    #[error("Consume request failed: {0}")]
    Signaling(#[from] SignalingError),

    /// One consumer could not be created on the receive transport.
    #[error("Consumer {consumer_id} ({kind}) creation failed: {source}")]
    Engine {
        consumer_id: ConsumerId,
        kind: MediaKind,
        source: EngineError,
    },
}

/// Errors surfaced to the session owner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capability negotiation failed.
    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Neither transport could be created.
    #[error("No transport available (send: {send}; receive: {receive})")]
    Transport {
        send: TransportFailure,
        receive: TransportFailure,
    },

    /// A setup request (join) was rejected.
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// The session actor is no longer running.
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Whether this error was raised during the setup sequence.
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            SessionError::Negotiation(_)
                | SessionError::Transport { .. }
                | SessionError::Signaling(_)
        )
    }
}

impl From<crate::config::ConfigError> for SessionError {
    fn from(err: crate::config::ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_direction() {
        let failure = TransportFailure::Signaling {
            direction: Direction::Receive,
            source: SignalingError::ChannelClosed,
        };
        assert_eq!(failure.direction(), Direction::Receive);
        assert_eq!(
            TransportFailure::ConnectionFailed {
                direction: Direction::Send
            }
            .direction(),
            Direction::Send
        );
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                SignalingError::Rejected {
                    method: "join".to_string(),
                    reason: "Room is full".to_string()
                }
            ),
            "Request join rejected: Room is full"
        );
        assert_eq!(
            format!(
                "{}",
                ProduceError::Capture(CaptureError::PermissionDenied(TrackSource::Audio))
            ),
            "Capture failed: Permission denied for audio capture"
        );
        assert_eq!(
            format!(
                "{}",
                TransportFailure::ConnectionFailed {
                    direction: Direction::Receive
                }
            ),
            "receive transport connection failed"
        );
    }

    #[test]
    fn test_setup_failure_classification() {
        assert!(SessionError::Negotiation(NegotiationError::EmptyCapabilities).is_setup_failure());
        assert!(SessionError::Signaling(SignalingError::ChannelClosed).is_setup_failure());
        assert!(!SessionError::Closed.is_setup_failure());
        assert!(!SessionError::Config("bad".to_string()).is_setup_failure());
    }

    #[test]
    fn test_signaling_error_labels() {
        assert_eq!(SignalingError::ChannelClosed.label(), "channel_closed");
        assert_eq!(
            SignalingError::Timeout {
                method: "consume".to_string()
            }
            .label(),
            "timeout"
        );
    }
}
