//! Room service error types.
//!
//! Errors are returned to the requesting peer as a rejection. Internal
//! details are logged server-side; `client_message` is what the peer sees.

use common::error::ProtocolError;
use common::types::{ConsumerId, Direction, PeerId, ProducerId, TransportId};
use thiserror::Error;

/// Media routing engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("Transport not found: {0}")]
    TransportNotFound(TransportId),

    #[error("Producer not found: {0}")]
    ProducerNotFound(ProducerId),

    #[error("Consumer not found: {0}")]
    ConsumerNotFound(ConsumerId),

    /// The requester's capabilities cannot receive this producer.
    #[error("Cannot consume producer {0}")]
    CannotConsume(ProducerId),

    #[error("Router failure: {0}")]
    Failed(String),
}

/// Room service error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    /// The request names a method the room does not serve.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The request payload could not be decoded.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] ProtocolError),

    /// The peer is not connected to this room.
    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),

    /// The peer has no transport in that direction.
    #[error("No {direction} transport for peer {peer_id}")]
    TransportNotFound {
        peer_id: PeerId,
        direction: Direction,
    },

    /// The room already holds the maximum number of joined peers.
    #[error("Room is full ({max_peers} peers)")]
    RoomFull { max_peers: usize },

    /// The media router rejected the operation.
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// The room actor is no longer running.
    #[error("Room closed")]
    Closed,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RoomError::UnknownMethod(method) => format!("Unknown method: {method}"),
            RoomError::InvalidPayload(_) => "Invalid request payload".to_string(),
            RoomError::PeerNotFound(_) => "Peer not found".to_string(),
            RoomError::TransportNotFound { direction, .. } => {
                format!("No {direction} transport")
            }
            RoomError::RoomFull { .. } => "Room is at capacity".to_string(),
            RoomError::Router(RouterError::CannotConsume(_)) => {
                "Cannot consume this producer".to_string()
            }
            RoomError::Router(_) | RoomError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            RoomError::Closed => "Room closed".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = RoomError::Router(RouterError::Failed("worker died at 0xdead".to_string()));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = RoomError::Internal("lock poisoned".to_string());
        assert!(!err.client_message().contains("poisoned"));
    }

    #[test]
    fn test_client_message_names_safe_details() {
        let err = RoomError::TransportNotFound {
            peer_id: PeerId::from("p1"),
            direction: Direction::Receive,
        };
        assert_eq!(err.client_message(), "No receive transport");
        assert_eq!(
            RoomError::RoomFull { max_peers: 2 }.client_message(),
            "Room is at capacity"
        );
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: RoomError = ProtocolError::InvalidPayload {
            method: "consume".to_string(),
            reason: "missing field `peerId`".to_string(),
        }
        .into();
        assert!(matches!(err, RoomError::InvalidPayload(_)));
    }
}
