//! Common error types for Huddle components.

use thiserror::Error;

/// Errors raised while encoding or decoding signaling protocol messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A notification or request named a method this side does not handle
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The payload for a known method could not be decoded
    #[error("Invalid payload for {method}: {reason}")]
    InvalidPayload {
        /// Method whose payload was rejected
        method: String,
        /// Decoder message
        reason: String,
    },

    /// A value could not be serialized into a payload
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using `ProtocolError`
pub type Result<T> = std::result::Result<T, ProtocolError>;
