//! Observability for the media session.
//!
//! Tracing targets:
//! - `session.actor` - session lifecycle, presence, setup sequence
//! - `session.transport` - transport creation and state changes
//! - `session.producer` - publishing, toggles, screen share
//! - `session.consumer` - per-peer consumption and playback recovery
//! - `session.liveness` - keep-alive pings and audio
//! - `session.signaling` - outbound notifications

pub mod metrics;
