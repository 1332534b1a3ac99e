//! Media Session Library
//!
//! Client-side orchestrator of a multi-party audio/video call over an
//! SFU-style media router:
//!
//! - Capability negotiation with the router
//! - One send and one receive transport per session
//! - Publishing microphone, camera and screen tracks
//! - One consumer manager per remote peer with playback recovery
//! - Peer presence and media-state propagation
//! - Keep-alive while the host page is backgrounded
//!
//! # Architecture
//!
//! ```text
//! SessionActor (one per room membership)
//! ├── owns PeerRegistry, ProducerManager, send/receive transports
//! ├── supervises N ConsumerActors
//! │   └── ConsumerActor (one per exposed remote peer, health loop)
//! └── supervises LivenessKeeper (keep-alive audio + hidden-page pings)
//! ```
//!
//! The media engine, the signaling channel and the host's capture and
//! playback surfaces are collaborators behind the traits in [`engine`],
//! [`signaling`] and [`media`].
//!
//! # Modules
//!
//! - [`actors`] - Session and per-peer consumer actors
//! - [`capability`] - Capability negotiation
//! - [`transport`] - Transport creation and connection state machine
//! - [`producer`] - Local producers and screen sharing
//! - [`registry`] - Peer registry and presence
//! - [`broadcaster`] - Local media-state announcements
//! - [`liveness`] - Keep-alive pings and audio
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error taxonomy

pub mod actors;
pub mod broadcaster;
pub mod capability;
pub mod config;
pub mod engine;
pub mod errors;
pub mod liveness;
pub mod media;
pub mod observability;
pub mod producer;
pub mod registry;
pub mod signaling;
pub mod transport;

pub use actors::{MediaSession, SessionDeps, SessionHandle};
pub use config::Config;
pub use errors::SessionError;
