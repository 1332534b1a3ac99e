//! Room Service Library
//!
//! Server side of a Huddle call. Answers the signaling requests of media
//! sessions and fans presence out to every member of a room:
//!
//! - Rooms are created on first connection and removed when empty
//! - Peers are connected before they join; `join` publishes them
//! - Transport, produce and consume requests are delegated to a
//!   `MediaRouter` (one per room)
//!
//! # Architecture
//!
//! ```text
//! RoomControllerActor (singleton)
//! └── supervises N RoomActors
//!     └── RoomActor (one per room, owns peers and the room's router)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Controller and room actors
//! - [`router`] - Media routing engine seam
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client-safe messages

pub mod actors;
pub mod config;
pub mod errors;
pub mod router;

pub use actors::{RoomActorHandle, RoomControllerHandle};
pub use config::Config;
pub use errors::{RoomError, RouterError};
