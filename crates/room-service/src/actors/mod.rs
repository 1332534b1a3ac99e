//! Actors of the room service.
//!
//! ```text
//! RoomControllerActor (singleton)
//! └── supervises N RoomActors
//!     └── RoomActor (one per room)
//! ```
//!
//! - **Rooms on demand**: the first connection to a room id creates it
//! - **Removed when empty**: a room actor exits once its last peer disconnects
//! - **CancellationToken propagation**: rooms run on child tokens of the controller
//!
//! # Modules
//!
//! - [`controller`] - `RoomControllerActor`
//! - [`room`] - `RoomActor` per room
//! - [`messages`] - Message and state types

pub mod controller;
pub mod messages;
pub mod room;

pub use controller::{RoomControllerActor, RoomControllerHandle};
pub use messages::*;
pub use room::{RoomActor, RoomActorHandle};
