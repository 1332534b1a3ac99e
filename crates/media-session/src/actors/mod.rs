//! Actors of the media session.
//!
//! ```text
//! SessionActor (one per room membership)
//! ├── supervises N ConsumerActors
//! │   └── ConsumerActor (one per exposed remote peer)
//! └── supervises the LivenessKeeper task
//! ```
//!
//! - **Single writer**: all session state is owned by the `SessionActor`;
//!   track watchers and the signaling channel report into its mailbox,
//!   transports into a dedicated state channel
//! - **No waiting on peers**: the session reads consumer playback from a
//!   `watch` and never round-trips to a `ConsumerActor`
//! - **CancellationToken propagation**: children get child tokens so teardown
//!   reaches every timer exactly once
//! - **Mailbox monitoring**: queue depth gauge and thresholds (`common::mailbox`)
//!
//! # Modules
//!
//! - [`session`] - `MediaSession` setup and the `SessionActor`
//! - [`consumer`] - `ConsumerActor` per remote peer
//! - [`messages`] - Message, event and state types

pub mod consumer;
pub mod messages;
pub mod session;

pub use consumer::{ConsumerActor, ConsumerActorHandle, ConsumerDeps};
pub use messages::*;
pub use session::{MediaSession, SessionActor, SessionDeps, SessionHandle};
