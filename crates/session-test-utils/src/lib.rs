//! # Session Test Utilities
//!
//! Mocks and fixtures for testing the media session and the room service
//! without a real media engine, browser surfaces or network.
//!
//! ## Modules
//!
//! - `mock_channel` - Scripted signaling channel and a remote for pushing room notifications
//! - `mock_engine` - Client media engine: device, transports, producers, consumers
//! - `mock_media` - Capture source, tracks, playback sinks, keep-alive audio
//! - `mock_router` - Server media router and worker for the room service
//! - `loopback` - Signaling channel wired to a real room service
//! - `fixtures` - Session harness and test data
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let channel = MockChannel::builder()
//!         .consume_tracks("peer-b", &[MediaKind::Audio, MediaKind::Video])
//!         .build();
//!
//!     let session = SessionHarness::new().with_channel(channel).start().await.unwrap();
//!     session.remote.notify(peer_joined("peer-b", "Bob")).await;
//!
//!     // Assert on session.handle.state(), session.sinks, session.channel...
//! }
//! ```

pub mod fixtures;
pub mod loopback;
pub mod mock_channel;
pub mod mock_engine;
pub mod mock_media;
pub mod mock_router;

// Re-export commonly used items
pub use fixtures::*;
pub use loopback::*;
pub use mock_channel::*;
pub use mock_engine::*;
pub use mock_media::*;
pub use mock_router::*;
