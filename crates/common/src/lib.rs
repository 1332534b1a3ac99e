//! Common utilities and types shared across Huddle components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for the JSON signaling protocol spoken between sessions and rooms
pub mod protocol;

/// Module for tracing subscriber setup
pub mod observability;

/// Module for actor mailbox depth monitoring
pub mod mailbox;
