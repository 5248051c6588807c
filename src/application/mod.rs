//! Application layer - Use cases and application services
//!
//! This layer orchestrates the fork domain for the media host:
//! - Attaching and detaching forks on calls
//! - Wiring fork sessions to transports, signaling and event publishing

pub mod fork_service;

pub use fork_service::{ForkService, MediaHost};
