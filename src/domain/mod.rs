//! Domain layer - Fork lifecycle and its rules
//!
//! This layer contains:
//! - Aggregates: the fork session and its state machine
//! - Entities: the recorded call's context
//! - Value Objects: directions, states, destinations, media parameters
//! - Domain Events: fork started / stopped

pub mod fork;
pub mod shared;

// Re-export commonly used types
pub use shared::{ForkError, Result};
