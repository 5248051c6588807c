//! Shared kernel - Common types used across the fork engine

pub mod error;
pub mod events;
pub mod result;
pub mod value_objects;

pub use error::ForkError;
pub use result::Result;
pub use value_objects::*;
