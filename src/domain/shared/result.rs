//! Fork result type

use super::error::ForkError;

/// Standard result type for fork operations
pub type Result<T> = std::result::Result<T, ForkError>;
