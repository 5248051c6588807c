//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Media: codecs, RTP, port pool and UDP transports
//! - Protocol implementations (SIP signaling toward the recorder)
//! - Event publishing
//! - Metrics

pub mod media;
pub mod messaging;
pub mod metrics;
pub mod protocols;
