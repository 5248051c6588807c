//! siprec-fork - SIPREC media forking for a call-control host
//!
//! Copies the audio of live calls to a SIPREC recording server: one
//! send-only PCMU RTP leg per recorded direction, plus an outbound SIP call
//! that carries the SDP offer and the `rs-metadata` describing the
//! recorded session.
//!
//! Laid out in Domain-Driven Design layers: `domain` holds the fork
//! lifecycle, `infrastructure` the media, SIP and event plumbing, and
//! `application` the service hosts talk to.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{ForkService, MediaHost};
pub use domain::shared::error::ForkError;
pub use domain::shared::result::Result;
