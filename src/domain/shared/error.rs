//! Fork errors

use super::value_objects::HangupCause;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while setting up, running or tearing down a media fork.
///
/// None of these ever reach the original call: they are returned from
/// `start_fork` or logged by the fork session itself.
#[derive(Error, Debug, Clone)]
pub enum ForkError {
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Fork already attached to call {0}")]
    AlreadyAttached(String),

    #[error("No RTP ports available for {0}")]
    NoPortsAvailable(IpAddr),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Recording call failed with cause {0}")]
    Signaling(HangupCause),

    #[error("Recording call not answered within {0:?}")]
    SignalingTimeout(Duration),

    #[error("Recorder accepted no media streams: {0}")]
    NoMediaAccepted(String),

    #[error("Resampler error: {0}")]
    Resampler(String),

    #[error("Fork aborted during activation")]
    Aborted,

    #[error("Media host error: {0}")]
    Host(String),
}

impl ForkError {
    /// Short machine-readable name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            ForkError::InvalidStateTransition(_) => "invalid_state",
            ForkError::AlreadyAttached(_) => "already_attached",
            ForkError::NoPortsAvailable(_) => "no_ports",
            ForkError::Transport(_) => "transport",
            ForkError::Signaling(_) => "signaling",
            ForkError::SignalingTimeout(_) => "signaling_timeout",
            ForkError::NoMediaAccepted(_) => "no_media",
            ForkError::Resampler(_) => "resampler",
            ForkError::Aborted => "aborted",
            ForkError::Host(_) => "host",
        }
    }
}
