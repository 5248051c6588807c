//! Fork value objects

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Which audio directions of the call are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkDirection {
    /// Caller to recorder only
    Read,
    /// Outbound audio only
    Write,
    #[default]
    Both,
}

impl ForkDirection {
    /// Parse a direction argument; anything mentioning neither "read" nor
    /// "write" means both
    pub fn from_arg(arg: &str) -> Self {
        if arg.contains("read") {
            ForkDirection::Read
        } else if arg.contains("write") {
            ForkDirection::Write
        } else {
            ForkDirection::Both
        }
    }

    pub fn includes(&self, leg: LegKind) -> bool {
        matches!(
            (self, leg),
            (ForkDirection::Both, _)
                | (ForkDirection::Read, LegKind::Read)
                | (ForkDirection::Write, LegKind::Write)
        )
    }

    /// Legs to create, in offer order
    pub fn legs(&self) -> &'static [LegKind] {
        match self {
            ForkDirection::Read => &[LegKind::Read],
            ForkDirection::Write => &[LegKind::Write],
            ForkDirection::Both => &[LegKind::Read, LegKind::Write],
        }
    }
}

impl fmt::Display for ForkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForkDirection::Read => "read",
            ForkDirection::Write => "write",
            ForkDirection::Both => "both",
        };
        f.write_str(name)
    }
}

/// One of the two outbound streams of a fork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegKind {
    /// Audio read from the call (caller side)
    Read,
    /// Audio written to the call
    Write,
}

impl LegKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegKind::Read => "read",
            LegKind::Write => "write",
        }
    }

    /// Stream label used in SDP and recording metadata
    pub fn label(&self) -> &'static str {
        match self {
            LegKind::Read => "inbound",
            LegKind::Write => "outbound",
        }
    }
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fork session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkState {
    /// Attached, waiting for the pipeline to start
    Idle,
    /// Ports, recording call and transports being set up
    Allocating,
    /// Forwarding frames
    Active,
    /// Tearing down
    Closing,
    Closed,
    Failed,
}

impl ForkState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, next: ForkState) -> bool {
        use ForkState::*;

        matches!(
            (self, next),
            (Idle, Allocating)
                | (Idle, Closed)
                | (Allocating, Active)
                | (Allocating, Failed)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ForkState::Closed | ForkState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ForkState::Idle => "idle",
            ForkState::Allocating => "allocating",
            ForkState::Active => "active",
            ForkState::Closing => "closing",
            ForkState::Closed => "closed",
            ForkState::Failed => "failed",
        }
    }
}

impl fmt::Display for ForkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recording server address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderDestination {
    pub host: String,
    pub port: u16,
}

impl RecorderDestination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RecorderDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Per-fork start parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkParams {
    pub direction: ForkDirection,
    /// Overrides the configured recording server host for this fork only
    pub srs_host: Option<String>,
    /// Overrides the configured recording server port for this fork only
    pub srs_port: Option<u16>,
}

impl ForkParams {
    pub fn new(direction: ForkDirection) -> Self {
        Self {
            direction,
            ..Default::default()
        }
    }

    /// Parse JSON start arguments
    ///
    /// Recognized keys are `siprec_srs_host` (string), `siprec_srs_port`
    /// (number) and `direction` (string). Keys of the wrong type are
    /// ignored; unparseable input logs a warning and yields the defaults.
    pub fn from_json(args: &str) -> Self {
        let mut params = Self::default();

        if args.trim().is_empty() {
            return params;
        }

        let value: Value = match serde_json::from_str(args) {
            Ok(value) => value,
            Err(e) => {
                warn!("Invalid fork arguments {:?}: {}", args, e);
                return params;
            }
        };

        if let Some(host) = value.get("siprec_srs_host").and_then(Value::as_str) {
            params.srs_host = Some(host.to_string());
        }

        if let Some(port) = value.get("siprec_srs_port").and_then(Value::as_u64) {
            match u16::try_from(port) {
                Ok(port) if port != 0 => params.srs_port = Some(port),
                _ => warn!("Ignoring out of range siprec_srs_port {}", port),
            }
        }

        if let Some(direction) = value.get("direction").and_then(Value::as_str) {
            params.direction = ForkDirection::from_arg(direction);
        }

        params
    }

    /// Resolve the destination against the configured default
    pub fn destination(&self, default: &RecorderDestination) -> RecorderDestination {
        RecorderDestination {
            host: self
                .srs_host
                .clone()
                .filter(|host| !host.is_empty())
                .unwrap_or_else(|| default.host.clone()),
            port: self.srs_port.unwrap_or(default.port),
        }
    }
}

/// Media parameters of the call, known once the pipeline starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaParams {
    /// Sample rate of frames read from the call
    pub read_rate: u32,
    /// Sample rate of frames written to the call
    pub write_rate: u32,
}

impl MediaParams {
    pub fn new(read_rate: u32, write_rate: u32) -> Self {
        Self {
            read_rate,
            write_rate,
        }
    }

    pub fn rate_for(&self, leg: LegKind) -> u32 {
        match leg {
            LegKind::Read => self.read_rate,
            LegKind::Write => self.write_rate,
        }
    }
}
