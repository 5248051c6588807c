//! Shared value objects used across the fork engine

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle of the original call a fork is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallHandle(Uuid);

impl CallHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fork session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForkId(Uuid);

impl ForkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ForkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Call termination cause as used by the call-control layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HangupCause {
    None,
    Success,
    UnallocatedNumber,
    NormalClearing,
    UserBusy,
    NoUserResponse,
    NoAnswer,
    CallRejected,
    DestinationOutOfOrder,
    InvalidNumberFormat,
    NormalUnspecified,
    NetworkOutOfOrder,
    NormalTemporaryFailure,
    ServiceUnavailable,
    IncompatibleDestination,
    Interworking,
    OriginatorCancel,
    RecoveryOnTimerExpire,
}

impl HangupCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            HangupCause::None => "NONE",
            HangupCause::Success => "SUCCESS",
            HangupCause::UnallocatedNumber => "UNALLOCATED_NUMBER",
            HangupCause::NormalClearing => "NORMAL_CLEARING",
            HangupCause::UserBusy => "USER_BUSY",
            HangupCause::NoUserResponse => "NO_USER_RESPONSE",
            HangupCause::NoAnswer => "NO_ANSWER",
            HangupCause::CallRejected => "CALL_REJECTED",
            HangupCause::DestinationOutOfOrder => "DESTINATION_OUT_OF_ORDER",
            HangupCause::InvalidNumberFormat => "INVALID_NUMBER_FORMAT",
            HangupCause::NormalUnspecified => "NORMAL_UNSPECIFIED",
            HangupCause::NetworkOutOfOrder => "NETWORK_OUT_OF_ORDER",
            HangupCause::NormalTemporaryFailure => "NORMAL_TEMPORARY_FAILURE",
            HangupCause::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            HangupCause::IncompatibleDestination => "INCOMPATIBLE_DESTINATION",
            HangupCause::Interworking => "INTERWORKING",
            HangupCause::OriginatorCancel => "ORIGINATOR_CANCEL",
            HangupCause::RecoveryOnTimerExpire => "RECOVERY_ON_TIMER_EXPIRE",
        }
    }

    /// Q.850 cause value, carried in the `Reason` header of a BYE
    pub fn q850(&self) -> u16 {
        match self {
            HangupCause::None | HangupCause::Success => 0,
            HangupCause::UnallocatedNumber => 1,
            HangupCause::NormalClearing => 16,
            HangupCause::UserBusy => 17,
            HangupCause::NoUserResponse => 18,
            HangupCause::NoAnswer => 19,
            HangupCause::CallRejected => 21,
            HangupCause::DestinationOutOfOrder => 27,
            HangupCause::InvalidNumberFormat => 28,
            HangupCause::NormalUnspecified => 31,
            HangupCause::NetworkOutOfOrder => 38,
            HangupCause::NormalTemporaryFailure => 41,
            HangupCause::ServiceUnavailable => 63,
            HangupCause::IncompatibleDestination => 88,
            HangupCause::Interworking => 127,
            HangupCause::OriginatorCancel => 487,
            HangupCause::RecoveryOnTimerExpire => 102,
        }
    }

    /// Map a final SIP status code of a failed INVITE to a hangup cause
    pub fn from_sip_status(status: u16) -> Self {
        match status {
            200..=299 => HangupCause::Success,
            401 | 402 | 403 | 407 | 603 => HangupCause::CallRejected,
            404 | 485 | 604 => HangupCause::UnallocatedNumber,
            408 | 504 => HangupCause::RecoveryOnTimerExpire,
            410 => HangupCause::NormalUnspecified,
            413 | 414 | 416 | 420 | 421 | 423 | 505 | 513 => HangupCause::Interworking,
            480 => HangupCause::NoUserResponse,
            484 => HangupCause::InvalidNumberFormat,
            486 | 600 => HangupCause::UserBusy,
            487 => HangupCause::OriginatorCancel,
            488 | 606 => HangupCause::IncompatibleDestination,
            500 | 503 => HangupCause::NormalTemporaryFailure,
            501 => HangupCause::ServiceUnavailable,
            502 => HangupCause::NetworkOutOfOrder,
            _ => HangupCause::Interworking,
        }
    }
}

impl fmt::Display for HangupCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
