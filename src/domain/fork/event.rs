//! Fork domain events

use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::{CallHandle, ForkId, HangupCause};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base struct for all fork events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkEventBase {
    pub metadata: EventMetadata,
    pub call: CallHandle,
    pub fork_id: ForkId,
}

impl ForkEventBase {
    fn new(event_type: &str, call: CallHandle, fork_id: ForkId) -> Self {
        Self {
            metadata: EventMetadata::now(event_type),
            call,
            fork_id,
        }
    }
}

/// Recording started: both ends connected and media flowing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkStarted {
    pub base: ForkEventBase,
}

impl ForkStarted {
    pub const EVENT_TYPE: &'static str = "fork-start";

    pub fn new(call: CallHandle, fork_id: ForkId) -> Self {
        Self {
            base: ForkEventBase::new(Self::EVENT_TYPE, call, fork_id),
        }
    }

    /// Milliseconds since the epoch
    pub fn start_time(&self) -> i64 {
        self.base.metadata.epoch_ms()
    }
}

impl DomainEvent for ForkStarted {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.metadata.occurred_at
    }
}

/// Recording stopped after having been active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkStopped {
    pub base: ForkEventBase,
    pub hangup_cause: HangupCause,
}

impl ForkStopped {
    pub const EVENT_TYPE: &'static str = "fork-stop";

    pub fn new(call: CallHandle, fork_id: ForkId, hangup_cause: HangupCause) -> Self {
        Self {
            base: ForkEventBase::new(Self::EVENT_TYPE, call, fork_id),
            hangup_cause,
        }
    }

    /// Milliseconds since the epoch
    pub fn stop_time(&self) -> i64 {
        self.base.metadata.epoch_ms()
    }
}

impl DomainEvent for ForkStopped {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.metadata.occurred_at
    }
}

/// Fork events published to call control
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ForkEvent {
    #[serde(rename = "fork-start")]
    Started(ForkStarted),
    #[serde(rename = "fork-stop")]
    Stopped(ForkStopped),
}

impl ForkEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ForkEvent::Started(e) => e.event_type(),
            ForkEvent::Stopped(e) => e.event_type(),
        }
    }

    pub fn call(&self) -> CallHandle {
        match self {
            ForkEvent::Started(e) => e.base.call,
            ForkEvent::Stopped(e) => e.base.call,
        }
    }

    pub fn fork_id(&self) -> ForkId {
        match self {
            ForkEvent::Started(e) => e.base.fork_id,
            ForkEvent::Stopped(e) => e.base.fork_id,
        }
    }

    /// Header view as exposed on the call-control event bus
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            ForkEvent::Started(e) => vec![("siprec_start_time", e.start_time().to_string())],
            ForkEvent::Stopped(e) => vec![
                ("siprec_stop_time", e.stop_time().to_string()),
                ("hangup_cause", e.hangup_cause.to_string()),
            ],
        }
    }
}

/// Sink for fork events; publishing never blocks and never fails the fork
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ForkEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_event_headers() {
        let event = ForkEvent::Started(ForkStarted::new(CallHandle::new(), ForkId::new()));
        assert_eq!(event.event_type(), "fork-start");

        let headers = event.headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "siprec_start_time");
        assert!(headers[0].1.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_stop_event_headers() {
        let event = ForkEvent::Stopped(ForkStopped::new(
            CallHandle::new(),
            ForkId::new(),
            HangupCause::NormalClearing,
        ));
        assert_eq!(event.event_type(), "fork-stop");

        let headers = event.headers();
        assert_eq!(headers[0].0, "siprec_stop_time");
        assert_eq!(headers[1], ("hangup_cause", "NORMAL_CLEARING".to_string()));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ForkEvent::Started(ForkStarted::new(CallHandle::new(), ForkId::new()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fork-start");
    }
}
