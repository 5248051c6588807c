//! Event envelope shared by everything published to call control

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub trait DomainEvent: Send + Sync {
    /// Name on the call-control event bus, e.g. `fork-start`
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch
    fn epoch_ms(&self) -> i64 {
        self.occurred_at().timestamp_millis()
    }
}

/// Identity and timestamp stamped on an event when it is raised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
}

impl EventMetadata {
    /// Stamp an event of `event_type` with the current time
    pub fn now(event_type: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event_type: event_type.to_string(),
        }
    }

    pub fn epoch_ms(&self) -> i64 {
        self.occurred_at.timestamp_millis()
    }
}
