//! Event delivery to call control

use crate::domain::fork::{EventPublisher, ForkEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// Fork event broadcaster
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<ForkEvent>,
}

impl BroadcastEventPublisher {
    /// Create new event broadcaster with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ForkEvent> {
        self.tx.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: ForkEvent) {
        let event_type = event.event_type();
        let call = event.call();
        // No subscribers is not an error; events are fire-and-forget
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {} of call {}", event_type, call);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fork::ForkStarted;
    use crate::domain::shared::{CallHandle, ForkId};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = BroadcastEventPublisher::default();
        let mut rx = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        let call = CallHandle::new();
        publisher.publish(ForkEvent::Started(ForkStarted::new(call, ForkId::new())));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "fork-start");
        assert_eq!(event.call(), call);
    }

    #[test]
    fn test_every_subscriber_gets_a_copy() {
        let publisher = BroadcastEventPublisher::new(8);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(ForkEvent::Started(ForkStarted::new(
            CallHandle::new(),
            ForkId::new(),
        )));

        let (a, b) = tokio_test::block_on(async { (first.recv().await, second.recv().await) });
        assert_eq!(a.unwrap().fork_id(), b.unwrap().fork_id());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = BroadcastEventPublisher::new(4);
        publisher.publish(ForkEvent::Started(ForkStarted::new(
            CallHandle::new(),
            ForkId::new(),
        )));
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
