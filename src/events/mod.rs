//! Operator status bus
//!
//! Anything that wants to tell the operator something (controller mode
//! changes, calibration warnings, capture errors from camera threads) publishes
//! here. The session layer subscribes and forwards each event to the retained
//! `control` data channel. Publishing never blocks and works from any thread,
//! which is how camera threads marshal messages into the event loop.

pub mod types;

pub use types::{StatusEvent, StatusLevel};

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for operator status events
#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// With no subscriber (no operator connected) the event is dropped.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(StatusEvent::info(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.publish(StatusEvent::warn(message));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();

        bus.info("Teleop Mode: None");

        let event = rx.recv().await.unwrap();
        assert_eq!(event, StatusEvent::info("Teleop Mode: None"));
    }

    #[tokio::test]
    async fn test_publish_from_foreign_thread() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();

        let remote = bus.clone();
        std::thread::spawn(move || remote.warn("capture head: device lost"))
            .join()
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.level, StatusLevel::Warn);
    }

    #[test]
    fn test_no_subscribers() {
        let bus = StatusBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.info("nobody listening");
    }
}
