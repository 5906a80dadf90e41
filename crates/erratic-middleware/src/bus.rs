//! Named-topic publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Topics are plain strings (`"odom"`, `"battery_state"`,
//! `"cmd_vel"`, `"tf"`, …); the channel behind a topic is created the first
//! time anyone publishes or subscribes to it.

use std::collections::HashMap;
use std::sync::Arc;

use erratic_types::{BridgeError, Event};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Event bus
// ────────────────────────────────────────────────────────────────────────────

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus. Clone it cheaply – all clones share the same topic
/// table.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus.  `capacity` is applied to every topic channel
    /// independently.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// `Ok(0)` means nobody is listening, which is a normal condition.
    pub fn publish_to(&self, topic: &str, event: Event) -> Result<usize, BridgeError> {
        let sender = self.sender(topic);
        match sender.send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => {
                debug!(topic, "published with no subscribers");
                Ok(0)
            }
        }
    }

    /// Subscribe to `topic`.  The receiver only sees events published after
    /// this call returns.
    pub fn subscribe_to(&self, topic: &str) -> TopicReceiver {
        TopicReceiver {
            topic: topic.to_string(),
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Event> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        self.topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Topic receiver
// ────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// A receiver that fell behind logs how many events it missed and keeps
    /// going.  Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use erratic_types::{EventPayload, Twist, Vector3};

    fn make_event(source: &str, vx: f64) -> Event {
        Event::new(
            source,
            EventPayload::Twist(Twist {
                linear: Vector3::new(vx, 0.0, 0.0),
                angular: Vector3::default(),
            }),
        )
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to("odom");
        let mut rx2 = bus.subscribe_to("odom");

        let event = make_event("test::odom", 1.0);
        assert_eq!(bus.publish_to("odom", event.clone())?, 2);

        assert_eq!(rx1.recv().await.ok_or("rx1 closed")?.id, event.id);
        assert_eq!(rx2.recv().await.ok_or("rx2 closed")?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to("battery_state", make_event("test", 0.0)).unwrap(), 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = EventBus::default();
        let mut battery = bus.subscribe_to("battery_state");
        let _odom = bus.subscribe_to("odom");

        bus.publish_to("odom", make_event("test::odom", 1.0)).unwrap();

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), battery.recv()).await;
        assert!(result.is_err(), "battery subscriber must not see odom traffic");
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_ahead() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to("odom");
        for i in 0..20 {
            bus.publish_to("odom", make_event("flood", f64::from(i))).unwrap();
        }
        let Some(event) = slow.recv().await else {
            panic!("bus closed");
        };
        let EventPayload::Twist(twist) = event.payload else {
            panic!("unexpected payload");
        };
        // Only the newest `capacity` events survive.
        assert!((twist.linear.x - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count("cmd_vel"), 0);
        let rx = bus.subscribe_to("cmd_vel");
        assert_eq!(rx.topic(), "cmd_vel");
        assert_eq!(bus.subscriber_count("cmd_vel"), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count("cmd_vel"), 0);
    }
}
