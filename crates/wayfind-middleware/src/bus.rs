//! Topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so every subscriber
//! receives every message without any single subscriber blocking the others.
//! Publishing never blocks, which keeps the tick loop free of I/O waits.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Navigation`] | Trip start/end, arrival, path warnings |
//! | [`Topic::Metrics`] | Frozen trip metrics and per-trip counters |
//! | [`Topic::Diagnostics`] | Errors surfaced to the operator |
//! | [`Topic::Session`] | Registration and persistence outcomes |

use tokio::sync::broadcast;
use tracing::{trace, warn};
use wayfind_types::{Event, WayfindError};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Navigation,
    Metrics,
    Diagnostics,
    Session,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
///
/// * **Topic-based** (`publish_to` / `subscribe_to`) – routes events to one
///   of the four [`Topic`] lanes.
/// * **Global** (`publish` / `subscribe`) – every event published through
///   `publish_to` is mirrored here, for consumers that want the whole stream
///   (journal exporters, the REPL log pane).
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    navigation: broadcast::Sender<Event>,
    metrics: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
    session: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (navigation, _) = broadcast::channel(capacity);
        let (metrics, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        let (session, _) = broadcast::channel(capacity);
        Self {
            sender,
            navigation,
            metrics,
            diagnostics,
            session,
        }
    }

    // -----------------------------------------------------------------------
    // Topic-based API
    // -----------------------------------------------------------------------

    /// Publish `event` to the given [`Topic`] and mirror it on the global
    /// channel.
    ///
    /// Returns the number of topic receivers that were handed the event.
    /// Having no subscribers is a normal condition and yields `Ok(0)`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, WayfindError> {
        let _ = self.sender.send(event.clone());
        match self.topic_sender(topic).send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "no subscribers for topic");
                Ok(0)
            }
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    // -----------------------------------------------------------------------
    // Global API
    // -----------------------------------------------------------------------

    /// Publish an event on the global channel only.
    ///
    /// Unlike [`publish_to`][Self::publish_to], this reports a
    /// [`WayfindError::Channel`] when nobody is listening.
    pub fn publish(&self, event: Event) -> Result<usize, WayfindError> {
        self.sender
            .send(event)
            .map_err(|e| WayfindError::Channel(format!("event bus send error: {e}")))
    }

    /// Subscribe to every event, regardless of topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Navigation => &self.navigation,
            Topic::Metrics => &self.metrics,
            Topic::Diagnostics => &self.diagnostics,
            Topic::Session => &self.session,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Err(Lagged(n))` means `n` events were dropped because this receiver
    /// fell behind; `Err(Closed)` means the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Drain whatever is buffered without waiting.  Lag is logged and
    /// skipped.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "topic receiver lagged");
                }
                Err(_) => return out,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfind_types::EventPayload;

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::DestinationReached {
                destination: "Recepcion".into(),
            },
        )
    }

    #[tokio::test]
    async fn publish_and_receive_on_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Navigation);

        let event = make_event("route_tracker");
        assert_eq!(bus.publish_to(Topic::Navigation, event.clone())?, 1);

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(rx.topic(), Topic::Navigation);
        Ok(())
    }

    #[tokio::test]
    async fn topic_events_are_mirrored_globally() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut all = bus.subscribe();

        let event = make_event("metrics_recorder");
        bus.publish_to(Topic::Metrics, event.clone())?;

        assert_eq!(all.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_to_without_subscribers_is_ok() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Session, make_event("test")).unwrap(), 0);
    }

    #[test]
    fn global_publish_without_subscribers_is_error() {
        let bus = EventBus::default();
        assert!(matches!(
            bus.publish(make_event("test")),
            Err(WayfindError::Channel(_))
        ));
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut diagnostics = bus.subscribe_to(Topic::Diagnostics);

        let _ = bus.publish_to(Topic::Navigation, make_event("route_tracker"));

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            diagnostics.recv(),
        )
        .await;
        assert!(result.is_err(), "Diagnostics must not see Navigation traffic");
    }

    #[test]
    fn drain_collects_buffered_events_and_survives_lag() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe_to(Topic::Metrics);
        for _ in 0..10 {
            let _ = bus.publish_to(Topic::Metrics, make_event("flood"));
        }
        let drained = rx.drain();
        assert_eq!(drained.len(), 4);
        assert!(rx.drain().is_empty());
    }
}
