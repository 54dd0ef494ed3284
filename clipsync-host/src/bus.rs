use clipsync_core::{Delivery, PushEvent, RawEvent, Subscription, Topic};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, error};

pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// In-process publish side of every push topic.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RawEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: &PushEvent) {
        match event.encode() {
            Ok(raw) => self.publish_raw(raw),
            Err(err) => error!(topic = %event.topic(), "failed to encode push event: {}", err),
        }
    }

    pub fn publish_raw(&self, event: RawEvent) {
        let topic = event.topic;
        // No receivers is not an error: nobody has subscribed yet.
        if self.tx.send(event).is_err() {
            debug!(topic = %topic, "published with no subscribers");
        }
    }

    /// Raw receiver over every topic, used by the WebSocket fan-out.
    pub fn receiver(&self) -> broadcast::Receiver<RawEvent> {
        self.tx.subscribe()
    }

    /// Subscription yielding only `topic`, starting from now.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let stream = BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| async move {
                match item {
                    Ok(event) if event.topic == topic => Some(Delivery::Event(event)),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        Some(Delivery::Missed(skipped))
                    }
                }
            })
            .boxed();
        Subscription::new(topic, stream)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
