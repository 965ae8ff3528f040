use tokio::sync::broadcast;
use tracing::trace;

use speckle_api::{CommitCreatedEvent, StreamUpdatedEvent};

/// Something subscribers of a stream may want to hear about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    StreamUpdated(StreamUpdatedEvent),
    CommitCreated(CommitCreatedEvent),
}

impl ServerEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            Self::StreamUpdated(event) => &event.stream_id,
            Self::CommitCreated(event) => &event.stream_id,
        }
    }
}

/// Fan-out of [`ServerEvent`]s to live subscriptions.
///
/// Slow subscribers lose the oldest events rather than blocking publishers.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // No receivers is fine.
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(delivered, "published event");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
