//! Event sink backed by a tokio broadcast channel.

use tokio::sync::broadcast;
use tracing::trace;

use flowpilot_protocols::events::{EventSink, ExecutionEvent};

/// Fans lifecycle events out to any number of subscribers.
///
/// Publishing never blocks; events sent while nobody listens are dropped and
/// slow subscribers observe `Lagged` rather than holding up the engine.
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: ExecutionEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}
