//! Connectivity notifications.
//!
//! The `EventBus` is constructed explicitly and handed to whoever needs to
//! publish (the reachability monitor, the repository) or listen (the front
//! end). It wraps a tokio broadcast channel, so slow listeners never block
//! publishers and dropped receivers clean themselves up.

use tokio::sync::broadcast;
use tracing::debug;

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEvent {
    /// The catalog host became unreachable.
    ConnectivityLost,
    /// The catalog host is reachable again after a loss.
    ConnectivityRestored,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget publish. Having no subscribers is not an error.
    pub fn emit(&self, event: CatalogEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!(?event, receivers, "Event emitted"),
            Err(_) => debug!(?event, "Event emitted with no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
