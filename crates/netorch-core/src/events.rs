// ── Event log ──
//
// Persists every `NetworkEvent` to the store and fans it out to in-process
// subscribers. A failed store write is logged and swallowed: the device
// already changed, so the caller's result must not.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::model::NetworkEvent;
use crate::store::NetworkStore;

const EVENT_CHANNEL_SIZE: usize = 256;

pub struct EventLog {
    store: Arc<dyn NetworkStore>,
    tx: broadcast::Sender<Arc<NetworkEvent>>,
}

impl EventLog {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self { store, tx }
    }

    /// Persist, then broadcast. Returns whether the store accepted it.
    pub async fn record(&self, event: NetworkEvent) -> bool {
        let persisted = match self.store.append_event(&event).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    event = event.kind.name(),
                    client = ?event.client_id,
                    device = ?event.device_id,
                    error = %e,
                    "failed to persist network event"
                );
                false
            }
        };
        debug!(event = event.kind.name(), success = event.success, "network event");
        // No receivers is not an error.
        let _ = self.tx.send(Arc::new(event));
        persisted
    }

    pub async fn record_all(&self, events: impl IntoIterator<Item = NetworkEvent>) {
        for event in events {
            self.record(event).await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<NetworkEvent>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Actor, EventKind, Reachability};
    use crate::store::MemoryStore;

    fn status_event() -> NetworkEvent {
        NetworkEvent::new(
            EventKind::DeviceStatusChanged {
                previous: Reachability::Unknown,
                current: Reachability::Online,
            },
            Actor::HealthMonitor,
            true,
        )
    }

    #[tokio::test]
    async fn records_and_broadcasts() {
        let store = Arc::new(MemoryStore::new());
        let log = EventLog::new(store.clone());
        let mut rx = log.subscribe();

        assert!(log.record(status_event()).await);
        assert_eq!(store.events().await.len(), 1);
        assert_eq!(rx.recv().await.unwrap().kind.name(), "device_status_changed");
    }

    #[tokio::test]
    async fn store_failure_still_broadcasts() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_event_writes(true);
        let log = EventLog::new(store.clone());
        let mut rx = log.subscribe();

        assert!(!log.record(status_event()).await);
        assert!(store.events().await.is_empty());
        assert!(rx.recv().await.is_ok());
    }
}
