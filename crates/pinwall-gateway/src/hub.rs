use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use pinwall_types::events::PanelEvent;

/// Routes panel events to the WebSocket connections watching each panel.
///
/// Fan-out is per-panel: a connection only receives events for the panel it
/// currently watches, never a global feed.
#[derive(Clone)]
pub struct PanelHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// panel code -> (conn_id -> sender)
    watchers: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<PanelEvent>>>>,
}

impl PanelHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                watchers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection as a watcher of `code`.
    pub async fn join(&self, code: &str, conn_id: Uuid, tx: mpsc::UnboundedSender<PanelEvent>) {
        let mut watchers = self.inner.watchers.write().await;
        watchers.entry(code.to_string()).or_default().insert(conn_id, tx);
    }

    /// Remove a connection from a panel's watcher set. Empty sets are dropped
    /// so the map does not accumulate codes of abandoned panels.
    pub async fn leave(&self, code: &str, conn_id: Uuid) {
        let mut watchers = self.inner.watchers.write().await;
        if let Some(conns) = watchers.get_mut(code) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                watchers.remove(code);
            }
        }
    }

    /// Deliver an event to every connection watching its panel. Returns the
    /// number of connections reached. Events without a panel code (`Ready`)
    /// are connection-local and never fan out.
    pub async fn publish(&self, event: &PanelEvent) -> usize {
        let Some(code) = event.code() else {
            return 0;
        };

        let mut dead: Vec<Uuid> = Vec::new();
        let mut delivered = 0;
        {
            let watchers = self.inner.watchers.read().await;
            let Some(conns) = watchers.get(code) else {
                return 0;
            };
            for (&conn_id, tx) in conns.iter() {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(conn_id);
                }
            }
        }

        // Senders whose connection task is gone get dropped here rather than
        // lingering until the next explicit leave.
        if !dead.is_empty() {
            debug!("Pruning {} dead watchers from panel {}", dead.len(), code);
            let mut watchers = self.inner.watchers.write().await;
            if let Some(conns) = watchers.get_mut(code) {
                for conn_id in dead {
                    conns.remove(&conn_id);
                }
                if conns.is_empty() {
                    watchers.remove(code);
                }
            }
        }

        delivered
    }

    /// Number of live watchers on a panel.
    pub async fn watcher_count(&self, code: &str) -> usize {
        let watchers = self.inner.watchers.read().await;
        watchers.get(code).map_or(0, |conns| conns.len())
    }
}

impl Default for PanelHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined_event(code: &str, username: &str) -> PanelEvent {
        PanelEvent::UserJoined {
            code: code.to_string(),
            user_id: Uuid::new_v4(),
            username: username.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_watchers() {
        let hub = PanelHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        hub.join("ABC234", Uuid::new_v4(), tx_a).await;
        hub.join("ABC234", Uuid::new_v4(), tx_b).await;

        let delivered = hub.publish(&joined_event("ABC234", "meg")).await;
        assert_eq!(delivered, 2);
        assert!(matches!(rx_a.recv().await, Some(PanelEvent::UserJoined { .. })));
        assert!(matches!(rx_b.recv().await, Some(PanelEvent::UserJoined { .. })));
    }

    #[tokio::test]
    async fn test_publish_is_scoped_to_one_panel() {
        let hub = PanelHub::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        hub.join("ABC234", Uuid::new_v4(), tx_a).await;
        hub.join("XYZ789", Uuid::new_v4(), tx_b).await;

        let delivered = hub.publish(&joined_event("ABC234", "meg")).await;
        assert_eq!(delivered, 1);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let hub = PanelHub::new();
        let conn_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.join("ABC234", conn_id, tx).await;
        hub.leave("ABC234", conn_id).await;

        let delivered = hub.publish(&joined_event("ABC234", "meg")).await;
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.watcher_count("ABC234").await, 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = PanelHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.join("ABC234", Uuid::new_v4(), tx).await;

        for name in ["one", "two", "three"] {
            hub.publish(&joined_event("ABC234", name)).await;
        }

        for expected in ["one", "two", "three"] {
            match rx.recv().await {
                Some(PanelEvent::UserJoined { username, .. }) => assert_eq!(username, expected),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_dead_watchers_are_pruned_on_publish() {
        let hub = PanelHub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.join("ABC234", Uuid::new_v4(), tx).await;
        drop(rx);

        let delivered = hub.publish(&joined_event("ABC234", "meg")).await;
        assert_eq!(delivered, 0);
        assert_eq!(hub.watcher_count("ABC234").await, 0);
    }

    #[tokio::test]
    async fn test_connection_local_events_do_not_fan_out() {
        let hub = PanelHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.join("ABC234", Uuid::new_v4(), tx).await;

        let ready = PanelEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "meg".to_string(),
        };
        assert_eq!(hub.publish(&ready).await, 0);
        assert!(rx.try_recv().is_err());
    }
}
