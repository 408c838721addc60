use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use quest_types::events::GatewayEvent;

/// Registry of live gateway connections, keyed by user id.
///
/// A user may hold several connections at once (multiple tabs or devices);
/// targeted events fan out to every one of them.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> (conn_id -> sender)
    connections: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `user_id`. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: &str) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove one connection. The user entry goes away with its last connection.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        if let Some(user_conns) = connections.get_mut(user_id) {
            user_conns.remove(&conn_id);
            if user_conns.is_empty() {
                connections.remove(user_id);
            }
        }
    }

    /// Send an event to every open connection of `user_id`.
    /// Returns how many connections accepted it; zero means the user is offline.
    pub async fn send_to_user(&self, user_id: &str, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let Some(user_conns) = connections.get(user_id) else {
            return 0;
        };

        let delivered = user_conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count();
        debug!("Delivered event to {}/{} connections of {}", delivered, user_conns.len(), user_id);
        delivered
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.inner.connections.read().await.contains_key(user_id)
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        self.inner
            .connections
            .read()
            .await
            .get(user_id)
            .map_or(0, HashMap::len)
    }

    /// Number of distinct users with at least one open connection.
    pub async fn online_user_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
