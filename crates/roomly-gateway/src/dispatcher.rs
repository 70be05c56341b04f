use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::warn;
use uuid::Uuid;

use roomly_types::events::GatewayEvent;

/// Manages all connected clients and fans out events.
///
/// Pure delivery, no state of record: everything durable lives in roomly-db,
/// and a reconnecting client re-derives unread state from storage.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for room-scoped events
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Targeted send channels: user_id -> conn_id -> sender.
    /// A user may hold several connections (multiple tabs/devices); targeted
    /// events go to all of them.
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to room-scoped events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast a room-scoped event. Every connection receives it and each
    /// drops events for rooms it has not joined, keyed on the event's own
    /// `conversation_id()`. Best-effort: no receivers is not an error.
    pub fn broadcast(&self, event: GatewayEvent) {
        if event.conversation_id().is_none() {
            warn!("Dropping broadcast of targeted event: {:?}", event);
            return;
        }
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a connection for targeted delivery. Returns (conn_id, receiver).
    pub async fn register_connection(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove a connection from the registry. A stale conn_id never evicts a
    /// newer connection of the same user.
    pub async fn unregister_connection(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to every connection a user currently holds,
    /// regardless of room membership. Used for badge notifications and match
    /// alerts; a user with no connections silently receives nothing and
    /// reconciles on reconnect.
    pub async fn notify_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(&user_id) {
            for tx in conns.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Whether the user has at least one live connection.
    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(conversation_id: Uuid, user_id: Uuid) -> GatewayEvent {
        GatewayEvent::UserTyping {
            conversation_id,
            user_id,
            username: "ana".into(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers_with_room_id() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let conv = Uuid::new_v4();
        dispatcher.broadcast(typing(conv, Uuid::new_v4()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.conversation_id(), Some(conv));
    }

    #[tokio::test]
    async fn targeted_events_never_enter_the_broadcast_channel() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.broadcast(GatewayEvent::NewMessageNotification {
            conversation_id: Uuid::new_v4(),
            sender_name: "ana".into(),
        });

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_reaches_every_connection_of_the_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_c1, mut rx1) = dispatcher.register_connection(user).await;
        let (_c2, mut rx2) = dispatcher.register_connection(user).await;

        let conv = Uuid::new_v4();
        dispatcher
            .notify_user(
                user,
                GatewayEvent::NewMessageNotification {
                    conversation_id: conv,
                    sender_name: "ben".into(),
                },
            )
            .await;

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                GatewayEvent::NewMessageNotification {
                    conversation_id, ..
                } => assert_eq!(conversation_id, conv),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn notify_to_disconnected_user_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        // Must not error or panic.
        dispatcher
            .notify_user(user, typing(Uuid::new_v4(), user))
            .await;
        assert!(!dispatcher.is_connected(user).await);
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (c1, mut rx1) = dispatcher.register_connection(user).await;
        let (_c2, mut rx2) = dispatcher.register_connection(user).await;

        dispatcher.unregister_connection(user, c1).await;
        assert!(dispatcher.is_connected(user).await);

        dispatcher
            .notify_user(user, typing(Uuid::new_v4(), user))
            .await;
        assert!(rx2.recv().await.is_some());
        // The first channel is closed, its sender dropped.
        assert!(rx1.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_conn_id_does_not_evict_newer_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (c1, _rx1) = dispatcher.register_connection(user).await;
        dispatcher.unregister_connection(user, c1).await;

        // Reconnect, then replay the old disconnect cleanup.
        let (_c2, mut rx2) = dispatcher.register_connection(user).await;
        dispatcher.unregister_connection(user, c1).await;

        assert!(dispatcher.is_connected(user).await);
        dispatcher
            .notify_user(user, typing(Uuid::new_v4(), user))
            .await;
        assert!(rx2.recv().await.is_some());
    }
}
