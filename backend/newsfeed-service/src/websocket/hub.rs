/// Registry of live connections per user
///
/// Each connection owns a bounded frame buffer. Sends never wait: a full or
/// closed buffer counts as a failed send and the connection is deregistered,
/// which drops its sender and ends the session.
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::PushFrame;
use crate::metrics;

pub type ConnectionId = Uuid;

#[derive(Clone)]
pub struct PushHub {
    connections: Arc<DashMap<Uuid, HashMap<ConnectionId, mpsc::Sender<PushFrame>>>>,
    buffer: usize,
}

impl PushHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a new connection for `user_id`
    pub fn register(&self, user_id: Uuid) -> (ConnectionId, mpsc::Receiver<PushFrame>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let connection_id = Uuid::new_v4();

        self.connections
            .entry(user_id)
            .or_default()
            .insert(connection_id, tx);

        debug!(user_id = %user_id, connection_id = %connection_id, "Live connection registered");
        metrics::set_live_connections(self.total_connections());
        (connection_id, rx)
    }

    /// Remove one connection; returns whether it was registered
    pub fn deregister(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let removed = match self.connections.get_mut(&user_id) {
            Some(mut conns) => conns.remove(&connection_id).is_some(),
            None => false,
        };
        self.connections.remove_if(&user_id, |_, conns| conns.is_empty());

        if removed {
            debug!(user_id = %user_id, connection_id = %connection_id, "Live connection removed");
            metrics::set_live_connections(self.total_connections());
        }
        removed
    }

    /// Send a frame to every live connection of `user_id`; returns how many accepted it
    pub fn send_to_user(&self, user_id: Uuid, frame: &PushFrame) -> usize {
        let mut delivered = 0;
        let mut dropped = 0;

        if let Some(mut conns) = self.connections.get_mut(&user_id) {
            conns.retain(|connection_id, tx| match tx.try_send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    warn!(
                        user_id = %user_id,
                        connection_id = %connection_id,
                        event = frame.event_name(),
                        "Push send failed ({}), dropping connection",
                        match e {
                            mpsc::error::TrySendError::Full(_) => "buffer full",
                            mpsc::error::TrySendError::Closed(_) => "closed",
                        }
                    );
                    dropped += 1;
                    false
                }
            });
        }

        if dropped > 0 {
            self.connections.remove_if(&user_id, |_, conns| conns.is_empty());
            metrics::set_live_connections(self.total_connections());
        }
        for _ in 0..delivered {
            metrics::record_push_frame(frame.event_name(), true);
        }
        for _ in 0..dropped {
            metrics::record_push_frame(frame.event_name(), false);
        }

        delivered
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.connections
            .get(&user_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::messages::RefreshHint;

    fn hint() -> PushFrame {
        PushFrame::FeedRefreshNeeded(RefreshHint {
            post_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: 1,
        })
    }

    #[tokio::test]
    async fn test_multiple_connections_per_user() {
        let hub = PushHub::new(8);
        let user = Uuid::new_v4();
        let (_, mut rx1) = hub.register(user);
        let (_, mut rx2) = hub.register(user);

        assert_eq!(hub.send_to_user(user, &hint()), 2);
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
        assert_eq!(hub.connection_count(user), 2);
    }

    #[test]
    fn test_offline_user_receives_nothing() {
        let hub = PushHub::new(8);
        assert_eq!(hub.send_to_user(Uuid::new_v4(), &hint()), 0);
    }

    #[test]
    fn test_full_buffer_deregisters_connection() {
        let hub = PushHub::new(1);
        let user = Uuid::new_v4();
        let (_, _rx) = hub.register(user);

        assert_eq!(hub.send_to_user(user, &hint()), 1);
        // Buffer of one is now full
        assert_eq!(hub.send_to_user(user, &hint()), 0);
        assert_eq!(hub.connection_count(user), 0);
        assert_eq!(hub.total_connections(), 0);
    }

    #[test]
    fn test_closed_receiver_deregisters_connection() {
        let hub = PushHub::new(4);
        let user = Uuid::new_v4();
        let (_, rx) = hub.register(user);
        let (_, _keep) = hub.register(user);
        drop(rx);

        assert_eq!(hub.send_to_user(user, &hint()), 1);
        assert_eq!(hub.connection_count(user), 1);
    }

    #[tokio::test]
    async fn test_deregister_closes_stream() {
        let hub = PushHub::new(4);
        let user = Uuid::new_v4();
        let (id, mut rx) = hub.register(user);

        assert!(hub.deregister(user, id));
        assert!(!hub.deregister(user, id));
        assert!(rx.recv().await.is_none());
    }
}
