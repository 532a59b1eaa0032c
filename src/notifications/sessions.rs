//! Live per-user sessions

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::events::TriggeredAlertEvent;
use crate::common::channels::{create_event_channel_with_size, EventReceiver, EventSender};
use crate::common::errors::{RadarError, Result};
use crate::common::traits::UserChannel;

/// Identifier of one connected session
pub type SessionId = u64;

/// Registry of live sessions keyed by username. A user may hold several
/// sessions at once; each gets its own buffered channel.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Vec<(SessionId, EventSender)>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl SessionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    /// Open a session for `username`, returning its id and event stream
    pub async fn connect(&self, username: &str) -> (SessionId, EventReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = create_event_channel_with_size(self.buffer);
        self.sessions
            .write()
            .await
            .entry(username.to_string())
            .or_default()
            .push((id, tx));
        info!("Session {} opened for {}", id, username);
        (id, rx)
    }

    pub async fn disconnect(&self, username: &str, id: SessionId) {
        let mut sessions = self.sessions.write().await;
        if let Some(list) = sessions.get_mut(username) {
            list.retain(|(sid, _)| *sid != id);
            if list.is_empty() {
                sessions.remove(username);
            }
        }
        info!("Session {} closed for {}", id, username);
    }

    pub async fn session_count(&self, username: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(username)
            .map_or(0, |list| list.len())
    }
}

#[async_trait]
impl UserChannel for SessionRegistry {
    async fn push(&self, username: &str, event: &TriggeredAlertEvent) -> Result<()> {
        let targets: Vec<(SessionId, EventSender)> = match self.sessions.read().await.get(username) {
            Some(list) => list.clone(),
            None => {
                return Err(RadarError::Delivery(format!(
                    "no live session for {}",
                    username
                )))
            }
        };

        // a stuck session must not stall the partition feeding it
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Session {} of {} is lagging, event {} dropped", id, username, event.alert_id)
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }

        for id in dead {
            debug!("Pruning closed session {} of {}", id, username);
            self.disconnect(username, id).await;
        }

        if delivered == 0 {
            return Err(RadarError::Delivery(format!(
                "no session of {} accepted the event",
                username
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::AlertKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event() -> TriggeredAlertEvent {
        TriggeredAlertEvent {
            alert_id: 1,
            user_id: 1,
            username: "alice".to_string(),
            asset_id: "bitcoin".to_string(),
            asset_name: "Bitcoin".to_string(),
            asset_symbol: "BTC".to_string(),
            alert_kind: AlertKind::PriceBelow,
            threshold: dec!(40000),
            triggered_price: dec!(39999),
            message: String::new(),
            triggered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_push_reaches_every_session() {
        let registry = SessionRegistry::new(4);
        let (_, mut first) = registry.connect("alice").await;
        let (_, mut second) = registry.connect("alice").await;

        registry.push("alice", &event()).await.unwrap();

        assert_eq!(first.recv().await.unwrap().alert_id, 1);
        assert_eq!(second.recv().await.unwrap().alert_id, 1);
    }

    #[tokio::test]
    async fn test_push_without_session_fails() {
        let registry = SessionRegistry::new(4);
        let err = registry.push("bob", &event()).await.unwrap_err();
        assert!(matches!(err, RadarError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_closed_sessions_are_pruned() {
        let registry = SessionRegistry::new(4);
        let (_, rx) = registry.connect("alice").await;
        drop(rx);

        assert!(registry.push("alice", &event()).await.is_err());
        assert_eq!(registry.session_count("alice").await, 0);
    }
}
