//! Consumer end of the notification pipeline
//!
//! One task per bus partition drains events in order and pushes each to the
//! owning user's live channel. Delivery failures are logged and the event is
//! dropped; a bad event never stalls its partition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::events::TriggeredAlertEvent;
use crate::common::channels::EventReceiver;
use crate::common::traits::UserChannel;

/// Pushes consumed events to user channels
pub struct NotificationRelay {
    channel: Arc<dyn UserChannel>,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl NotificationRelay {
    pub fn new(channel: Arc<dyn UserChannel>) -> Self {
        Self {
            channel,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Deliver one event. Returns whether the push succeeded; never fails.
    #[instrument(skip(self, event), fields(alert_id = event.alert_id, user = %event.username))]
    pub async fn deliver(&self, event: &TriggeredAlertEvent) -> bool {
        match self.channel.push(&event.username, event).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("Delivered alert {} to {}", event.alert_id, event.username);
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Failed to deliver alert {} to {}: {}",
                    event.alert_id, event.username, e
                );
                false
            }
        }
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Start one consumer per receiver
    pub fn spawn(self: Arc<Self>, receivers: Vec<EventReceiver>) -> RelayHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = receivers
            .into_iter()
            .enumerate()
            .map(|(partition, rx)| {
                let relay = self.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { relay.consume(partition, rx, shutdown).await })
            })
            .collect();

        info!("Notification relay started");
        RelayHandle {
            relay: self,
            shutdown: shutdown_tx,
            tasks,
        }
    }

    async fn consume(
        &self,
        partition: usize,
        mut rx: EventReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        let mut handled = 0u64;
        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(event) => {
                        self.deliver(&event).await;
                        handled += 1;
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        // stop intake, then finish what is already queued
                        rx.close();
                        while let Some(event) = rx.recv().await {
                            self.deliver(&event).await;
                            handled += 1;
                        }
                        break;
                    }
                }
            }
        }
        debug!("Partition {} consumer stopped after {} events", partition, handled);
        handled
    }
}

/// Running relay tasks
pub struct RelayHandle {
    relay: Arc<NotificationRelay>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<u64>>,
}

impl RelayHandle {
    pub fn relay(&self) -> &Arc<NotificationRelay> {
        &self.relay
    }

    /// Stop consuming, drain queued events and wait for every consumer.
    /// Returns the number of events handled over the relay's lifetime.
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown.send(true);
        let mut handled = 0;
        for task in self.tasks {
            match task.await {
                Ok(count) => handled += count,
                Err(e) => warn!("Relay consumer ended abnormally: {}", e),
            }
        }
        info!(
            "Notification relay stopped: {} delivered, {} failed",
            self.relay.delivered_count(),
            self.relay.failed_count()
        );
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::AlertKind;
    use crate::common::errors::{RadarError, Result};
    use crate::notifications::bus::EventBus;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        pushed: Mutex<Vec<(String, i64)>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl UserChannel for RecordingChannel {
        async fn push(&self, username: &str, event: &TriggeredAlertEvent) -> Result<()> {
            if self.reject.as_deref() == Some(username) {
                return Err(RadarError::Delivery("offline".to_string()));
            }
            self.pushed
                .lock()
                .await
                .push((username.to_string(), event.alert_id));
            Ok(())
        }
    }

    fn event(alert_id: i64, user_id: i64, username: &str) -> TriggeredAlertEvent {
        TriggeredAlertEvent {
            alert_id,
            user_id,
            username: username.to_string(),
            asset_id: "bitcoin".to_string(),
            asset_name: "Bitcoin".to_string(),
            asset_symbol: "BTC".to_string(),
            alert_kind: AlertKind::PriceAbove,
            threshold: dec!(60000),
            triggered_price: dec!(61000),
            message: String::new(),
            triggered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_events_in_order() {
        let channel = Arc::new(RecordingChannel::default());
        let (bus, receivers) = EventBus::new(2, 16);
        for id in 1..=4 {
            bus.publish("9", event(id, 9, "dave")).unwrap();
        }

        let handle = Arc::new(NotificationRelay::new(channel.clone())).spawn(receivers);
        assert_eq!(handle.shutdown().await, 4);

        let pushed = channel.pushed.lock().await;
        let ids: Vec<i64> = pushed.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stall_partition() {
        let channel = Arc::new(RecordingChannel {
            reject: Some("erin".to_string()),
            ..Default::default()
        });
        let relay = Arc::new(NotificationRelay::new(channel.clone()));
        let (bus, receivers) = EventBus::new(1, 16);
        bus.publish("5", event(1, 5, "erin")).unwrap();
        bus.publish("6", event(2, 6, "frank")).unwrap();

        let handle = relay.clone().spawn(receivers);
        handle.shutdown().await;

        assert_eq!(relay.failed_count(), 1);
        assert_eq!(relay.delivered_count(), 1);
        assert_eq!(channel.pushed.lock().await[0], ("frank".to_string(), 2));
    }
}
