//! In-process partitioned event bus
//!
//! Each partition is a bounded mpsc queue drained by exactly one consumer
//! task, so events sharing a key are delivered in the order they were
//! published. There is no ordering across partitions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::TriggeredAlertEvent;
use crate::common::channels::{create_event_channel_with_size, EventReceiver, EventSender};
use crate::common::errors::{RadarError, Result};

/// Producer side of the bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    partitions: Arc<Vec<EventSender>>,
}

impl EventBus {
    /// Create a bus and the receivers its consumers will drain, one per partition
    pub fn new(partitions: usize, capacity: usize) -> (Self, Vec<EventReceiver>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..partitions.max(1))
            .map(|_| create_event_channel_with_size(capacity))
            .unzip();

        (
            Self {
                partitions: Arc::new(senders),
            },
            receivers,
        )
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Stable partition index for a key
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }

    /// Enqueue without waiting. Returns the partition the event landed on.
    pub fn publish(&self, key: &str, event: TriggeredAlertEvent) -> Result<usize> {
        let partition = self.partition_for(key);
        match self.partitions[partition].try_send(event) {
            Ok(()) => Ok(partition),
            Err(TrySendError::Full(event)) => Err(RadarError::Delivery(format!(
                "partition {} full, dropping event for alert {}",
                partition, event.alert_id
            ))),
            Err(TrySendError::Closed(event)) => Err(RadarError::Delivery(format!(
                "partition {} closed, dropping event for alert {}",
                partition, event.alert_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::AlertKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event(alert_id: i64, user_id: i64) -> TriggeredAlertEvent {
        TriggeredAlertEvent {
            alert_id,
            user_id,
            username: format!("user{}", user_id),
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
    async fn test_same_key_same_partition_in_order() {
        let (bus, mut receivers) = EventBus::new(4, 16);
        let key = "42";
        let partition = bus.partition_for(key);

        for id in 1..=5 {
            assert_eq!(bus.publish(key, event(id, 42)).unwrap(), partition);
        }

        let rx = &mut receivers[partition];
        for id in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().alert_id, id);
        }
    }

    #[tokio::test]
    async fn test_full_partition_is_delivery_error() {
        let (bus, _receivers) = EventBus::new(1, 1);
        bus.publish("1", event(1, 1)).unwrap();

        let err = bus.publish("1", event(2, 1)).unwrap_err();
        assert!(matches!(err, RadarError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_closed_partition_is_delivery_error() {
        let (bus, receivers) = EventBus::new(2, 4);
        drop(receivers);

        assert!(matches!(
            bus.publish("7", event(1, 7)),
            Err(RadarError::Delivery(_))
        ));
    }
}
