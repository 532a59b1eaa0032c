//! Producer end of the notification pipeline

use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::events::TriggeredAlertEvent;
use crate::alerts::types::AlertRule;
use crate::common::traits::AlertNotifier;
use crate::common::types::{AssetRecord, UserRef};

/// Turns committed triggers into events keyed by the owning user's id
#[derive(Debug, Clone)]
pub struct NotificationPublisher {
    bus: EventBus,
}

impl NotificationPublisher {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Emit one event. Failures are logged and swallowed; the alert has
    /// already been committed as Triggered.
    pub fn publish(&self, event: TriggeredAlertEvent) {
        let key = event.partition_key();
        let alert_id = event.alert_id;
        match self.bus.publish(&key, event) {
            Ok(partition) => {
                debug!("Alert {} queued for user {} on partition {}", alert_id, key, partition)
            }
            Err(e) => warn!("Failed to publish alert {} for user {}: {}", alert_id, key, e),
        }
    }
}

impl AlertNotifier for NotificationPublisher {
    fn notify(&self, alert: &AlertRule, user: &UserRef, asset: Option<&AssetRecord>) {
        match TriggeredAlertEvent::from_triggered(alert, user, asset) {
            Some(event) => self.publish(event),
            None => error!("Alert {} has no trigger data, not publishing", alert.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::{AlertKind, AlertStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn triggered_alert() -> AlertRule {
        let now = Utc::now();
        AlertRule {
            id: 11,
            user_id: 3,
            asset_id: "ethereum".to_string(),
            kind: AlertKind::PercentDown,
            threshold: dec!(-5),
            initial_price: Some(dec!(3000)),
            last_checked_price: Some(dec!(2800)),
            status: AlertStatus::Triggered,
            triggered_at: Some(now),
            triggered_price: Some(dec!(2800)),
            message: Some("Ethereum is down".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_notify_keys_by_user_id() {
        let (bus, mut receivers) = EventBus::new(3, 8);
        let partition = bus.partition_for("3");
        let publisher = NotificationPublisher::new(bus);

        let asset = AssetRecord::new("ethereum", "eth", "Ethereum");
        publisher.notify(&triggered_alert(), &UserRef::new(3, "carol"), Some(&asset));

        let event = receivers[partition].recv().await.unwrap();
        assert_eq!(event.username, "carol");
        assert_eq!(event.asset_symbol, "ETH");
        assert_eq!(event.threshold, dec!(-5));
        assert_eq!(event.triggered_price, dec!(2800));
    }

    #[test]
    fn test_publish_failure_does_not_panic() {
        let (bus, receivers) = EventBus::new(1, 1);
        drop(receivers);
        let publisher = NotificationPublisher::new(bus);

        publisher.notify(&triggered_alert(), &UserRef::new(3, "carol"), None);
    }
}
