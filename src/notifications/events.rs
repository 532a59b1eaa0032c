//! Triggered-alert event carried by the bus

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::alerts::types::{AlertKind, AlertRule};
use crate::common::types::{AssetRecord, UserRef};

/// A triggered alert on its way to the user's live channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredAlertEvent {
    pub alert_id: i64,
    pub user_id: i64,
    pub username: String,
    pub asset_id: String,
    pub asset_name: String,
    pub asset_symbol: String,
    pub alert_kind: AlertKind,
    /// Threshold as configured, sign included
    pub threshold: Decimal,
    pub triggered_price: Decimal,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

impl TriggeredAlertEvent {
    /// Build the event for a committed trigger. Returns `None` if the alert
    /// carries no trigger data.
    pub fn from_triggered(alert: &AlertRule, user: &UserRef, asset: Option<&AssetRecord>) -> Option<Self> {
        let triggered_price = alert.triggered_price?;
        let triggered_at = alert.triggered_at?;
        let (asset_name, asset_symbol) = match asset {
            Some(a) => (a.name.clone(), a.symbol.to_uppercase()),
            None => (alert.asset_id.clone(), String::new()),
        };

        Some(Self {
            alert_id: alert.id,
            user_id: user.id,
            username: user.username.clone(),
            asset_id: alert.asset_id.clone(),
            asset_name,
            asset_symbol,
            alert_kind: alert.kind,
            threshold: alert.threshold,
            triggered_price,
            message: alert.message.clone().unwrap_or_default(),
            triggered_at,
        })
    }

    /// Ordering key on the bus: all events of one user share a partition
    pub fn partition_key(&self) -> String {
        self.user_id.to_string()
    }
}
