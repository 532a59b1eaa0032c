use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::common::errors::RadarError;
use crate::common::types::AssetRecord;

/// Kind of trigger rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    PriceAbove,
    PriceBelow,
    PercentUp,
    PercentDown,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::PriceAbove => "PRICE_ABOVE",
            AlertKind::PriceBelow => "PRICE_BELOW",
            AlertKind::PercentUp => "PERCENT_UP",
            AlertKind::PercentDown => "PERCENT_DOWN",
        }
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, AlertKind::PercentUp | AlertKind::PercentDown)
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = RadarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRICE_ABOVE" => Ok(AlertKind::PriceAbove),
            "PRICE_BELOW" => Ok(AlertKind::PriceBelow),
            "PERCENT_UP" => Ok(AlertKind::PercentUp),
            "PERCENT_DOWN" => Ok(AlertKind::PercentDown),
            other => Err(RadarError::Storage(format!("unknown alert kind: {}", other))),
        }
    }
}

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Triggered,
    Read,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Triggered => "TRIGGERED",
            AlertStatus::Read => "READ",
        }
    }

    /// Active and Read alerts can be removed; Triggered ones must be read first
    pub fn is_deletable(&self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Read)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = RadarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AlertStatus::Active),
            "TRIGGERED" => Ok(AlertStatus::Triggered),
            "READ" => Ok(AlertStatus::Read),
            other => Err(RadarError::Storage(format!("unknown alert status: {}", other))),
        }
    }
}

/// A persisted price alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub user_id: i64,
    pub asset_id: String,
    pub kind: AlertKind,
    pub threshold: Decimal,
    /// Asset price when the alert was created or last updated
    pub initial_price: Option<Decimal>,
    pub last_checked_price: Option<Decimal>,
    pub status: AlertStatus,
    pub triggered_at: Option<DateTime<Utc>>,
    pub triggered_price: Option<Decimal>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Transition Active -> Triggered
    pub fn mark_triggered(&mut self, price: Decimal, at: DateTime<Utc>, message: String) {
        self.status = AlertStatus::Triggered;
        self.triggered_at = Some(at);
        self.triggered_price = Some(price);
        self.last_checked_price = Some(price);
        self.message = Some(message);
        self.updated_at = at;
    }

    /// Whether `other` was evaluated against the same rule: threshold and
    /// reference price. Both change when the alert is retargeted in place.
    pub fn same_rule(&self, other: &AlertRule) -> bool {
        self.threshold == other.threshold && self.initial_price == other.initial_price
    }
}

/// Values for a create-or-update of the Active alert keyed by (user, asset, kind)
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub user_id: i64,
    pub asset_id: String,
    pub kind: AlertKind,
    pub threshold: Decimal,
    pub initial_price: Option<Decimal>,
}

/// Caller request to create or update an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub asset_id: String,
    pub kind: AlertKind,
    pub threshold: Decimal,
}

impl AlertRequest {
    pub fn new(asset_id: impl Into<String>, kind: AlertKind, threshold: Decimal) -> Self {
        Self {
            asset_id: asset_id.into(),
            kind,
            threshold,
        }
    }
}

/// Per-user alert counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: u64,
    pub active: u64,
    pub triggered: u64,
    pub read: u64,
    /// Triggered alerts the user has not acknowledged yet
    pub unread: u64,
}

impl AlertStats {
    pub fn from_alerts<'a>(alerts: impl IntoIterator<Item = &'a AlertRule>) -> Self {
        let mut stats = AlertStats::default();
        for alert in alerts {
            stats.total += 1;
            match alert.status {
                AlertStatus::Active => stats.active += 1,
                AlertStatus::Triggered => stats.triggered += 1,
                AlertStatus::Read => stats.read += 1,
            }
        }
        stats.unread = stats.triggered;
        stats
    }
}

/// Alert joined with the asset fields a listing needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: AlertRule,
    pub asset_name: String,
    pub asset_symbol: String,
    pub asset_image_url: Option<String>,
    pub current_price: Option<Decimal>,
    pub is_read: bool,
}

impl AlertView {
    pub fn new(alert: AlertRule, asset: Option<&AssetRecord>) -> Self {
        let is_read = alert.status == AlertStatus::Read;
        match asset {
            Some(asset) => Self {
                asset_name: asset.name.clone(),
                asset_symbol: asset.symbol.clone(),
                asset_image_url: asset.image_url.clone(),
                current_price: asset.current_price,
                is_read,
                alert,
            },
            None => Self {
                asset_name: alert.asset_id.clone(),
                asset_symbol: String::new(),
                asset_image_url: None,
                current_price: None,
                is_read,
                alert,
            },
        }
    }
}
