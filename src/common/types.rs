//! Shared domain types: asset snapshots and user references

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persisted snapshot of one tradable asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssetRecord {
    /// Stable upstream identifier (e.g. "bitcoin")
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub market_cap_rank: Option<i32>,
    /// Inactive records are purged at the start of a full refresh
    pub active: bool,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub price_change_24h: Option<Decimal>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_1h: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_30d: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub total_volume: Option<Decimal>,
    #[serde(default)]
    pub high_24h: Option<Decimal>,
    #[serde(default)]
    pub low_24h: Option<Decimal>,
    #[serde(default)]
    pub ath: Option<Decimal>,
    #[serde(default)]
    pub ath_change_percentage: Option<f64>,
    #[serde(default)]
    pub ath_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub atl: Option<Decimal>,
    #[serde(default)]
    pub atl_change_percentage: Option<f64>,
    #[serde(default)]
    pub atl_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub circulating_supply: Option<Decimal>,
    /// 7-day sparkline serialized as a JSON array of prices
    #[serde(default)]
    pub sparkline: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl AssetRecord {
    /// Create a bare active record with no market data
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: name.into(),
            image_url: None,
            market_cap_rank: None,
            active: true,
            current_price: None,
            price_change_24h: None,
            price_change_percentage_24h: None,
            price_change_percentage_1h: None,
            price_change_percentage_7d: None,
            price_change_percentage_30d: None,
            market_cap: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            ath: None,
            ath_change_percentage: None,
            ath_date: None,
            atl: None,
            atl_change_percentage: None,
            atl_date: None,
            circulating_supply: None,
            sparkline: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.current_price = Some(price);
        self
    }

    /// Overlay price-related fields from an incremental refresh.
    /// Identity, naming and supply fields are left untouched.
    pub fn apply_price(&mut self, snapshot: &PriceSnapshot) {
        self.current_price = snapshot.current_price;
        self.price_change_24h = snapshot.price_change_24h;
        self.price_change_percentage_24h = snapshot.price_change_percentage_24h;
        self.price_change_percentage_1h = snapshot.price_change_percentage_1h;
        self.price_change_percentage_7d = snapshot.price_change_percentage_7d;
        self.price_change_percentage_30d = snapshot.price_change_percentage_30d;
        self.market_cap = snapshot.market_cap;
        self.total_volume = snapshot.total_volume;
        self.high_24h = snapshot.high_24h;
        self.low_24h = snapshot.low_24h;
        self.ath = snapshot.ath;
        self.ath_change_percentage = snapshot.ath_change_percentage;
        self.ath_date = snapshot.ath_date;
        self.sparkline = snapshot.sparkline.clone();
        self.last_updated = snapshot.last_updated;
    }
}

/// Price-related subset of an asset, produced by the incremental refresh
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub id: String,
    pub current_price: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    pub price_change_percentage_24h: Option<f64>,
    pub price_change_percentage_1h: Option<f64>,
    pub price_change_percentage_7d: Option<f64>,
    pub price_change_percentage_30d: Option<f64>,
    pub market_cap: Option<Decimal>,
    pub total_volume: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub ath: Option<Decimal>,
    pub ath_change_percentage: Option<f64>,
    pub ath_date: Option<DateTime<Utc>>,
    pub sparkline: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Snapshot carrying only a price, everything else unset
    pub fn price_only(id: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            current_price: Some(price),
            price_change_24h: None,
            price_change_percentage_24h: None,
            price_change_percentage_1h: None,
            price_change_percentage_7d: None,
            price_change_percentage_30d: None,
            market_cap: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            ath: None,
            ath_change_percentage: None,
            ath_date: None,
            sparkline: None,
            last_updated: Utc::now(),
        }
    }
}

/// Minimal view of a registered user, resolved from the user directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}

impl UserRef {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}
