//! Upstream wire types (CoinGecko `/coins/markets` shape) and their mapping
//! onto stored records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::types::{AssetRecord, PriceSnapshot};

/// 7-day sparkline block
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sparkline {
    #[serde(default)]
    pub price: Vec<f64>,
}

/// One row of a `/coins/markets` response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketCoin {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub market_cap_rank: Option<i32>,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub price_change_24h: Option<Decimal>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub total_volume: Option<Decimal>,
    #[serde(default)]
    pub price_change_percentage_1h_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_30d_in_currency: Option<f64>,
    #[serde(default)]
    pub sparkline_in_7d: Option<Sparkline>,
    #[serde(default)]
    pub high_24h: Option<Decimal>,
    #[serde(default)]
    pub low_24h: Option<Decimal>,
    #[serde(default)]
    pub ath: Option<Decimal>,
    #[serde(default)]
    pub ath_change_percentage: Option<f64>,
    #[serde(default)]
    pub ath_date: Option<String>,
    #[serde(default)]
    pub atl: Option<Decimal>,
    #[serde(default)]
    pub atl_change_percentage: Option<f64>,
    #[serde(default)]
    pub atl_date: Option<String>,
    #[serde(default)]
    pub circulating_supply: Option<Decimal>,
}

impl MarketCoin {
    /// Full mapping used by the full refresh. Rows without an id are dropped.
    pub fn into_asset_record(self, now: DateTime<Utc>) -> Option<AssetRecord> {
        if self.id.is_empty() {
            return None;
        }

        let sparkline = self.sparkline_json();
        let ath_date = parse_timestamp("ath_date", &self.id, self.ath_date.as_deref());
        let atl_date = parse_timestamp("atl_date", &self.id, self.atl_date.as_deref());

        Some(AssetRecord {
            id: self.id,
            symbol: self.symbol,
            name: self.name,
            image_url: self.image,
            market_cap_rank: self.market_cap_rank,
            active: true,
            current_price: self.current_price,
            price_change_24h: self.price_change_24h,
            price_change_percentage_24h: self.price_change_percentage_24h,
            price_change_percentage_1h: self.price_change_percentage_1h_in_currency,
            price_change_percentage_7d: self.price_change_percentage_7d_in_currency,
            price_change_percentage_30d: self.price_change_percentage_30d_in_currency,
            market_cap: self.market_cap,
            total_volume: self.total_volume,
            high_24h: self.high_24h,
            low_24h: self.low_24h,
            ath: self.ath,
            ath_change_percentage: self.ath_change_percentage,
            ath_date,
            atl: self.atl,
            atl_change_percentage: self.atl_change_percentage,
            atl_date,
            circulating_supply: self.circulating_supply,
            sparkline,
            last_updated: now,
        })
    }

    /// Price-only mapping used by the incremental refresh
    pub fn to_price_snapshot(&self, now: DateTime<Utc>) -> Option<PriceSnapshot> {
        if self.id.is_empty() {
            return None;
        }

        Some(PriceSnapshot {
            id: self.id.clone(),
            current_price: self.current_price,
            price_change_24h: self.price_change_24h,
            price_change_percentage_24h: self.price_change_percentage_24h,
            price_change_percentage_1h: self.price_change_percentage_1h_in_currency,
            price_change_percentage_7d: self.price_change_percentage_7d_in_currency,
            price_change_percentage_30d: self.price_change_percentage_30d_in_currency,
            market_cap: self.market_cap,
            total_volume: self.total_volume,
            high_24h: self.high_24h,
            low_24h: self.low_24h,
            ath: self.ath,
            ath_change_percentage: self.ath_change_percentage,
            ath_date: parse_timestamp("ath_date", &self.id, self.ath_date.as_deref()),
            sparkline: self.sparkline_json(),
            last_updated: now,
        })
    }

    /// Serialized sparkline, or `None` if absent or unserializable
    fn sparkline_json(&self) -> Option<String> {
        let sparkline = self.sparkline_in_7d.as_ref()?;
        match serde_json::to_string(&sparkline.price) {
            Ok(json) => Some(json),
            Err(e) => {
                debug!("Dropping sparkline for {}: {}", self.id, e);
                None
            }
        }
    }
}

fn parse_timestamp(field: &str, id: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            debug!("Unparseable {} for {}: {:?} ({})", field, id, raw, e);
            None
        }
    }
}
