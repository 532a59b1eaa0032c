use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::types::AssetRecord;

/// One asset on a user's watchlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WatchEntry {
    pub id: i64,
    pub user_id: i64,
    pub asset_id: String,
    pub added_at: DateTime<Utc>,
}

/// Watchlist entry joined with the asset's market fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedAsset {
    #[serde(flatten)]
    pub entry: WatchEntry,
    pub asset_name: String,
    pub asset_symbol: String,
    pub asset_image_url: Option<String>,
    pub market_cap_rank: Option<i32>,
    pub current_price: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    pub price_change_percentage_24h: Option<f64>,
    pub market_cap: Option<Decimal>,
    pub total_volume: Option<Decimal>,
}

impl WatchedAsset {
    /// A purged asset keeps its entry, shown by id with no market data
    pub fn new(entry: WatchEntry, asset: Option<&AssetRecord>) -> Self {
        match asset {
            Some(asset) => Self {
                asset_name: asset.name.clone(),
                asset_symbol: asset.symbol.clone(),
                asset_image_url: asset.image_url.clone(),
                market_cap_rank: asset.market_cap_rank,
                current_price: asset.current_price,
                price_change_24h: asset.price_change_24h,
                price_change_percentage_24h: asset.price_change_percentage_24h,
                market_cap: asset.market_cap,
                total_volume: asset.total_volume,
                entry,
            },
            None => Self {
                asset_name: entry.asset_id.clone(),
                asset_symbol: String::new(),
                asset_image_url: None,
                market_cap_rank: None,
                current_price: None,
                price_change_24h: None,
                price_change_percentage_24h: None,
                market_cap: None,
                total_volume: None,
                entry,
            },
        }
    }
}
