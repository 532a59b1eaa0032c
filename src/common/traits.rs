//! Trait definitions at the seams between subsystems

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{AssetRecord, UserRef};
use crate::alerts::types::AlertRule;
use crate::market_data::messages::MarketCoin;
use crate::notifications::events::TriggeredAlertEvent;

/// Trait for upstream market data sources
///
/// One call is one upstream request: a page in market-cap order, or a batch
/// of explicit ids. Failures carry the upstream status code when there is one.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Fetch one page of assets ordered by market cap
    ///
    /// # Arguments
    /// * `page` - 1-based page number
    /// * `per_page` - Page size, bounded by the upstream limit
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<MarketCoin>>;

    /// Fetch market data for an explicit list of ids
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MarketCoin>>;

    /// Name of the upstream source, for logs
    fn source_name(&self) -> &'static str;
}

/// Receives every price written by the synchronizer
#[async_trait]
pub trait PriceListener: Send + Sync {
    async fn on_price_update(&self, asset_id: &str, price: Decimal);
}

/// Hands committed triggers to the delivery pipeline.
///
/// Implementations must not block and must not fail the caller: the alert's
/// stored state is the source of truth, the event is best effort.
pub trait AlertNotifier: Send + Sync {
    fn notify(&self, alert: &AlertRule, user: &UserRef, asset: Option<&AssetRecord>);
}

/// Outward push to a user's live channel
#[async_trait]
pub trait UserChannel: Send + Sync {
    /// Push one event to every live session of `username`
    async fn push(&self, username: &str, event: &TriggeredAlertEvent) -> Result<()>;
}
