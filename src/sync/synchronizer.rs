//! Market data synchronizer
//!
//! Two cycles pull from the upstream source:
//!
//! - **Full refresh**: purge inactive assets, then walk the top pages in
//!   market-cap order and replace every field of every returned asset.
//! - **Price refresh**: re-fetch price fields for all active assets in
//!   id batches.
//!
//! Pages and batches run one at a time with a fixed pause between them to
//! stay under the upstream rate limit. A failed unit is logged and skipped;
//! the next cycle picks it up. Neither cycle returns an error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::common::traits::{MarketDataClient, PriceListener};
use crate::common::types::AssetRecord;
use crate::config::types::SyncConfig;
use crate::market_data::MAX_PER_REQUEST;
use crate::store::{AssetStore, CachedAssetStore};

/// Which cycle a summary belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Full,
    Price,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleKind::Full => write!(f, "full refresh"),
            CycleKind::Price => write!(f, "price refresh"),
        }
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub kind: CycleKind,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Pages or batches attempted
    pub units: usize,
    pub failed_units: Vec<usize>,
    /// Inactive assets removed before fetching (full refresh only)
    pub purged: u64,
    pub records_written: usize,
}

impl CycleSummary {
    fn start(kind: CycleKind) -> (Self, Instant) {
        (
            Self {
                kind,
                started_at: Utc::now(),
                elapsed: Duration::ZERO,
                units: 0,
                failed_units: Vec::new(),
                purged: 0,
                records_written: 0,
            },
            Instant::now(),
        )
    }

    pub fn succeeded_units(&self) -> usize {
        self.units - self.failed_units.len()
    }
}

/// Pacing and sizing of the two cycles
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub pages: u32,
    pub page_size: u32,
    pub page_delay: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            pages: config.pages,
            page_size: config.page_size,
            page_delay: config.page_delay(),
            batch_size: config.batch_size,
            batch_delay: config.batch_delay(),
        }
    }
}

/// Split ids into request-sized batches. The size is capped at the upstream
/// per-request id limit.
pub fn partition_ids(ids: &[String], batch_size: usize) -> Vec<Vec<String>> {
    let size = batch_size.clamp(1, MAX_PER_REQUEST);
    ids.chunks(size).map(<[String]>::to_vec).collect()
}

/// Pulls market data into the asset store and fans prices out to listeners
pub struct MarketDataSynchronizer {
    client: Arc<dyn MarketDataClient>,
    assets: Arc<dyn AssetStore>,
    cache: Option<Arc<CachedAssetStore>>,
    listeners: Vec<Arc<dyn PriceListener>>,
    settings: SyncSettings,
}

impl MarketDataSynchronizer {
    pub fn new(
        client: Arc<dyn MarketDataClient>,
        assets: Arc<dyn AssetStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            client,
            assets,
            cache: None,
            listeners: Vec::new(),
            settings,
        }
    }

    /// Write through `cache`; it is cleared at the start of every cycle
    pub fn with_cache(mut self, cache: Arc<CachedAssetStore>) -> Self {
        self.assets = cache.clone();
        self.cache = Some(cache);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn PriceListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub async fn run(&self, kind: CycleKind) -> CycleSummary {
        match kind {
            CycleKind::Full => self.full_refresh().await,
            CycleKind::Price => self.price_refresh().await,
        }
    }

    /// Purge inactive assets, then fetch and upsert every configured page
    #[instrument(skip(self), fields(source = self.client.source_name()))]
    pub async fn full_refresh(&self) -> CycleSummary {
        let (mut summary, clock) = CycleSummary::start(CycleKind::Full);
        self.invalidate_cache().await;
        info!(
            "Starting full refresh: {} pages of {}",
            self.settings.pages, self.settings.page_size
        );

        match self.assets.delete_inactive().await {
            Ok(purged) => {
                summary.purged = purged;
                if purged > 0 {
                    info!("Purged {} inactive assets", purged);
                }
            }
            Err(e) => error!("Failed to purge inactive assets: {}", e),
        }

        for page in 1..=self.settings.pages {
            if page > 1 {
                tokio::time::sleep(self.settings.page_delay).await;
            }
            summary.units += 1;

            let coins = match self.client.fetch_page(page, self.settings.page_size).await {
                Ok(coins) => coins,
                Err(e) => {
                    warn!("Failed to fetch page {}, skipping: {}", page, e);
                    summary.failed_units.push(page as usize);
                    continue;
                }
            };

            let now = Utc::now();
            let records: Vec<AssetRecord> = coins
                .into_iter()
                .filter_map(|coin| coin.into_asset_record(now))
                .collect();
            let prices = price_points(&records);

            match self.assets.upsert_many(records).await {
                Ok(written) => {
                    debug!("Page {}: upserted {} assets", page, written);
                    summary.records_written += written;
                    self.notify_listeners(&prices).await;
                }
                Err(e) => {
                    error!("Failed to store page {}: {}", page, e);
                    summary.failed_units.push(page as usize);
                }
            }
        }

        self.finish(summary, clock)
    }

    /// Refresh price fields of every active asset, batch by batch
    #[instrument(skip(self), fields(source = self.client.source_name()))]
    pub async fn price_refresh(&self) -> CycleSummary {
        let (mut summary, clock) = CycleSummary::start(CycleKind::Price);
        self.invalidate_cache().await;

        let ids = match self.assets.active_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to list active assets, price refresh skipped: {}", e);
                return self.finish(summary, clock);
            }
        };

        let batches = partition_ids(&ids, self.settings.batch_size);
        info!(
            "Starting price refresh: {} assets in {} batches",
            ids.len(),
            batches.len()
        );

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            summary.units += 1;
            let batch_no = index + 1;

            let coins = match self.client.fetch_by_ids(batch).await {
                Ok(coins) => coins,
                Err(e) => {
                    warn!("Failed to fetch price batch {}, skipping: {}", batch_no, e);
                    summary.failed_units.push(batch_no);
                    continue;
                }
            };

            let now = Utc::now();
            let snapshots: Vec<_> = coins
                .iter()
                .filter_map(|coin| coin.to_price_snapshot(now))
                .collect();

            match self.assets.apply_price_updates(&snapshots).await {
                Ok(updated) => {
                    debug!(
                        "Batch {}: {} of {} requested assets updated",
                        batch_no,
                        updated.len(),
                        batch.len()
                    );
                    summary.records_written += updated.len();
                    self.notify_listeners(&price_points(&updated)).await;
                }
                Err(e) => {
                    error!("Failed to store price batch {}: {}", batch_no, e);
                    summary.failed_units.push(batch_no);
                }
            }
        }

        self.finish(summary, clock)
    }

    async fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all().await;
        }
    }

    async fn notify_listeners(&self, prices: &[(String, Decimal)]) {
        for listener in &self.listeners {
            for (asset_id, price) in prices {
                listener.on_price_update(asset_id, *price).await;
            }
        }
    }

    fn finish(&self, mut summary: CycleSummary, clock: Instant) -> CycleSummary {
        summary.elapsed = clock.elapsed();
        if summary.failed_units.is_empty() {
            info!(
                "Finished {}: {} records in {:?}",
                summary.kind, summary.records_written, summary.elapsed
            );
        } else {
            warn!(
                "Finished {} with skipped units {:?}: {} records in {:?}",
                summary.kind, summary.failed_units, summary.records_written, summary.elapsed
            );
        }
        summary
    }
}

fn price_points(records: &[AssetRecord]) -> Vec<(String, Decimal)> {
    records
        .iter()
        .filter_map(|r| r.current_price.map(|price| (r.id.clone(), price)))
        .collect()
}
