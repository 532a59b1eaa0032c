//! Scheduler timing on a paused clock

mod common;

use coin_radar::common::types::AssetRecord;
use coin_radar::config::types::SyncConfig;
use coin_radar::store::{AssetStore, InMemoryAssetStore};
use coin_radar::sync::{CycleKind, MarketDataSynchronizer, SyncScheduler};
use common::{fast_settings, SlowMarketClient};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

async fn synchronizer(latency: Duration) -> (Arc<SlowMarketClient>, Arc<MarketDataSynchronizer>) {
    let store = Arc::new(InMemoryAssetStore::new());
    store
        .upsert_many(vec![AssetRecord::new("bitcoin", "btc", "Bitcoin").with_price(dec!(1))])
        .await
        .unwrap();
    let client = Arc::new(SlowMarketClient::new(latency));
    let sync = MarketDataSynchronizer::new(client.clone(), store, fast_settings(1, 100));
    (client, Arc::new(sync))
}

fn config(price_interval_seconds: u64) -> SyncConfig {
    SyncConfig {
        price_refresh_interval_seconds: price_interval_seconds,
        full_refresh_interval_seconds: 3600,
        ..SyncConfig::default()
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_ticks_during_a_run_are_skipped() {
    // each run spans two and a half periods
    let (client, sync) = synchronizer(Duration::from_millis(2500)).await;
    let handle = SyncScheduler::new(sync, &config(1)).start();

    // runs start at 0s, 3s, 6s and 9s; the ticks in between find the job busy
    sleep(Duration::from_millis(9500)).await;
    assert_eq!(client.started(), 4);
    assert_eq!(client.finished(), 3);
    assert!(handle.is_running(CycleKind::Price));
    assert!(!handle.is_running(CycleKind::Full));

    handle.shutdown().await;
    assert_eq!(client.started(), 4);
    assert_eq!(client.finished(), 4);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_shutdown_waits_for_in_flight_run() {
    let (client, sync) = synchronizer(Duration::from_secs(30)).await;
    let start = Instant::now();
    let handle = SyncScheduler::new(sync, &config(600)).start();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(client.started(), 1);
    assert_eq!(client.finished(), 0);

    handle.shutdown().await;
    assert_eq!(client.finished(), 1);
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_full_refresh_waits_one_period_unless_requested() {
    let (client, sync) = synchronizer(Duration::ZERO).await;
    let config = SyncConfig {
        price_refresh_interval_seconds: 3600,
        full_refresh_interval_seconds: 600,
        ..SyncConfig::default()
    };

    let handle = SyncScheduler::new(sync.clone(), &config).start();
    sleep(Duration::from_secs(1)).await;
    // only the price refresh ran at start
    assert_eq!(client.started(), 1);
    handle.shutdown().await;

    let handle = SyncScheduler::new(sync, &config)
        .with_full_refresh_on_start(true)
        .start();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(client.started(), 3);
    handle.shutdown().await;
}
