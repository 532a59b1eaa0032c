//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use coin_radar::common::errors::{RadarError, Result};
use coin_radar::common::traits::MarketDataClient;
use coin_radar::market_data::MarketCoin;
use coin_radar::sync::SyncSettings;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Minimal market row
pub fn coin(id: &str, price: Decimal) -> MarketCoin {
    MarketCoin {
        id: id.to_string(),
        symbol: id.chars().take(3).collect(),
        name: format!("{} coin", id),
        current_price: Some(price),
        ..Default::default()
    }
}

/// Sync pacing with no delays, for tests
pub fn fast_settings(pages: u32, batch_size: usize) -> SyncSettings {
    SyncSettings {
        pages,
        page_size: 100,
        page_delay: Duration::ZERO,
        batch_size,
        batch_delay: Duration::ZERO,
    }
}

/// Hand-written market client serving canned prices
#[derive(Default)]
pub struct FakeMarketClient {
    prices: Mutex<HashMap<String, Decimal>>,
    pub requests: Mutex<Vec<Vec<String>>>,
}

impl FakeMarketClient {
    pub fn set_price(&self, id: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(id.to_string(), price);
    }
}

#[async_trait]
impl MarketDataClient for FakeMarketClient {
    async fn fetch_page(&self, page: u32, _per_page: u32) -> Result<Vec<MarketCoin>> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let prices = self.prices.lock().unwrap();
        let mut coins: Vec<MarketCoin> = prices.iter().map(|(id, p)| coin(id, *p)).collect();
        coins.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(coins)
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MarketCoin>> {
        self.requests.lock().unwrap().push(ids.to_vec());
        let prices = self.prices.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| prices.get(id).map(|p| coin(id, *p)))
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

/// Market client that takes `latency` to answer every request
pub struct SlowMarketClient {
    latency: Duration,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
}

impl SlowMarketClient {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    async fn respond(&self, ids: Vec<String>) -> Result<Vec<MarketCoin>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ids.iter().map(|id| coin(id, Decimal::ONE)).collect())
    }
}

#[async_trait]
impl MarketDataClient for SlowMarketClient {
    async fn fetch_page(&self, _page: u32, _per_page: u32) -> Result<Vec<MarketCoin>> {
        self.respond(Vec::new()).await
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MarketCoin>> {
        self.respond(ids.to_vec()).await
    }

    fn source_name(&self) -> &'static str {
        "slow"
    }
}

pub fn upstream_error(status: u16) -> RadarError {
    RadarError::ExternalFetch {
        status: Some(status),
        message: format!("Server returned status {}", status),
    }
}

/// Sample API responses for testing
pub mod api_responses {
    /// Two rows of `/coins/markets`, the second with an unparseable ATH date
    pub const MARKETS_PAGE: &str = r#"[
        {
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": "https://assets.example.com/btc.png",
            "current_price": 61000.5,
            "market_cap": 1200000000000,
            "market_cap_rank": 1,
            "total_volume": 35000000000,
            "high_24h": 62000,
            "low_24h": 59000,
            "price_change_24h": 1200.25,
            "price_change_percentage_24h": 2.01,
            "circulating_supply": 19600000,
            "ath": 73738,
            "ath_change_percentage": -17.3,
            "ath_date": "2024-03-14T07:10:36.635Z",
            "atl": 67.81,
            "atl_change_percentage": 89900.1,
            "atl_date": "2013-07-06T00:00:00.000Z",
            "sparkline_in_7d": { "price": [60000.0, 60500.5, 61000.5] },
            "price_change_percentage_1h_in_currency": 0.12,
            "price_change_percentage_7d_in_currency": 4.5,
            "price_change_percentage_30d_in_currency": -1.2
        },
        {
            "id": "ethereum",
            "symbol": "eth",
            "name": "Ethereum",
            "current_price": 3010.12,
            "market_cap_rank": 2,
            "ath": 4878.26,
            "ath_date": "not a date"
        }
    ]"#;
}

/// Parsed form of [`api_responses::MARKETS_PAGE`]
pub static MARKETS_PAGE: Lazy<Vec<MarketCoin>> = Lazy::new(|| {
    serde_json::from_str(api_responses::MARKETS_PAGE).expect("sample page parses")
});
