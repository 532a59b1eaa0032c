//! REST client for the upstream market data API

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::messages::MarketCoin;
use crate::common::errors::{RadarError, Result};
use crate::common::traits::MarketDataClient;
use crate::config::types::MarketDataConfig;

/// Upstream cap on page size and on ids per request
pub const MAX_PER_REQUEST: usize = 100;

const PRICE_CHANGE_WINDOWS: &str = "1h,24h,7d,30d";

/// REST client for `/coins/markets`
#[derive(Debug, Clone)]
pub struct MarketDataRestClient {
    /// HTTP client
    client: Client,
    /// Base URL of the API (without trailing slash)
    base_url: String,
    /// Quote currency for prices
    vs_currency: String,
}

impl MarketDataRestClient {
    /// Create a new REST client (no API key)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RadarError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: "usd".to_string(),
        })
    }

    /// Build a client from configuration, attaching the API key header if set
    pub fn from_config(config: &MarketDataConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let name = HeaderName::from_bytes(config.api_key_header.as_bytes())
                .map_err(|e| RadarError::Configuration(format!("Invalid API key header: {}", e)))?;
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| RadarError::Configuration(format!("Invalid API key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| RadarError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            vs_currency: config.vs_currency.clone(),
        })
    }

    /// Build the `/coins/markets` URL with the common query parameters plus `extra`
    fn markets_url(&self, extra: &[(&str, String)]) -> Result<Url> {
        let mut params: Vec<(&str, String)> = vec![
            ("vs_currency", self.vs_currency.clone()),
            ("price_change_percentage", PRICE_CHANGE_WINDOWS.to_string()),
            ("sparkline", "true".to_string()),
        ];
        params.extend(extra.iter().cloned());

        Url::parse_with_params(&format!("{}/coins/markets", self.base_url), &params)
            .map_err(|e| RadarError::Configuration(format!("Invalid market data URL: {}", e)))
    }

    /// Issue a GET and decode the body, mapping non-2xx into `ExternalFetch`
    async fn get_markets(&self, url: Url) -> Result<Vec<MarketCoin>> {
        debug!("Fetching markets from: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            RadarError::ExternalFetch {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Upstream rate limit hit (HTTP 429)");
            }
            let body = response.text().await.unwrap_or_default();
            return Err(RadarError::ExternalFetch {
                status: Some(status.as_u16()),
                message: format!("Server returned status {}: {}", status, body),
            });
        }

        let coins: Vec<MarketCoin> = response.json().await.map_err(|e| {
            RadarError::ExternalFetch {
                status: Some(status.as_u16()),
                message: format!("Invalid markets payload: {}", e),
            }
        })?;
        Ok(coins)
    }
}

#[async_trait]
impl MarketDataClient for MarketDataRestClient {
    #[instrument(skip(self))]
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<Vec<MarketCoin>> {
        let per_page = per_page.clamp(1, MAX_PER_REQUEST as u32);
        let url = self.markets_url(&[
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ])?;
        self.get_markets(url).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<MarketCoin>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_PER_REQUEST {
            return Err(RadarError::validation(format!(
                "At most {} ids per request, got {}",
                MAX_PER_REQUEST,
                ids.len()
            )));
        }

        let url = self.markets_url(&[
            ("ids", ids.join(",")),
            ("per_page", ids.len().to_string()),
        ])?;
        self.get_markets(url).await
    }

    fn source_name(&self) -> &'static str {
        "coingecko"
    }
}
