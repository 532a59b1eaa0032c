//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream market data API
    #[serde(default)]
    pub market_data: MarketDataConfig,
    /// Refresh pacing and schedule
    #[serde(default)]
    pub sync: SyncConfig,
    /// Event bus sizing
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// WebSocket gateway for live alert delivery
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Database configuration (optional, in-memory stores when absent)
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Upstream market data API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Base URL of the REST API
    #[serde(default = "default_market_data_url")]
    pub base_url: String,
    /// API key (optional on the public tier)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Header carrying the API key
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Quote currency
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_data_url(),
            api_key: None,
            api_key_header: default_api_key_header(),
            vs_currency: default_vs_currency(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_market_data_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_api_key_header() -> String {
    "x-cg-demo-api-key".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Synchronizer pacing and schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of pages fetched by a full refresh
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// Assets per page (upstream limit 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Delay between page requests in milliseconds
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,
    /// Ids per price request (upstream limit 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between batch requests in milliseconds
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
    /// Period of the full refresh in seconds
    #[serde(default = "default_full_refresh_interval")]
    pub full_refresh_interval_seconds: u64,
    /// Period of the price-only refresh in seconds
    #[serde(default = "default_price_refresh_interval")]
    pub price_refresh_interval_seconds: u64,
}

impl SyncConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn full_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.full_refresh_interval_seconds)
    }

    pub fn price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.price_refresh_interval_seconds)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay(),
            full_refresh_interval_seconds: default_full_refresh_interval(),
            price_refresh_interval_seconds: default_price_refresh_interval(),
        }
    }
}

fn default_pages() -> u32 {
    5
}

fn default_page_size() -> u32 {
    100
}

fn default_page_delay() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_delay() -> u64 {
    20_000
}

fn default_full_refresh_interval() -> u64 {
    86_400
}

fn default_price_refresh_interval() -> u64 {
    600
}

/// Event bus sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Number of ordered partitions
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    /// Buffered events per partition
    #[serde(default = "default_partition_capacity")]
    pub partition_capacity: usize,
    /// Buffered events per live session
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            partition_capacity: default_partition_capacity(),
            session_buffer: default_session_buffer(),
        }
    }
}

fn default_partitions() -> usize {
    4
}

fn default_partition_capacity() -> usize {
    1024
}

fn default_session_buffer() -> usize {
    64
}

/// WebSocket gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8090".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    30
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Run a full refresh immediately at startup
    #[serde(default)]
    pub full_refresh_on_start: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            full_refresh_on_start: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
