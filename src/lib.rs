//! CoinRadar Library
//!
//! Keeps a local snapshot of market data for a large set of crypto assets,
//! evaluates user price alerts against every refreshed price and pushes
//! triggered alerts to connected users in real time. Users can also keep a
//! watchlist of tracked assets.

pub mod alerts;
pub mod common;
pub mod config;
pub mod market_data;
pub mod notifications;
pub mod store;
pub mod sync;
pub mod watchlist;

// Re-export commonly used types
pub use alerts::{
    AlertEvaluator, AlertKind, AlertManager, AlertRequest, AlertRule, AlertStats, AlertStatus,
    AlertView,
};
pub use common::errors::{ErrorKind, RadarError, Result};
pub use common::traits::{AlertNotifier, MarketDataClient, PriceListener, UserChannel};
pub use common::types::{AssetRecord, PriceSnapshot, UserRef};
pub use config::types::AppConfig;
pub use market_data::MarketDataRestClient;
pub use notifications::{
    AlertGateway, EventBus, NotificationPublisher, NotificationRelay, SessionRegistry,
    TriggeredAlertEvent,
};
pub use store::{AlertStore, AssetStore, CachedAssetStore, UserDirectory, WatchlistStore};
pub use sync::{CycleKind, CycleSummary, MarketDataSynchronizer, SyncScheduler};
pub use watchlist::{WatchedAsset, WatchlistManager};
