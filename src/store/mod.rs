//! Persistence seams for assets, alerts and users
//!
//! The synchronizer, evaluation engine and lifecycle manager only talk to
//! these traits, as does the watchlist manager. Two backends are provided:
//!
//! - [`memory`]: `tokio::sync::RwLock<HashMap>` stores, used in tests and
//!   when no database is configured
//! - [`postgres`]: `sqlx` stores with embedded migrations
//!
//! [`cache::CachedAssetStore`] can sit in front of either asset store.

pub mod cache;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::alerts::types::{AlertKind, AlertRule, AlertStatus, NewAlert};
use crate::common::errors::Result;
use crate::common::types::{AssetRecord, PriceSnapshot, UserRef};
use crate::watchlist::types::WatchEntry;

pub use cache::CachedAssetStore;
pub use memory::{
    InMemoryAlertStore, InMemoryAssetStore, InMemoryUserDirectory, InMemoryWatchlistStore,
};
pub use postgres::{PgAlertStore, PgAssetStore, PgUserDirectory, PgWatchlistStore};

/// Keyed store of asset snapshots
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<AssetRecord>>;

    /// Bulk point lookup; unknown ids are absent from the result
    async fn get_many(&self, ids: &[String]) -> Result<Vec<AssetRecord>>;

    /// Insert or fully replace each record. Returns the number written.
    async fn upsert_many(&self, records: Vec<AssetRecord>) -> Result<usize>;

    /// Overlay price fields on existing rows. Snapshots for unknown ids are
    /// ignored. Returns the rows that were updated.
    async fn apply_price_updates(&self, snapshots: &[PriceSnapshot]) -> Result<Vec<AssetRecord>>;

    async fn active_ids(&self) -> Result<Vec<String>>;

    /// Remove every inactive record, returning how many were removed
    async fn delete_inactive(&self) -> Result<u64>;
}

/// Store of alert rules
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_by_id_and_user(&self, id: i64, user_id: i64) -> Result<Option<AlertRule>>;

    /// Alerts of one user, newest first. `None` returns every status.
    async fn find_by_user(&self, user_id: i64, status: Option<AlertStatus>)
        -> Result<Vec<AlertRule>>;

    async fn find_by_user_and_asset(&self, user_id: i64, asset_id: &str) -> Result<Vec<AlertRule>>;

    async fn find_active_for_asset(&self, asset_id: &str) -> Result<Vec<AlertRule>>;

    async fn exists_with_status(
        &self,
        user_id: i64,
        asset_id: &str,
        kind: AlertKind,
        status: AlertStatus,
    ) -> Result<bool>;

    /// Create the Active alert for (user, asset, kind), or update the existing
    /// one's threshold and initial price in place. One conditional operation.
    async fn upsert_active(&self, alert: NewAlert) -> Result<AlertRule>;

    /// Record the last observed price on the given alerts
    async fn record_checked_price(&self, ids: &[i64], price: Decimal) -> Result<()>;

    /// Persist Active -> Triggered transitions in one write. A row that is no
    /// longer Active, or whose threshold or initial price no longer match the
    /// evaluated copy, is left untouched and omitted from the result.
    async fn commit_triggered(&self, alerts: &[AlertRule]) -> Result<Vec<AlertRule>>;

    /// Move one alert from `from` to `to`. Returns the updated row, or `None`
    /// if it was not in `from`.
    async fn transition(
        &self,
        id: i64,
        user_id: i64,
        from: AlertStatus,
        to: AlertStatus,
    ) -> Result<Option<AlertRule>>;

    /// Move every alert of a user from `from` to `to`, returning the count
    async fn transition_all(&self, user_id: i64, from: AlertStatus, to: AlertStatus) -> Result<u64>;

    /// Delete one alert if its status is one of `allowed`
    async fn delete_if_status(&self, id: i64, user_id: i64, allowed: &[AlertStatus])
        -> Result<bool>;

    /// Delete every alert of a user in `status`, returning the count
    async fn delete_all(&self, user_id: i64, status: AlertStatus) -> Result<u64>;
}

/// Lookup of registered users. Registration itself lives elsewhere.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<UserRef>>;
}

/// Per-user tracked assets, at most one entry per (user, asset)
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Add an entry. `None` if the user already tracks the asset.
    async fn insert(&self, user_id: i64, asset_id: &str) -> Result<Option<WatchEntry>>;

    /// Remove an entry, returning whether one existed
    async fn remove(&self, user_id: i64, asset_id: &str) -> Result<bool>;

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<WatchEntry>>;

    async fn count_by_user(&self, user_id: i64) -> Result<u64>;
}
