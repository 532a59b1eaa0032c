//! In-memory stores

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AlertStore, AssetStore, UserDirectory, WatchlistStore};
use crate::alerts::types::{AlertKind, AlertRule, AlertStatus, NewAlert};
use crate::common::errors::Result;
use crate::common::types::{AssetRecord, PriceSnapshot, UserRef};
use crate::watchlist::types::WatchEntry;

/// Asset snapshots keyed by id
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, AssetRecord>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn get(&self, id: &str) -> Result<Option<AssetRecord>> {
        Ok(self.assets.read().await.get(id).cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<AssetRecord>> {
        let assets = self.assets.read().await;
        Ok(ids.iter().filter_map(|id| assets.get(id).cloned()).collect())
    }

    async fn upsert_many(&self, records: Vec<AssetRecord>) -> Result<usize> {
        let mut assets = self.assets.write().await;
        let count = records.len();
        for record in records {
            assets.insert(record.id.clone(), record);
        }
        Ok(count)
    }

    async fn apply_price_updates(&self, snapshots: &[PriceSnapshot]) -> Result<Vec<AssetRecord>> {
        let mut assets = self.assets.write().await;
        let mut updated = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            if let Some(record) = assets.get_mut(&snapshot.id) {
                record.apply_price(snapshot);
                updated.push(record.clone());
            }
        }
        Ok(updated)
    }

    async fn active_ids(&self) -> Result<Vec<String>> {
        let assets = self.assets.read().await;
        let mut ids: Vec<String> = assets
            .values()
            .filter(|a| a.active)
            .map(|a| a.id.clone())
            .collect();
        // rank order keeps batches stable between cycles
        ids.sort_by_key(|id| {
            let rank = assets.get(id).and_then(|a| a.market_cap_rank);
            (rank.unwrap_or(i32::MAX), id.clone())
        });
        Ok(ids)
    }

    async fn delete_inactive(&self) -> Result<u64> {
        let mut assets = self.assets.write().await;
        let before = assets.len();
        assets.retain(|_, a| a.active);
        Ok((before - assets.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct AlertTable {
    rows: HashMap<i64, AlertRule>,
    next_id: i64,
}

impl AlertTable {
    fn user_rows(&self, user_id: i64) -> impl Iterator<Item = &AlertRule> {
        self.rows.values().filter(move |a| a.user_id == user_id)
    }
}

fn newest_first(mut alerts: Vec<AlertRule>) -> Vec<AlertRule> {
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    alerts
}

/// Alert rules keyed by id. Every read-modify-write happens under one write
/// guard, which gives the same atomicity the SQL store gets from conditional
/// updates.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    table: RwLock<AlertTable>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn find_by_id_and_user(&self, id: i64, user_id: i64) -> Result<Option<AlertRule>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertRule>> {
        let table = self.table.read().await;
        let alerts = table
            .user_rows(user_id)
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        Ok(newest_first(alerts))
    }

    async fn find_by_user_and_asset(&self, user_id: i64, asset_id: &str) -> Result<Vec<AlertRule>> {
        let table = self.table.read().await;
        let alerts = table
            .user_rows(user_id)
            .filter(|a| a.asset_id == asset_id)
            .cloned()
            .collect();
        Ok(newest_first(alerts))
    }

    async fn find_active_for_asset(&self, asset_id: &str) -> Result<Vec<AlertRule>> {
        let table = self.table.read().await;
        let mut alerts: Vec<AlertRule> = table
            .rows
            .values()
            .filter(|a| a.asset_id == asset_id && a.status == AlertStatus::Active)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.id);
        Ok(alerts)
    }

    async fn exists_with_status(
        &self,
        user_id: i64,
        asset_id: &str,
        kind: AlertKind,
        status: AlertStatus,
    ) -> Result<bool> {
        let table = self.table.read().await;
        let exists = table
            .user_rows(user_id)
            .any(|a| a.asset_id == asset_id && a.kind == kind && a.status == status);
        Ok(exists)
    }

    async fn upsert_active(&self, alert: NewAlert) -> Result<AlertRule> {
        let mut table = self.table.write().await;
        let now = Utc::now();

        let existing = table.rows.values_mut().find(|a| {
            a.user_id == alert.user_id
                && a.asset_id == alert.asset_id
                && a.kind == alert.kind
                && a.status == AlertStatus::Active
        });

        if let Some(row) = existing {
            row.threshold = alert.threshold;
            row.initial_price = alert.initial_price;
            row.updated_at = now;
            return Ok(row.clone());
        }

        table.next_id += 1;
        let row = AlertRule {
            id: table.next_id,
            user_id: alert.user_id,
            asset_id: alert.asset_id,
            kind: alert.kind,
            threshold: alert.threshold,
            initial_price: alert.initial_price,
            last_checked_price: None,
            status: AlertStatus::Active,
            triggered_at: None,
            triggered_price: None,
            message: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn record_checked_price(&self, ids: &[i64], price: Decimal) -> Result<()> {
        let mut table = self.table.write().await;
        for id in ids {
            if let Some(row) = table.rows.get_mut(id) {
                row.last_checked_price = Some(price);
            }
        }
        Ok(())
    }

    async fn commit_triggered(&self, alerts: &[AlertRule]) -> Result<Vec<AlertRule>> {
        let mut table = self.table.write().await;
        let mut committed = Vec::with_capacity(alerts.len());
        for alert in alerts {
            match table.rows.get_mut(&alert.id) {
                Some(row) if row.status == AlertStatus::Active && row.same_rule(alert) => {
                    row.status = AlertStatus::Triggered;
                    row.triggered_at = alert.triggered_at;
                    row.triggered_price = alert.triggered_price;
                    row.last_checked_price = alert.last_checked_price;
                    row.message = alert.message.clone();
                    row.updated_at = alert.updated_at;
                    committed.push(row.clone());
                }
                _ => {}
            }
        }
        Ok(committed)
    }

    async fn transition(
        &self,
        id: i64,
        user_id: i64,
        from: AlertStatus,
        to: AlertStatus,
    ) -> Result<Option<AlertRule>> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(row) if row.user_id == user_id && row.status == from => {
                row.status = to;
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_all(&self, user_id: i64, from: AlertStatus, to: AlertStatus) -> Result<u64> {
        let mut table = self.table.write().await;
        let now = Utc::now();
        let mut count = 0;
        for row in table.rows.values_mut() {
            if row.user_id == user_id && row.status == from {
                row.status = to;
                row.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_if_status(
        &self,
        id: i64,
        user_id: i64,
        allowed: &[AlertStatus],
    ) -> Result<bool> {
        let mut table = self.table.write().await;
        let deletable = table
            .rows
            .get(&id)
            .map_or(false, |a| a.user_id == user_id && allowed.contains(&a.status));
        if deletable {
            table.rows.remove(&id);
        }
        Ok(deletable)
    }

    async fn delete_all(&self, user_id: i64, status: AlertStatus) -> Result<u64> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table
            .rows
            .retain(|_, a| !(a.user_id == user_id && a.status == status));
        Ok((before - table.rows.len()) as u64)
    }
}

/// Fixed set of users, registered up front
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<i64, UserRef>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserRef) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: i64) -> Result<Option<UserRef>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[derive(Debug, Default)]
struct WatchTable {
    rows: Vec<WatchEntry>,
    next_id: i64,
}

/// Watchlist entries in insertion order
#[derive(Debug, Default)]
pub struct InMemoryWatchlistStore {
    table: RwLock<WatchTable>,
}

impl InMemoryWatchlistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatchlistStore for InMemoryWatchlistStore {
    async fn insert(&self, user_id: i64, asset_id: &str) -> Result<Option<WatchEntry>> {
        let mut table = self.table.write().await;
        if table
            .rows
            .iter()
            .any(|e| e.user_id == user_id && e.asset_id == asset_id)
        {
            return Ok(None);
        }
        table.next_id += 1;
        let entry = WatchEntry {
            id: table.next_id,
            user_id,
            asset_id: asset_id.to_string(),
            added_at: Utc::now(),
        };
        table.rows.push(entry.clone());
        Ok(Some(entry))
    }

    async fn remove(&self, user_id: i64, asset_id: &str) -> Result<bool> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table
            .rows
            .retain(|e| !(e.user_id == user_id && e.asset_id == asset_id));
        Ok(table.rows.len() < before)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<WatchEntry>> {
        let table = self.table.read().await;
        let entries = table
            .rows
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        Ok(entries)
    }

    async fn count_by_user(&self, user_id: i64) -> Result<u64> {
        let table = self.table.read().await;
        let count = table.rows.iter().filter(|e| e.user_id == user_id).count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_alert(user_id: i64, kind: AlertKind, threshold: Decimal) -> NewAlert {
        NewAlert {
            user_id,
            asset_id: "bitcoin".to_string(),
            kind,
            threshold,
            initial_price: Some(dec!(50000)),
        }
    }

    #[tokio::test]
    async fn test_upsert_active_updates_in_place() {
        let store = InMemoryAlertStore::new();
        let first = store
            .upsert_active(new_alert(1, AlertKind::PriceAbove, dec!(60000)))
            .await
            .unwrap();
        let second = store
            .upsert_active(new_alert(1, AlertKind::PriceAbove, dec!(65000)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.threshold, dec!(65000));
        assert_eq!(store.len().await, 1);

        // a different kind is a different row
        store
            .upsert_active(new_alert(1, AlertKind::PriceBelow, dec!(40000)))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_commit_triggered_skips_rows_no_longer_active() {
        let store = InMemoryAlertStore::new();
        let alert = store
            .upsert_active(new_alert(1, AlertKind::PriceAbove, dec!(60000)))
            .await
            .unwrap();

        let mut triggered = alert.clone();
        triggered.mark_triggered(dec!(61000), Utc::now(), "hit".to_string());

        let first = store.commit_triggered(&[triggered.clone()]).await.unwrap();
        let second = store.commit_triggered(&[triggered]).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, AlertStatus::Triggered);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_commit_triggered_skips_retargeted_rows() {
        let store = InMemoryAlertStore::new();
        let alert = store
            .upsert_active(new_alert(1, AlertKind::PriceAbove, dec!(60000)))
            .await
            .unwrap();

        let mut stale = alert.clone();
        stale.mark_triggered(dec!(61000), Utc::now(), "hit".to_string());
        store
            .upsert_active(new_alert(1, AlertKind::PriceAbove, dec!(70000)))
            .await
            .unwrap();

        assert!(store.commit_triggered(&[stale]).await.unwrap().is_empty());
        let stored = store.find_by_id_and_user(alert.id, 1).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Active);
        assert_eq!(stored.threshold, dec!(70000));
    }

    #[tokio::test]
    async fn test_exists_with_status() {
        let store = InMemoryAlertStore::new();
        let alert = store
            .upsert_active(new_alert(1, AlertKind::PriceBelow, dec!(40000)))
            .await
            .unwrap();

        assert!(store
            .exists_with_status(1, "bitcoin", AlertKind::PriceBelow, AlertStatus::Active)
            .await
            .unwrap());
        assert!(!store
            .exists_with_status(1, "bitcoin", AlertKind::PriceAbove, AlertStatus::Active)
            .await
            .unwrap());
        assert!(!store
            .exists_with_status(2, "bitcoin", AlertKind::PriceBelow, AlertStatus::Active)
            .await
            .unwrap());

        store
            .transition(alert.id, 1, AlertStatus::Active, AlertStatus::Triggered)
            .await
            .unwrap();
        assert!(!store
            .exists_with_status(1, "bitcoin", AlertKind::PriceBelow, AlertStatus::Active)
            .await
            .unwrap());
        assert!(store
            .exists_with_status(1, "bitcoin", AlertKind::PriceBelow, AlertStatus::Triggered)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_inactive_assets() {
        let store = InMemoryAssetStore::new();
        let mut stale = AssetRecord::new("dead", "ded", "Dead Coin");
        stale.active = false;
        store
            .upsert_many(vec![AssetRecord::new("bitcoin", "btc", "Bitcoin"), stale])
            .await
            .unwrap();

        assert_eq!(store.delete_inactive().await.unwrap(), 1);
        assert_eq!(store.active_ids().await.unwrap(), vec!["bitcoin".to_string()]);
    }
}
