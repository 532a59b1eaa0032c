use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::types::WatchedAsset;
use crate::common::errors::{RadarError, Result};
use crate::store::{AssetStore, UserDirectory, WatchlistStore};

/// User-facing watchlist operations
pub struct WatchlistManager {
    watchlist: Arc<dyn WatchlistStore>,
    assets: Arc<dyn AssetStore>,
    users: Arc<dyn UserDirectory>,
}

impl WatchlistManager {
    pub fn new(
        watchlist: Arc<dyn WatchlistStore>,
        assets: Arc<dyn AssetStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            watchlist,
            assets,
            users,
        }
    }

    /// Start tracking an asset. It must exist and must not be tracked yet.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: i64, asset_id: &str) -> Result<WatchedAsset> {
        let asset_id = asset_id.trim();
        if asset_id.is_empty() {
            return Err(RadarError::validation("asset id must not be empty"));
        }

        let asset = self
            .assets
            .get(asset_id)
            .await?
            .ok_or_else(|| RadarError::not_found("asset", asset_id))?;

        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| RadarError::not_found("user", user_id))?;

        let entry = self
            .watchlist
            .insert(user_id, asset_id)
            .await?
            .ok_or_else(|| {
                RadarError::InvalidState(format!("{} is already on the watchlist", asset.name))
            })?;

        info!("User {} is now tracking {}", user_id, asset.name);
        Ok(WatchedAsset::new(entry, Some(&asset)))
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: i64, asset_id: &str) -> Result<()> {
        if !self.watchlist.remove(user_id, asset_id).await? {
            return Err(RadarError::not_found("watchlist entry", asset_id));
        }
        info!("User {} stopped tracking {}", user_id, asset_id);
        Ok(())
    }

    /// Tracked assets by market cap rank, unranked last
    pub async fn list(&self, user_id: i64) -> Result<Vec<WatchedAsset>> {
        let entries = self.watchlist.find_by_user(user_id).await?;
        let ids: Vec<String> = entries.iter().map(|e| e.asset_id.clone()).collect();
        let assets: HashMap<String, _> = self
            .assets
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|asset| (asset.id.clone(), asset))
            .collect();

        let mut watched: Vec<WatchedAsset> = entries
            .into_iter()
            .map(|entry| {
                let asset = assets.get(&entry.asset_id);
                WatchedAsset::new(entry, asset)
            })
            .collect();
        watched.sort_by(|a, b| {
            let rank = |w: &WatchedAsset| w.market_cap_rank.unwrap_or(i32::MAX);
            rank(a)
                .cmp(&rank(b))
                .then_with(|| a.entry.asset_id.cmp(&b.entry.asset_id))
        });
        debug!("User {} tracks {} assets", user_id, watched.len());
        Ok(watched)
    }

    pub async fn count(&self, user_id: i64) -> Result<u64> {
        self.watchlist.count_by_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::ErrorKind;
    use crate::common::types::{AssetRecord, UserRef};
    use crate::store::{InMemoryAssetStore, InMemoryUserDirectory, InMemoryWatchlistStore};
    use rust_decimal_macros::dec;

    fn ranked(id: &str, name: &str, rank: Option<i32>) -> AssetRecord {
        let mut asset = AssetRecord::new(id, id, name).with_price(dec!(10));
        asset.market_cap_rank = rank;
        asset
    }

    async fn manager() -> (WatchlistManager, Arc<InMemoryAssetStore>) {
        let assets = Arc::new(InMemoryAssetStore::new());
        assets
            .upsert_many(vec![
                ranked("bitcoin", "Bitcoin", Some(1)),
                ranked("ethereum", "Ethereum", Some(2)),
                ranked("dogecoin", "Dogecoin", Some(9)),
                ranked("obscure", "Obscure", None),
            ])
            .await
            .unwrap();
        let users = Arc::new(InMemoryUserDirectory::new());
        users.insert(UserRef::new(1, "alice")).await;
        let manager = WatchlistManager::new(
            Arc::new(InMemoryWatchlistStore::new()),
            assets.clone(),
            users,
        );
        (manager, assets)
    }

    #[tokio::test]
    async fn test_add_requires_known_asset_and_user() {
        let (manager, _) = manager().await;

        let err = manager.add(1, "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("asset"));

        let err = manager.add(2, "bitcoin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("user"));

        let err = manager.add(1, "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(manager.count(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_add_is_rejected() {
        let (manager, _) = manager().await;
        let watched = manager.add(1, "bitcoin").await.unwrap();
        assert_eq!(watched.asset_name, "Bitcoin");
        assert_eq!(watched.current_price, Some(dec!(10)));

        let err = manager.add(1, "bitcoin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(manager.count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_orders_by_rank() {
        let (manager, _) = manager().await;
        for id in ["obscure", "dogecoin", "bitcoin", "ethereum"] {
            manager.add(1, id).await.unwrap();
        }

        let ids: Vec<String> = manager
            .list(1)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.entry.asset_id)
            .collect();
        assert_eq!(ids, vec!["bitcoin", "ethereum", "dogecoin", "obscure"]);
        assert!(manager.list(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let (manager, _) = manager().await;
        manager.add(1, "ethereum").await.unwrap();

        manager.remove(1, "ethereum").await.unwrap();
        assert_eq!(manager.count(1).await.unwrap(), 0);

        let err = manager.remove(1, "ethereum").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_purged_asset_stays_listed_without_market_data() {
        let (manager, assets) = manager().await;
        manager.add(1, "dogecoin").await.unwrap();
        manager.add(1, "bitcoin").await.unwrap();

        let mut gone = ranked("dogecoin", "Dogecoin", Some(9));
        gone.active = false;
        assets.upsert_many(vec![gone]).await.unwrap();
        assets.delete_inactive().await.unwrap();

        let listed = manager.list(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].entry.asset_id, "bitcoin");
        assert_eq!(listed[1].asset_name, "dogecoin");
        assert_eq!(listed[1].current_price, None);
    }
}
