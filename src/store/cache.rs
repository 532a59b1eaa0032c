//! Read-through cache in front of an asset store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::AssetStore;
use crate::common::errors::Result;
use crate::common::types::{AssetRecord, PriceSnapshot};

/// Caches point lookups. Writes go straight to the inner store and evict the
/// touched keys; refresh cycles call [`CachedAssetStore::invalidate_all`] when
/// they start, so a skipped page never leaves stale rows cached.
pub struct CachedAssetStore {
    inner: Arc<dyn AssetStore>,
    entries: RwLock<HashMap<String, AssetRecord>>,
    /// Bumped under the entries write lock on every eviction. A miss only
    /// caches what it loaded if no eviction happened since the load began.
    generation: AtomicU64,
}

impl CachedAssetStore {
    pub fn new(inner: Arc<dyn AssetStore>) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let evicted = entries.len();
        entries.clear();
        debug!("Asset cache cleared ({} entries)", evicted);
    }

    pub async fn cached_len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn evict<'a>(&self, ids: impl Iterator<Item = &'a str>) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        for id in ids {
            entries.remove(id);
        }
    }
}

#[async_trait]
impl AssetStore for CachedAssetStore {
    async fn get(&self, id: &str) -> Result<Option<AssetRecord>> {
        if let Some(hit) = self.entries.read().await.get(id) {
            return Ok(Some(hit.clone()));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let loaded = self.inner.get(id).await?;
        if let Some(record) = &loaded {
            let mut entries = self.entries.write().await;
            if self.generation.load(Ordering::Acquire) == generation {
                entries.insert(record.id.clone(), record.clone());
            } else {
                debug!("Not caching {}: evicted while loading", id);
            }
        }
        Ok(loaded)
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<AssetRecord>> {
        self.inner.get_many(ids).await
    }

    async fn upsert_many(&self, records: Vec<AssetRecord>) -> Result<usize> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let written = self.inner.upsert_many(records).await?;
        self.evict(ids.iter().map(String::as_str)).await;
        Ok(written)
    }

    async fn apply_price_updates(&self, snapshots: &[PriceSnapshot]) -> Result<Vec<AssetRecord>> {
        let updated = self.inner.apply_price_updates(snapshots).await?;
        self.evict(updated.iter().map(|r| r.id.as_str())).await;
        Ok(updated)
    }

    async fn active_ids(&self) -> Result<Vec<String>> {
        self.inner.active_ids().await
    }

    async fn delete_inactive(&self) -> Result<u64> {
        let removed = self.inner.delete_inactive().await?;
        if removed > 0 {
            self.invalidate_all().await;
        }
        Ok(removed)
    }
}
