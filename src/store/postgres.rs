//! PostgreSQL stores backed by `sqlx`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{info, instrument};

use super::{AlertStore, AssetStore, UserDirectory, WatchlistStore};
use crate::alerts::types::{AlertKind, AlertRule, AlertStatus, NewAlert};
use crate::common::errors::{RadarError, Result};
use crate::common::types::{AssetRecord, PriceSnapshot, UserRef};
use crate::config::types::DatabaseConfig;
use crate::watchlist::types::WatchEntry;

/// Rows per multi-row INSERT, well under the bind parameter limit
const UPSERT_CHUNK: usize = 500;

/// Open a pool and bring the schema up to date
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .connect(&config.url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready ({} max connections)", config.max_connections);
    Ok(pool)
}

// ============================================================================
// Assets
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgAssetStore {
    pool: PgPool,
}

impl PgAssetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStore for PgAssetStore {
    async fn get(&self, id: &str) -> Result<Option<AssetRecord>> {
        let record = sqlx::query_as::<_, AssetRecord>("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<AssetRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, AssetRecord>("SELECT * FROM assets WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert_many(&self, records: Vec<AssetRecord>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(UPSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO assets (id, symbol, name, image_url, market_cap_rank, active, \
                 current_price, price_change_24h, price_change_percentage_24h, \
                 price_change_percentage_1h, price_change_percentage_7d, \
                 price_change_percentage_30d, market_cap, total_volume, high_24h, low_24h, \
                 ath, ath_change_percentage, ath_date, atl, atl_change_percentage, atl_date, \
                 circulating_supply, sparkline, last_updated) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.id.clone())
                    .push_bind(r.symbol.clone())
                    .push_bind(r.name.clone())
                    .push_bind(r.image_url.clone())
                    .push_bind(r.market_cap_rank)
                    .push_bind(r.active)
                    .push_bind(r.current_price)
                    .push_bind(r.price_change_24h)
                    .push_bind(r.price_change_percentage_24h)
                    .push_bind(r.price_change_percentage_1h)
                    .push_bind(r.price_change_percentage_7d)
                    .push_bind(r.price_change_percentage_30d)
                    .push_bind(r.market_cap)
                    .push_bind(r.total_volume)
                    .push_bind(r.high_24h)
                    .push_bind(r.low_24h)
                    .push_bind(r.ath)
                    .push_bind(r.ath_change_percentage)
                    .push_bind(r.ath_date)
                    .push_bind(r.atl)
                    .push_bind(r.atl_change_percentage)
                    .push_bind(r.atl_date)
                    .push_bind(r.circulating_supply)
                    .push_bind(r.sparkline.clone())
                    .push_bind(r.last_updated);
            });
            qb.push(
                " ON CONFLICT (id) DO UPDATE SET \
                 symbol = EXCLUDED.symbol, name = EXCLUDED.name, image_url = EXCLUDED.image_url, \
                 market_cap_rank = EXCLUDED.market_cap_rank, active = EXCLUDED.active, \
                 current_price = EXCLUDED.current_price, \
                 price_change_24h = EXCLUDED.price_change_24h, \
                 price_change_percentage_24h = EXCLUDED.price_change_percentage_24h, \
                 price_change_percentage_1h = EXCLUDED.price_change_percentage_1h, \
                 price_change_percentage_7d = EXCLUDED.price_change_percentage_7d, \
                 price_change_percentage_30d = EXCLUDED.price_change_percentage_30d, \
                 market_cap = EXCLUDED.market_cap, total_volume = EXCLUDED.total_volume, \
                 high_24h = EXCLUDED.high_24h, low_24h = EXCLUDED.low_24h, ath = EXCLUDED.ath, \
                 ath_change_percentage = EXCLUDED.ath_change_percentage, \
                 ath_date = EXCLUDED.ath_date, atl = EXCLUDED.atl, \
                 atl_change_percentage = EXCLUDED.atl_change_percentage, \
                 atl_date = EXCLUDED.atl_date, circulating_supply = EXCLUDED.circulating_supply, \
                 sparkline = EXCLUDED.sparkline, last_updated = EXCLUDED.last_updated",
            );
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    #[instrument(skip(self, snapshots), fields(count = snapshots.len()))]
    async fn apply_price_updates(&self, snapshots: &[PriceSnapshot]) -> Result<Vec<AssetRecord>> {
        let mut tx = self.pool.begin().await?;
        let mut updated = Vec::with_capacity(snapshots.len());

        for s in snapshots {
            let row = sqlx::query_as::<_, AssetRecord>(
                "UPDATE assets SET current_price = $2, price_change_24h = $3, \
                 price_change_percentage_24h = $4, price_change_percentage_1h = $5, \
                 price_change_percentage_7d = $6, price_change_percentage_30d = $7, \
                 market_cap = $8, total_volume = $9, high_24h = $10, low_24h = $11, ath = $12, \
                 ath_change_percentage = $13, ath_date = $14, sparkline = $15, \
                 last_updated = $16 \
                 WHERE id = $1 RETURNING *",
            )
            .bind(&s.id)
            .bind(s.current_price)
            .bind(s.price_change_24h)
            .bind(s.price_change_percentage_24h)
            .bind(s.price_change_percentage_1h)
            .bind(s.price_change_percentage_7d)
            .bind(s.price_change_percentage_30d)
            .bind(s.market_cap)
            .bind(s.total_volume)
            .bind(s.high_24h)
            .bind(s.low_24h)
            .bind(s.ath)
            .bind(s.ath_change_percentage)
            .bind(s.ath_date)
            .bind(&s.sparkline)
            .bind(s.last_updated)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(record) = row {
                updated.push(record);
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn active_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM assets WHERE active ORDER BY market_cap_rank NULLS LAST, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_inactive(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM assets WHERE NOT active")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    user_id: i64,
    asset_id: String,
    kind: String,
    status: String,
    threshold: Decimal,
    initial_price: Option<Decimal>,
    last_checked_price: Option<Decimal>,
    triggered_at: Option<DateTime<Utc>>,
    triggered_price: Option<Decimal>,
    message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for AlertRule {
    type Error = RadarError;

    fn try_from(row: AlertRow) -> Result<Self> {
        Ok(AlertRule {
            id: row.id,
            user_id: row.user_id,
            asset_id: row.asset_id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            threshold: row.threshold,
            initial_price: row.initial_price,
            last_checked_price: row.last_checked_price,
            triggered_at: row.triggered_at,
            triggered_price: row.triggered_price,
            message: row.message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_rules(rows: Vec<AlertRow>) -> Result<Vec<AlertRule>> {
    rows.into_iter().map(AlertRule::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn find_by_id_and_user(&self, id: i64, user_id: i64) -> Result<Option<AlertRule>> {
        let row = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM price_alerts WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AlertRule::try_from).transpose()
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        status: Option<AlertStatus>,
    ) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM price_alerts \
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn find_by_user_and_asset(&self, user_id: i64, asset_id: &str) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM price_alerts WHERE user_id = $1 AND asset_id = $2 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn find_active_for_asset(&self, asset_id: &str) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM price_alerts WHERE asset_id = $1 AND status = 'ACTIVE' ORDER BY id",
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn exists_with_status(
        &self,
        user_id: i64,
        asset_id: &str,
        kind: AlertKind,
        status: AlertStatus,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM price_alerts \
             WHERE user_id = $1 AND asset_id = $2 AND kind = $3 AND status = $4)",
        )
        .bind(user_id)
        .bind(asset_id)
        .bind(kind.as_str())
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn upsert_active(&self, alert: NewAlert) -> Result<AlertRule> {
        let row = sqlx::query_as::<_, AlertRow>(
            "INSERT INTO price_alerts (user_id, asset_id, kind, threshold, initial_price, status) \
             VALUES ($1, $2, $3, $4, $5, 'ACTIVE') \
             ON CONFLICT (user_id, asset_id, kind) WHERE status = 'ACTIVE' \
             DO UPDATE SET threshold = EXCLUDED.threshold, \
                           initial_price = EXCLUDED.initial_price, \
                           updated_at = now() \
             RETURNING *",
        )
        .bind(alert.user_id)
        .bind(&alert.asset_id)
        .bind(alert.kind.as_str())
        .bind(alert.threshold)
        .bind(alert.initial_price)
        .fetch_one(&self.pool)
        .await?;
        AlertRule::try_from(row)
    }

    async fn record_checked_price(&self, ids: &[i64], price: Decimal) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE price_alerts SET last_checked_price = $2 WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .bind(price)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    async fn commit_triggered(&self, alerts: &[AlertRule]) -> Result<Vec<AlertRule>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(alerts.len());
        let mut thresholds = Vec::with_capacity(alerts.len());
        let mut initial_prices = Vec::with_capacity(alerts.len());
        let mut prices = Vec::with_capacity(alerts.len());
        let mut messages = Vec::with_capacity(alerts.len());
        let mut triggered_at = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let (Some(price), Some(at)) = (alert.triggered_price, alert.triggered_at) else {
                return Err(RadarError::Internal(format!(
                    "alert {} has no trigger data",
                    alert.id
                )));
            };
            ids.push(alert.id);
            thresholds.push(alert.threshold);
            initial_prices.push(alert.initial_price);
            prices.push(price);
            messages.push(alert.message.clone().unwrap_or_default());
            triggered_at.push(at);
        }

        // status makes a concurrent second trigger a no-op; threshold and
        // initial price make an in-place retarget win over a stale evaluation
        let rows = sqlx::query_as::<_, AlertRow>(
            "UPDATE price_alerts AS a \
             SET status = 'TRIGGERED', triggered_at = v.triggered_at, \
                 triggered_price = v.price, last_checked_price = v.price, \
                 message = v.message, updated_at = v.triggered_at \
             FROM UNNEST($1::bigint[], $2::numeric[], $3::numeric[], $4::numeric[], \
                         $5::text[], $6::timestamptz[]) \
                  AS v(id, threshold, initial_price, price, message, triggered_at) \
             WHERE a.id = v.id AND a.status = 'ACTIVE' \
               AND a.threshold = v.threshold \
               AND a.initial_price IS NOT DISTINCT FROM v.initial_price \
             RETURNING a.*",
        )
        .bind(ids)
        .bind(thresholds)
        .bind(initial_prices)
        .bind(prices)
        .bind(messages)
        .bind(triggered_at)
        .fetch_all(&self.pool)
        .await?;
        into_rules(rows)
    }

    async fn transition(
        &self,
        id: i64,
        user_id: i64,
        from: AlertStatus,
        to: AlertStatus,
    ) -> Result<Option<AlertRule>> {
        let row = sqlx::query_as::<_, AlertRow>(
            "UPDATE price_alerts SET status = $4, updated_at = now() \
             WHERE id = $1 AND user_id = $2 AND status = $3 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AlertRule::try_from).transpose()
    }

    async fn transition_all(&self, user_id: i64, from: AlertStatus, to: AlertStatus) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE price_alerts SET status = $3, updated_at = now() \
             WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_if_status(
        &self,
        id: i64,
        user_id: i64,
        allowed: &[AlertStatus],
    ) -> Result<bool> {
        let statuses: Vec<String> = allowed.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            "DELETE FROM price_alerts WHERE id = $1 AND user_id = $2 AND status = ANY($3)",
        )
        .bind(id)
        .bind(user_id)
        .bind(statuses)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self, user_id: i64, status: AlertStatus) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_alerts WHERE user_id = $1 AND status = $2")
            .bind(user_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, id: i64) -> Result<Option<UserRef>> {
        let user = sqlx::query_as::<_, UserRef>("SELECT id, username FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

// ============================================================================
// Watchlists
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgWatchlistStore {
    pool: PgPool,
}

impl PgWatchlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatchlistStore for PgWatchlistStore {
    async fn insert(&self, user_id: i64, asset_id: &str) -> Result<Option<WatchEntry>> {
        let entry = sqlx::query_as::<_, WatchEntry>(
            "INSERT INTO watched_assets (user_id, asset_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, asset_id) DO NOTHING \
             RETURNING id, user_id, asset_id, added_at",
        )
        .bind(user_id)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn remove(&self, user_id: i64, asset_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM watched_assets WHERE user_id = $1 AND asset_id = $2")
            .bind(user_id)
            .bind(asset_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<WatchEntry>> {
        let entries = sqlx::query_as::<_, WatchEntry>(
            "SELECT id, user_id, asset_id, added_at FROM watched_assets \
             WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn count_by_user(&self, user_id: i64) -> Result<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM watched_assets WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
