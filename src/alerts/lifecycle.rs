//! Alert lifecycle: creation, read acknowledgement and deletion
//!
//! ```text
//! Active --(evaluation)--> Triggered --(mark read)--> Read
//!   |                                                  |
//!   +------------------- delete -----------------------+
//! ```
//!
//! Triggered alerts cannot be deleted until they are read.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::types::{AlertKind, AlertRequest, AlertRule, AlertStats, AlertStatus, AlertView, NewAlert};
use crate::common::errors::{RadarError, Result};
use crate::store::{AlertStore, AssetStore, UserDirectory};

/// Upper bound for absolute price targets
pub const MAX_PRICE_THRESHOLD: Decimal = dec!(1000000000);
/// Upper bound for percentage-up targets
pub const MAX_PERCENT_UP: Decimal = dec!(1000);
/// Lower bound for percentage-down targets
pub const MIN_PERCENT_DOWN: Decimal = dec!(-100);

/// Check a threshold against the current price for its kind
pub fn validate_threshold(kind: AlertKind, threshold: Decimal, current_price: Decimal) -> Result<()> {
    match kind {
        AlertKind::PriceAbove => {
            if threshold <= current_price {
                return Err(RadarError::validation(format!(
                    "price target {} must be above the current price {}",
                    threshold, current_price
                )));
            }
            if threshold > MAX_PRICE_THRESHOLD {
                return Err(RadarError::validation(format!(
                    "price target cannot exceed {}",
                    MAX_PRICE_THRESHOLD
                )));
            }
        }
        AlertKind::PriceBelow => {
            if threshold <= Decimal::ZERO {
                return Err(RadarError::validation("price target must be greater than 0"));
            }
            if threshold >= current_price {
                return Err(RadarError::validation(format!(
                    "price target {} must be below the current price {}",
                    threshold, current_price
                )));
            }
        }
        AlertKind::PercentUp => {
            if threshold <= Decimal::ZERO {
                return Err(RadarError::validation("percentage target must be positive"));
            }
            if threshold > MAX_PERCENT_UP {
                return Err(RadarError::validation(format!(
                    "percentage target cannot exceed {}%",
                    MAX_PERCENT_UP
                )));
            }
        }
        AlertKind::PercentDown => {
            if threshold >= Decimal::ZERO {
                return Err(RadarError::validation("percentage target must be negative"));
            }
            if threshold < MIN_PERCENT_DOWN {
                return Err(RadarError::validation(format!(
                    "percentage target cannot go below {}%",
                    MIN_PERCENT_DOWN
                )));
            }
        }
    }
    Ok(())
}

/// User-facing alert operations
pub struct AlertManager {
    alerts: Arc<dyn AlertStore>,
    assets: Arc<dyn AssetStore>,
    users: Arc<dyn UserDirectory>,
}

impl AlertManager {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        assets: Arc<dyn AssetStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            alerts,
            assets,
            users,
        }
    }

    /// Create the user's Active alert for (asset, kind), or retarget the
    /// existing one. Either way its reference price becomes the asset's
    /// current price.
    #[instrument(skip(self))]
    pub async fn create_or_update(&self, user_id: i64, request: AlertRequest) -> Result<AlertRule> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| RadarError::not_found("user", user_id))?;

        let asset = self
            .assets
            .get(&request.asset_id)
            .await?
            .ok_or_else(|| RadarError::not_found("asset", &request.asset_id))?;

        let current_price = asset.current_price.ok_or_else(|| {
            RadarError::validation(format!("{} has no current price yet", asset.name))
        })?;

        validate_threshold(request.kind, request.threshold, current_price)?;

        let alert = self
            .alerts
            .upsert_active(NewAlert {
                user_id,
                asset_id: request.asset_id,
                kind: request.kind,
                threshold: request.threshold,
                initial_price: Some(current_price),
            })
            .await?;

        info!(
            "Saved {} alert {} for user {} on {} at {}",
            alert.kind, alert.id, user_id, asset.name, alert.threshold
        );
        Ok(alert)
    }

    /// Alerts of a user, newest first. `None` lists every status.
    pub async fn list_alerts(&self, user_id: i64, status: Option<AlertStatus>) -> Result<Vec<AlertRule>> {
        self.alerts.find_by_user(user_id, status).await
    }

    /// Alerts joined with their asset, loaded in one bulk lookup
    pub async fn alert_views(&self, user_id: i64, status: Option<AlertStatus>) -> Result<Vec<AlertView>> {
        let alerts = self.alerts.find_by_user(user_id, status).await?;
        let ids: Vec<String> = alerts
            .iter()
            .map(|a| a.asset_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let assets: HashMap<String, _> = self
            .assets
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|asset| (asset.id.clone(), asset))
            .collect();

        Ok(alerts
            .into_iter()
            .map(|alert| {
                let asset = assets.get(&alert.asset_id);
                AlertView::new(alert, asset)
            })
            .collect())
    }

    /// Triggered and Read alerts, most recent trigger first
    pub async fn notifications(&self, user_id: i64) -> Result<Vec<AlertRule>> {
        let mut alerts: Vec<AlertRule> = self
            .alerts
            .find_by_user(user_id, None)
            .await?
            .into_iter()
            .filter(|a| a.status != AlertStatus::Active)
            .collect();
        alerts.sort_by(|a, b| {
            let a_at = a.triggered_at.unwrap_or(a.created_at);
            let b_at = b.triggered_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at).then(b.id.cmp(&a.id))
        });
        Ok(alerts)
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<u64> {
        let unread = self
            .alerts
            .find_by_user(user_id, Some(AlertStatus::Triggered))
            .await?;
        Ok(unread.len() as u64)
    }

    pub async fn alerts_for_asset(&self, user_id: i64, asset_id: &str) -> Result<Vec<AlertRule>> {
        self.alerts.find_by_user_and_asset(user_id, asset_id).await
    }

    /// Acknowledge a Triggered alert. Alerts in any other state are returned
    /// unchanged.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, user_id: i64, alert_id: i64) -> Result<AlertRule> {
        let alert = self.find_owned(user_id, alert_id).await?;
        if alert.status != AlertStatus::Triggered {
            return Ok(alert);
        }

        match self
            .alerts
            .transition(alert_id, user_id, AlertStatus::Triggered, AlertStatus::Read)
            .await?
        {
            Some(updated) => {
                debug!("Alert {} marked as read", alert_id);
                Ok(updated)
            }
            // read concurrently
            None => self.find_owned(user_id, alert_id).await,
        }
    }

    /// Acknowledge every Triggered alert of a user in one statement
    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let count = self
            .alerts
            .transition_all(user_id, AlertStatus::Triggered, AlertStatus::Read)
            .await?;
        info!("Marked {} alerts as read for user {}", count, user_id);
        Ok(count)
    }

    /// Delete an Active or Read alert
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: i64, alert_id: i64) -> Result<()> {
        let allowed = [AlertStatus::Active, AlertStatus::Read];
        if self.alerts.delete_if_status(alert_id, user_id, &allowed).await? {
            info!("Deleted alert {} for user {}", alert_id, user_id);
            return Ok(());
        }

        let alert = self.find_owned(user_id, alert_id).await?;
        Err(RadarError::InvalidState(match alert.status {
            AlertStatus::Triggered => format!(
                "alert {} is triggered, mark it as read before deleting",
                alert_id
            ),
            status => format!("alert {} changed to {} while deleting", alert_id, status),
        }))
    }

    /// Delete every Read alert of a user in one statement
    #[instrument(skip(self))]
    pub async fn clear_read(&self, user_id: i64) -> Result<u64> {
        let count = self.alerts.delete_all(user_id, AlertStatus::Read).await?;
        info!("Cleared {} read alerts for user {}", count, user_id);
        Ok(count)
    }

    pub async fn stats(&self, user_id: i64) -> Result<AlertStats> {
        let alerts = self.alerts.find_by_user(user_id, None).await?;
        Ok(AlertStats::from_alerts(&alerts))
    }

    async fn find_owned(&self, user_id: i64, alert_id: i64) -> Result<AlertRule> {
        self.alerts
            .find_by_id_and_user(alert_id, user_id)
            .await?
            .ok_or_else(|| RadarError::not_found("alert", alert_id))
    }
}
