//! Alert evaluation engine
//!
//! Every price written by the synchronizer is run against the Active alerts
//! of that asset. Matching alerts are committed as Triggered in one
//! conditional write and only the rows that actually transitioned are handed
//! to the notifier, so overlapping evaluations of the same alert never
//! trigger it twice.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::types::{AlertKind, AlertRule, AlertStatus};
use crate::common::errors::Result;
use crate::common::traits::{AlertNotifier, PriceListener};
use crate::common::types::UserRef;
use crate::store::{AlertStore, AssetStore, UserDirectory};

/// Fractional digits kept in a percentage change before comparison
pub const PCT_SCALE: u32 = 6;

/// Percentage change from `old` to `new`, rounded half away from zero to
/// [`PCT_SCALE`] digits. Zero when `old` is unset or zero.
pub fn pct_change(old: Option<Decimal>, new: Decimal) -> Decimal {
    let old = match old {
        Some(old) if !old.is_zero() => old,
        _ => return Decimal::ZERO,
    };
    (new - old)
        .checked_div(old)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|pct| pct.round_dp_with_strategy(PCT_SCALE, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::ZERO)
}

/// Trigger predicate for one alert at `price`
pub fn should_trigger(alert: &AlertRule, price: Decimal) -> bool {
    match alert.kind {
        AlertKind::PriceAbove => price >= alert.threshold,
        AlertKind::PriceBelow => price <= alert.threshold,
        AlertKind::PercentUp => pct_change(alert.initial_price, price) >= alert.threshold,
        AlertKind::PercentDown => pct_change(alert.initial_price, price) <= alert.threshold,
    }
}

/// Two-decimal display form, e.g. `60000.00`
pub fn format_amount(value: Decimal) -> String {
    let mut value = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    value.to_string()
}

/// Human-readable trigger message. Percentage thresholds are shown as an
/// unsigned magnitude with a direction word.
pub fn format_message(kind: AlertKind, asset_name: &str, threshold: Decimal, price: Decimal) -> String {
    let price = format_amount(price);
    match kind {
        AlertKind::PriceAbove => format!(
            "{} hit your target of {}. Price: ${}",
            asset_name,
            format_amount(threshold),
            price
        ),
        AlertKind::PriceBelow => format!(
            "{} fell to your alert level of {}. Price: ${}",
            asset_name,
            format_amount(threshold),
            price
        ),
        AlertKind::PercentUp => format!(
            "{} is up {}% from your reference price. Price: ${}",
            asset_name,
            format_amount(threshold.abs()),
            price
        ),
        AlertKind::PercentDown => format!(
            "{} is down {}% from your reference price. Price: ${}",
            asset_name,
            format_amount(threshold.abs()),
            price
        ),
    }
}

/// Evaluates Active alerts against incoming prices
pub struct AlertEvaluator {
    alerts: Arc<dyn AlertStore>,
    assets: Arc<dyn AssetStore>,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn AlertNotifier>,
}

impl AlertEvaluator {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        assets: Arc<dyn AssetStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self {
            alerts,
            assets,
            users,
            notifier,
        }
    }

    /// Evaluate every Active alert of `asset_id` at `price`.
    ///
    /// Returns the alerts this call moved to Triggered. Alerts already
    /// Triggered, or claimed by a concurrent evaluation, are not returned.
    #[instrument(skip(self), fields(triggered = tracing::field::Empty))]
    pub async fn evaluate(&self, asset_id: &str, price: Decimal) -> Result<Vec<AlertRule>> {
        let active = self.alerts.find_active_for_asset(asset_id).await?;
        if active.is_empty() {
            return Ok(Vec::new());
        }

        let checked: Vec<i64> = active.iter().map(|a| a.id).collect();
        self.alerts.record_checked_price(&checked, price).await?;

        let asset = self.assets.get(asset_id).await?;
        let asset_name = asset.as_ref().map_or(asset_id, |a| a.name.as_str());
        let now = Utc::now();

        let candidates: Vec<AlertRule> = active
            .into_iter()
            .filter(|alert| alert.status == AlertStatus::Active && should_trigger(alert, price))
            .map(|mut alert| {
                let message = format_message(alert.kind, asset_name, alert.threshold, price);
                alert.mark_triggered(price, now, message);
                alert
            })
            .collect();

        if candidates.is_empty() {
            debug!("No alerts triggered for {} at {}", asset_id, price);
            return Ok(Vec::new());
        }

        let committed = self.alerts.commit_triggered(&candidates).await?;
        if committed.len() < candidates.len() {
            debug!(
                "{} of {} alerts for {} were already claimed or retargeted",
                candidates.len() - committed.len(),
                candidates.len(),
                asset_id
            );
        }
        tracing::Span::current().record("triggered", committed.len() as u64);

        let users = self.load_users(&committed).await;
        for alert in &committed {
            match users.get(&alert.user_id) {
                Some(user) => self.notifier.notify(alert, user, asset.as_ref()),
                None => warn!(
                    "Alert {} triggered for unknown user {}, no notification sent",
                    alert.id, alert.user_id
                ),
            }
        }

        if !committed.is_empty() {
            info!("Triggered {} alerts for {}", committed.len(), asset_id);
        }
        Ok(committed)
    }

    /// One lookup per distinct owner. A failed lookup only costs that
    /// user's notifications, the trigger is already committed.
    async fn load_users(&self, alerts: &[AlertRule]) -> HashMap<i64, UserRef> {
        let ids: BTreeSet<i64> = alerts.iter().map(|a| a.user_id).collect();
        let mut users = HashMap::with_capacity(ids.len());
        for id in ids {
            match self.users.find_user(id).await {
                Ok(Some(user)) => {
                    users.insert(id, user);
                }
                Ok(None) => {}
                Err(e) => error!("Failed to load user {}: {}", id, e),
            }
        }
        users
    }
}

#[async_trait]
impl PriceListener for AlertEvaluator {
    async fn on_price_update(&self, asset_id: &str, price: Decimal) {
        if let Err(e) = self.evaluate(asset_id, price).await {
            error!("Alert evaluation failed for {}: {}", asset_id, e);
        }
    }
}
