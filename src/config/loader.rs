//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{RadarError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, nested with `__`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    // e.g. APP__MARKET_DATA__API_KEY, APP__SYNC__BATCH_DELAY_MS
    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| RadarError::Configuration(e.to_string()))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| RadarError::Configuration(e.to_string()))?;

    validate(&app)?;
    Ok(app)
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.sync.page_size == 0 || config.sync.page_size > 100 {
        return Err(RadarError::Configuration(format!(
            "sync.page_size must be within 1..=100, got {}",
            config.sync.page_size
        )));
    }
    if config.sync.batch_size == 0 || config.sync.batch_size > 100 {
        return Err(RadarError::Configuration(format!(
            "sync.batch_size must be within 1..=100, got {}",
            config.sync.batch_size
        )));
    }
    if config.notifications.partitions == 0 {
        return Err(RadarError::Configuration(
            "notifications.partitions must be at least 1".to_string(),
        ));
    }
    if config.sync.full_refresh_interval_seconds == 0 || config.sync.price_refresh_interval_seconds == 0
    {
        return Err(RadarError::Configuration(
            "refresh intervals must be non-zero".to_string(),
        ));
    }
    Ok(())
}
