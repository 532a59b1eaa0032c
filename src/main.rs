//! CoinRadar - Main Entry Point
//!
//! Runs the market data synchronizer on its schedule, evaluates price alerts
//! on every refresh and serves triggered alerts over WebSocket.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use coin_radar::config::load_config;
use coin_radar::notifications::{
    AlertGateway, EventBus, NotificationPublisher, NotificationRelay, SessionRegistry,
};
use coin_radar::store::{
    self, CachedAssetStore, InMemoryAlertStore, InMemoryAssetStore, InMemoryUserDirectory,
    PgAlertStore, PgAssetStore, PgUserDirectory,
};
use coin_radar::sync::{MarketDataSynchronizer, SyncScheduler, SyncSettings};
use coin_radar::{AlertEvaluator, AlertStore, AssetStore, MarketDataRestClient, UserDirectory};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Run a full refresh right away instead of waiting one period
    #[arg(long, env = "RUN_FULL_REFRESH_ON_START")]
    run_full_refresh_on_start: bool,
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

struct Stores {
    assets: Arc<dyn AssetStore>,
    alerts: Arc<dyn AlertStore>,
    users: Arc<dyn UserDirectory>,
}

async fn open_stores(config: &coin_radar::AppConfig) -> Result<Stores> {
    match &config.database {
        Some(database) => {
            let pool = store::postgres::connect(database)
                .await
                .context("failed to connect to the database")?;
            info!("Using PostgreSQL stores");
            Ok(Stores {
                assets: Arc::new(PgAssetStore::new(pool.clone())),
                alerts: Arc::new(PgAlertStore::new(pool.clone())),
                users: Arc::new(PgUserDirectory::new(pool)),
            })
        }
        None => {
            warn!("No database configured, using in-memory stores");
            Ok(Stores {
                assets: Arc::new(InMemoryAssetStore::new()),
                alerts: Arc::new(InMemoryAlertStore::new()),
                users: Arc::new(InMemoryUserDirectory::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = load_config(Some(&args.config)).context("failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&level, args.log_format)?;

    info!("Starting CoinRadar");
    info!("Configuration file: {}", args.config);

    let stores = open_stores(&config).await?;
    let cache = Arc::new(CachedAssetStore::new(stores.assets));

    // delivery: bus -> relay -> live sessions
    let (bus, receivers) = EventBus::new(
        config.notifications.partitions,
        config.notifications.partition_capacity,
    );
    let sessions = Arc::new(SessionRegistry::new(config.notifications.session_buffer));
    let relay = Arc::new(NotificationRelay::new(sessions.clone())).spawn(receivers);

    let (gateway_shutdown_tx, gateway_shutdown_rx) = watch::channel(false);
    let listener = AlertGateway::bind(&config.gateway.bind_address).await?;
    let gateway = tokio::spawn(
        Arc::new(AlertGateway::new(sessions.clone())).serve(listener, gateway_shutdown_rx),
    );

    // evaluation
    let evaluator = Arc::new(AlertEvaluator::new(
        stores.alerts.clone(),
        cache.clone(),
        stores.users.clone(),
        Arc::new(NotificationPublisher::new(bus)),
    ));

    // synchronization
    let client = MarketDataRestClient::from_config(&config.market_data)?;
    let synchronizer = Arc::new(
        MarketDataSynchronizer::new(
            Arc::new(client),
            cache.clone(),
            SyncSettings::from(&config.sync),
        )
        .with_cache(cache)
        .with_listener(evaluator),
    );
    let scheduler = SyncScheduler::new(synchronizer, &config.sync)
        .with_full_refresh_on_start(
            args.run_full_refresh_on_start || config.settings.full_refresh_on_start,
        )
        .start();

    info!("Application initialized successfully");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    // stop producing, drain delivery into still-open sessions, then close them
    scheduler.shutdown().await;
    let delivered = relay.shutdown().await;
    let _ = gateway_shutdown_tx.send(true);
    if let Err(e) = gateway.await {
        warn!("Gateway task ended abnormally: {}", e);
    }

    info!("Shutdown complete, {} events relayed", delivered);
    Ok(())
}
