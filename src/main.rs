//! Tally server
//!
//! Wires up the full stack in dependency order: bucket store first, then the
//! chart registry over it, the rollover scheduler, and finally the HTTP
//! facade.

use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tally::api::{self, ApiConfig, AppState};
use tally::chart::source::{DriveCounts, InstanceCounts, NoteCounts};
use tally::chart::{ChartRegistry, ChartSources, ResolutionScheduler};
use tally::clock::SystemClock;
use tally::config::Config;
use tally::store::{BucketStore, SqliteBucketStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tally", version, about = "Event-driven time-series chart aggregation engine")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the API bind port
    #[arg(long)]
    port: Option<u16>,

    /// Override the bucket database path
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Source-of-truth counts for a standalone deployment.
///
/// Deployments embedding tally implement the count traits against their
/// primary storage; with no primary store attached, every series starts
/// from a live count of zero.
struct StandaloneCounts;

#[async_trait]
impl NoteCounts for StandaloneCounts {
    async fn count_notes(&self, _user_id: &str) -> anyhow::Result<u64> {
        Ok(0)
    }
}

#[async_trait]
impl InstanceCounts for StandaloneCounts {
    async fn count_instances(&self) -> anyhow::Result<u64> {
        Ok(0)
    }
}

#[async_trait]
impl DriveCounts for StandaloneCounts {
    async fn count_drive(&self, _user_id: &str) -> anyhow::Result<(u64, u64)> {
        Ok((0, 0))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(db) = args.db {
        config.store.db_path = db;
    }

    init_logging(&config);

    tracing::info!("Tally Chart Engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Bucket database: {:?}", config.store.db_path);

    // The store must be ready before any chart is constructed.
    let store: Arc<dyn BucketStore> = Arc::new(SqliteBucketStore::open(&config.store.db_path)?);

    let counts = Arc::new(StandaloneCounts);
    let sources = ChartSources {
        notes: counts.clone(),
        instances: counts.clone(),
        drive: counts,
    };
    let registry = Arc::new(ChartRegistry::new(store, sources));

    let scheduler = Arc::new(ResolutionScheduler::new(
        Arc::new(SystemClock),
        Duration::from_secs(config.scheduler.tick_interval_secs),
    ));
    for chart in registry.rollables() {
        scheduler.register(chart).await;
    }

    let scheduler_handle = if config.scheduler.enabled {
        Some(Arc::clone(&scheduler).start())
    } else {
        tracing::warn!("Rollover scheduler disabled; buckets seed lazily on write");
        None
    };

    let api_config = ApiConfig::new(config.api.host.clone(), config.api.port);
    let state = AppState::new(registry, api_config.clone());
    api::serve(state, &api_config).await?;

    tracing::info!("Shutting down...");
    scheduler.stop().await;
    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    tracing::info!("Tally shutdown complete");
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
    );

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
