//! triage-cluster - Behavioral Clustering Pipeline
//!
//! Turns raw per-tenant behavioral segments into a deduplicated,
//! prioritized set of backlog tasks. Invoked on a schedule; each sweep
//! discovers eligible tenants and runs their pipelines with bounded
//! concurrency.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use triage_cluster::services::{CentroidCache, HttpLabeler, HttpSegmentSource, HttpTenantDirectory};
use triage_cluster::{Coordinator, Pipeline};
use triage_common::TriageConfig;

#[derive(Parser, Debug)]
#[command(name = "triage-cluster", about = "Behavioral segment clustering pipeline")]
struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Minutes between sweeps (overrides the config file)
    #[arg(long, env = "TRIAGE_SWEEP_INTERVAL_MINS")]
    interval_mins: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = TriageConfig::load(args.config.as_deref())?;

    info!("Starting triage-cluster");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path);

    let pool = triage_cluster::db::init_database_pool(config.database_path.as_ref()).await?;
    info!("Database connection established");

    let http_timeout = Duration::from_secs(config.http_timeout_secs);
    let segment_source = Arc::new(HttpSegmentSource::new(
        config.segment_api_url.clone(),
        http_timeout,
    )?);
    let labeler = Arc::new(HttpLabeler::new(config.labeling_api_url.clone(), http_timeout)?);
    let tenants = Arc::new(HttpTenantDirectory::new(
        config.tenant_api_url.clone(),
        http_timeout,
    )?);

    let pipeline = Arc::new(Pipeline::new(
        pool,
        config.params.clone(),
        segment_source,
        labeler,
        CentroidCache::new(),
    ));
    let coordinator = Coordinator::new(pipeline, tenants, config.params.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing in-flight runs");
            shutdown.cancel();
        }
    });

    if args.once {
        coordinator.sweep(&cancel).await?;
        return Ok(());
    }

    let interval_mins = args.interval_mins.unwrap_or(config.sweep_interval_mins);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_mins * 60));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = coordinator.sweep(&cancel).await {
                    tracing::error!(error = %e, "Sweep failed before any tenant ran");
                }
            }
            _ = cancel.cancelled() => {
                info!("Scheduler stopped");
                return Ok(());
            }
        }
    }
}
