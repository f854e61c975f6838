use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scan_orchestrator_rs::{
    config::OrchestratorConfig,
    executor::NmapExecutor,
    registry::{self, JobRegistry},
    scheduler::Scheduler,
    server::{self, AppState},
};

/// scan-orchestrator-rs — concurrent network scan orchestrator around nmap
/// with job tracking, cancellation and a small JSON API.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scan-orchestrator-rs",
    version,
    about = "Concurrent network scan orchestrator around nmap with job tracking and a JSON API.",
    long_about = None
)]
struct Cli {
    /// Address to bind the HTTP API on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Maximum number of concurrently running scan processes.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Per-job wall-clock timeout in seconds.
    #[arg(long = "job-timeout-secs", default_value_t = 300)]
    job_timeout_secs: u64,

    /// How long finished jobs are retained before eviction, in seconds.
    #[arg(long = "retention-secs", default_value_t = 3600)]
    retention_secs: u64,

    /// Grace period for in-flight scans during shutdown, in seconds.
    #[arg(long = "shutdown-grace-secs", default_value_t = 10)]
    shutdown_grace_secs: u64,

    /// Path to the nmap executable.
    #[arg(long = "nmap-path", default_value = "nmap")]
    nmap_path: String,
}

impl Cli {
    fn into_config(self) -> OrchestratorConfig {
        OrchestratorConfig {
            workers: self.workers,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            retention: Duration::from_secs(self.retention_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            nmap_path: self.nmap_path,
            bind: self.bind,
            ..OrchestratorConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    info!(
        workers = config.workers,
        job_timeout_secs = config.job_timeout.as_secs(),
        retention_secs = config.retention.as_secs(),
        nmap_path = %config.nmap_path,
        "starting scan orchestrator"
    );

    let registry = JobRegistry::new();
    let executor = Arc::new(NmapExecutor::new(&config.nmap_path, config.kill_grace));
    let scheduler = Arc::new(Scheduler::spawn(
        config.workers,
        config.job_timeout,
        config.shutdown_grace,
        registry.clone(),
        executor,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = registry::spawn_retention_sweeper(
        registry.clone(),
        config.retention,
        config.retention_sweep_interval,
        shutdown.clone(),
    );

    let state = AppState {
        registry: registry.clone(),
        scheduler: scheduler.clone(),
    };
    let http = tokio::spawn(server::serve(config.bind.clone(), state, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    shutdown.cancel();
    scheduler.shutdown().await;
    let _ = sweeper.await;
    http.await??;

    info!("scan orchestrator stopped");
    Ok(())
}
