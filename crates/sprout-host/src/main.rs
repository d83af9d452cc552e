use std::time::Duration;

use clap::Parser;
use sprout_core::SproutConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod tasks;

/// Sprout host: runs the background scheduler with the configured jobs.
#[derive(Parser)]
#[command(name = "sprout-host", version, about)]
struct Cli {
    /// Path to sprout.toml (falls back to SPROUT_CONFIG, then ~/.sprout/sprout.toml).
    #[arg(short, long)]
    config: Option<String>,

    /// Override `scheduler.max_workers` from the config file.
    #[arg(long)]
    max_workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sprout_host=info,sprout_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > SPROUT_CONFIG env > ~/.sprout/sprout.toml
    let config_path = cli.config.or_else(|| std::env::var("SPROUT_CONFIG").ok());
    let mut config = SproutConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SproutConfig::default()
    });
    if let Some(workers) = cli.max_workers {
        config.scheduler.max_workers = workers.max(1);
    }

    let shutdown_timeout = Duration::from_secs(config.scheduler.shutdown_timeout_secs);
    let scheduler = sprout_scheduler::init_global(config.scheduler.clone())?;
    tasks::register_builtin(scheduler);

    // Schedule state is in-memory only; rebuild it from config on every boot.
    let jobs = if config.jobs.is_empty() {
        info!("no jobs configured, installing built-in defaults");
        tasks::default_jobs()
    } else {
        config.jobs
    };
    let ids = scheduler.install_all(&jobs)?;
    info!(jobs = ids.len(), "schedule installed");

    scheduler.start()?;
    info!(
        workers = scheduler.settings().max_workers,
        tasks = ?scheduler.registry().task_names(),
        "sprout host running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    scheduler.stop(Some(shutdown_timeout)).await?;
    let status = scheduler.get_status();
    info!(
        history = status.history_size,
        recent_failures = status.recent_failures,
        "sprout host stopped"
    );
    Ok(())
}
