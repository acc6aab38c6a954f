use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use datapush::sync::{Scheduler, SyncEngine};
use datapush::Config;

/// Push new files from a local directory to a remote host, on a schedule.
#[derive(Debug, Parser)]
#[command(name = "datapush", version)]
struct Args {
    /// Path to the config file (.toml, .yaml or .yml)
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Log skipped files and manifest details
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("Starting process");
    let config = Config::load(&args.config)
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;
    let config = Arc::new(config);

    info!(
        "Mirroring {} to {} via {}",
        config.source_root.display(),
        config.destination_root,
        config.connection
    );

    let engine = SyncEngine::from_config(config.clone());

    if args.once {
        let report = engine.run_cycle().await?;
        info!(
            "Uploaded {} of {} files",
            report.files_uploaded, report.files_scanned
        );
        return Ok(());
    }

    let scheduler = Scheduler::new(engine, config.update_frequency(), config.poll_interval);

    tokio::select! {
        _ = scheduler.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
