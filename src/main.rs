//! Command-line entry point.
//!
//! `parts-sync [--config <path>]` runs a full synchronization pass;
//! `parts-sync redeliver [--config <path>]` replays the persisted enriched
//! snapshot through the delivery path without touching the source API.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use parts_sync::infrastructure::config::{defaults, ConfigManager, SyncConfig};
use parts_sync::infrastructure::logging::init_logging;
use parts_sync::infrastructure::retry::RetryPolicy;
use parts_sync::sync::deliverer::{BatchDeliverer, DestinationClient};
use parts_sync::SyncRun;

struct CliArgs {
    redeliver: bool,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs { redeliver: false, config_path: None };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "redeliver" => parsed.redeliver = true,
            "--config" => {
                let value = args.next().context("--config requires a path")?;
                parsed.config_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                println!("usage: parts-sync [redeliver] [--config <path>]");
                std::process::exit(0);
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }
    Ok(parsed)
}

async fn load_config(path: Option<PathBuf>) -> Result<SyncConfig> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    manager.load_or_init().await
}

async fn run_sync(config: SyncConfig) -> Result<bool> {
    let run = SyncRun::new(config)?.on_progress(|event| {
        info!(
            status = %event.status,
            page = event.current_page,
            total_processed = event.total_processed,
            percentage = event.percentage,
            "Progress"
        );
    });
    let result = run.run().await;
    info!(
        success = result.success,
        total_processed = result.total_processed,
        read = result.read,
        sent = result.sent,
        failed = result.failed,
        error = result.error.as_deref(),
        "Run finished"
    );
    Ok(result.success)
}

async fn run_redeliver(config: SyncConfig) -> Result<bool> {
    let destination = DestinationClient::new(config.delivery.clone())
        .context("Failed to build destination client")?;
    let deliverer = BatchDeliverer::new(
        Arc::new(destination),
        config.delivery.clone(),
        RetryPolicy::from_millis(
            config.delivery.max_retries,
            defaults::BACKOFF_BASE_MS,
            defaults::BACKOFF_CAP_MS,
            defaults::BACKOFF_JITTER_MS,
        ),
    );
    let totals = deliverer
        .deliver_snapshot(&config.output.enriched_path)
        .await
        .context("Failed to read enriched snapshot")?;
    info!(
        read = totals.read,
        sent = totals.sent,
        failed = totals.failed,
        "Redelivery finished"
    );
    Ok(totals.failed == 0)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = parse_args()?;
    let config = load_config(args.config_path).await?;
    init_logging(&config.logging)?;

    let success = if args.redeliver {
        run_redeliver(config).await?
    } else {
        run_sync(config).await?
    };
    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
