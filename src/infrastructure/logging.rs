//! Logging system configuration and initialization
//!
//! Console logging through `tracing-subscriber` with an `EnvFilter`, plus an
//! optional non-blocking file layer. `RUST_LOG` overrides the configured
//! level, e.g. `RUST_LOG="debug,reqwest=warn" parts-sync`.

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the process lifetime.
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Log directory next to the executable, falling back to the working dir.
pub fn log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    exe_dir.join("logs")
}

/// Initialize the global subscriber from the logging config.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},reqwest=warn,hyper=warn",
            level = config.level
        ))
    });

    let console_layer = config
        .console_output
        .then(|| fmt::layer().with_target(true));

    let file_layer = if config.file_output {
        let log_dir = log_directory();
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {log_dir:?}: {e}"))?;
        let appender = tracing_appender::rolling::daily(&log_dir, "parts-sync.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        LOG_GUARD
            .set(guard)
            .map_err(|_| anyhow!("Logging already initialized"))?;
        Some(fmt::layer().with_ansi(false).with_writer(writer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}
