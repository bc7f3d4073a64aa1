//! Configuration infrastructure
//!
//! Serde-backed configuration for the synchronization pipeline, loaded from a
//! JSON file under the platform config directory with first-run
//! initialization. Defaults mirror the tunings the pipeline was operated
//! with in production.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Default values for every tunable. Kept in one place so tests and the
/// config file share a single source of truth.
pub mod defaults {
    /// Records requested per source page.
    pub const PER_PAGE: u32 = 100;
    /// Maximum images attached to one record.
    pub const MAX_IMAGES_PER_ITEM: usize = 5;

    pub const IMAGE_CONCURRENCY_INITIAL: usize = 3;
    pub const IMAGE_CONCURRENCY_MIN: usize = 1;
    pub const IMAGE_CONCURRENCY_MAX: usize = 6;
    /// Probability of nudging the limit up after a successful fetch.
    pub const CONCURRENCY_NUDGE_PROBABILITY: f64 = 0.1;

    pub const PAGE_TIMEOUT_MS: u64 = 45_000;
    pub const IMAGE_TIMEOUT_MS: u64 = 60_000;
    /// Hard deadline around one record's whole fetch-with-retries.
    pub const IMAGE_TASK_DEADLINE_MS: u64 = 20_000;

    pub const PAGE_MAX_RETRIES: u32 = 5;
    pub const IMAGE_MAX_RETRIES: u32 = 5;
    pub const DELIVERY_MAX_RETRIES: u32 = 3;

    pub const BACKOFF_BASE_MS: u64 = 1_000;
    pub const BACKOFF_CAP_MS: u64 = 12_000;
    pub const BACKOFF_JITTER_MS: u64 = 500;

    /// Sliding error window inspected by the circuit breaker.
    pub const BREAKER_WINDOW_MS: u64 = 120_000;
    /// Most recent signals sampled when evaluating the trip condition.
    pub const BREAKER_SAMPLE_SIZE: usize = 30;
    /// Overload signals within the sample that open the breaker.
    pub const BREAKER_TRIP_THRESHOLD: usize = 8;
    pub const BREAKER_COOLDOWN_MS: u64 = 15_000;
    /// Absolute cap on retained window entries.
    pub const BREAKER_WINDOW_CAP: usize = 200;

    pub const BATCH_SIZE: usize = 10;
    pub const DELIVERY_TIMEOUT_MS: u64 = 30_000;

    /// Emit an enrichment progress event every this many completed items.
    pub const PROGRESS_EVERY: usize = 10;

    pub const RAW_SNAPSHOT: &str = "parts.raw.ndjson";
    pub const ENRICHED_SNAPSHOT: &str = "parts.enriched.ndjson";

    pub const PLATFORM_NAME: &str = "parts-sync";
    pub const LOG_LEVEL: &str = "info";
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    pub source: SourceConfig,
    pub images: ImageConfig,
    pub delivery: DeliveryConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Source pagination API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the source API (no trailing slash).
    pub base_url: String,
    /// Token sent in the `x-api-token` header.
    pub api_token: String,
    pub per_page: u32,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
}

/// Image enrichment settings: per-record endpoint, concurrency window and
/// circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub max_images_per_item: usize,
    pub concurrency_initial: usize,
    pub concurrency_min: usize,
    pub concurrency_max: usize,
    pub nudge_probability: f64,
    pub request_timeout_ms: u64,
    /// Hard per-task deadline independent of the retry loop.
    pub task_deadline_ms: u64,
    pub max_retries: u32,
    pub breaker_window_ms: u64,
    pub breaker_sample_size: usize,
    pub breaker_trip_threshold: usize,
    pub breaker_cooldown_ms: u64,
    pub progress_every: usize,
}

/// Destination API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Full endpoint receiving one JSON array per batch.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub batch_size: usize,
    /// Optional cap on total records delivered in one pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_limit: Option<usize>,
    pub max_retries: u32,
    pub request_timeout_ms: u64,
    /// Platform identifier stamped on every mapped record.
    pub platform_name: String,
    /// Base for resolving relative image references; relative references are
    /// dropped when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base_url: Option<String>,
}

/// Snapshot output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub raw_path: PathBuf,
    pub enriched_path: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://source.example.com/api".to_string(),
            api_token: String::new(),
            per_page: defaults::PER_PAGE,
            request_timeout_ms: defaults::PAGE_TIMEOUT_MS,
            max_retries: defaults::PAGE_MAX_RETRIES,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_images_per_item: defaults::MAX_IMAGES_PER_ITEM,
            concurrency_initial: defaults::IMAGE_CONCURRENCY_INITIAL,
            concurrency_min: defaults::IMAGE_CONCURRENCY_MIN,
            concurrency_max: defaults::IMAGE_CONCURRENCY_MAX,
            nudge_probability: defaults::CONCURRENCY_NUDGE_PROBABILITY,
            request_timeout_ms: defaults::IMAGE_TIMEOUT_MS,
            task_deadline_ms: defaults::IMAGE_TASK_DEADLINE_MS,
            max_retries: defaults::IMAGE_MAX_RETRIES,
            breaker_window_ms: defaults::BREAKER_WINDOW_MS,
            breaker_sample_size: defaults::BREAKER_SAMPLE_SIZE,
            breaker_trip_threshold: defaults::BREAKER_TRIP_THRESHOLD,
            breaker_cooldown_ms: defaults::BREAKER_COOLDOWN_MS,
            progress_every: defaults::PROGRESS_EVERY,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://destination.example.com/api/v1/spare-parts/batch".to_string(),
            username: String::new(),
            password: String::new(),
            batch_size: defaults::BATCH_SIZE,
            item_limit: None,
            max_retries: defaults::DELIVERY_MAX_RETRIES,
            request_timeout_ms: defaults::DELIVERY_TIMEOUT_MS,
            platform_name: defaults::PLATFORM_NAME.to_string(),
            image_base_url: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            raw_path: PathBuf::from(defaults::RAW_SNAPSHOT),
            enriched_path: PathBuf::from(defaults::ENRICHED_SNAPSHOT),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            console_output: true,
            file_output: false,
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ImageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn task_deadline(&self) -> Duration {
        Duration::from_millis(self.task_deadline_ms)
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Loads and saves the JSON configuration file.
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Platform config directory for this application.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Failed to resolve user config directory")?
            .join("parts-sync");
        Ok(dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::config_dir()?.join("parts_sync_config.json");
        Ok(Self { config_path })
    }

    /// Explicit path, used by the binary's `--config` flag.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load the config file, writing defaults on first run.
    pub async fn load_or_init(&self) -> Result<SyncConfig> {
        if !self.config_path.exists() {
            info!("First run detected - writing default configuration to {:?}", self.config_path);
            let config = SyncConfig::default();
            self.save(&config).await?;
            return Ok(config);
        }
        self.load().await
    }

    pub async fn load(&self) -> Result<SyncConfig> {
        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read config file {:?}", self.config_path))?;
        let config: SyncConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", self.config_path))?;
        Ok(config)
    }

    pub async fn save(&self, config: &SyncConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("Failed to write config file {:?}", self.config_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = SyncConfig::default();
        assert!(config.images.concurrency_min >= 1);
        assert!(config.images.concurrency_initial <= config.images.concurrency_max);
        assert!(config.images.concurrency_initial >= config.images.concurrency_min);
        assert!(config.delivery.batch_size > 0);
        assert!(config.images.breaker_trip_threshold <= config.images.breaker_sample_size);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = SyncConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source.per_page, config.source.per_page);
        assert_eq!(back.output.raw_path, config.output.raw_path);
        assert!(back.delivery.item_limit.is_none());
    }

    #[tokio::test]
    async fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("cfg.json"));
        let first = manager.load_or_init().await.unwrap();
        assert!(manager.config_path.exists());
        let second = manager.load_or_init().await.unwrap();
        assert_eq!(first.source.per_page, second.source.per_page);
    }
}
