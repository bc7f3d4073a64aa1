//! parts-sync - Spare-part inventory synchronization pipeline
//!
//! Pulls paginated inventory records from a source API, enriches each record
//! with auxiliary images under an adaptive concurrency limit, persists raw and
//! enriched NDJSON snapshots, and forwards enriched data in fixed-size batches
//! to a destination API. Every I/O boundary retries independently; a run
//! always terminates with a structured result instead of an error path.

pub mod domain;
pub mod infrastructure;
pub mod sync;

pub use domain::events::{ProgressEvent, SyncRunResult, SyncStatus};
pub use infrastructure::config::SyncConfig;
pub use sync::orchestrator::SyncRun;
