//! Progress events and the terminal run result.
//!
//! Events are read-only snapshots pushed through a synchronous callback; the
//! excluded transport layer (SSE/WebSocket relay) owns delivery to end users.
//! They are emitted in order and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the synchronization run an event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Run accepted, first page not yet fetched.
    Started,
    /// A page of raw records was collected and persisted.
    PageCollected,
    /// Image enrichment for the current page is in progress.
    ImagesEnriching,
    /// Image enrichment for the current page finished.
    ImagesEnriched,
    /// A page's enriched records were delivered downstream.
    BatchDelivered,
    /// Run finished; totals are final.
    Completed,
    /// Run finished with a fatal sink error; totals are partial.
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncStatus::Started => "started",
            SyncStatus::PageCollected => "page_collected",
            SyncStatus::ImagesEnriching => "images_enriching",
            SyncStatus::ImagesEnriched => "images_enriched",
            SyncStatus::BatchDelivered => "batch_delivered",
            SyncStatus::Completed => "completed",
            SyncStatus::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// Snapshot of run progress at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<u32>,
    /// Total records the source reports for the whole data set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_in_page: Option<usize>,
    pub total_processed: u64,
    /// Percentage of `total` processed so far, rounded to two decimals.
    pub percentage: f64,
    /// Current adaptive image-fetch concurrency limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_images: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub without_images: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Minimal event carrying only a status and the running total.
    pub fn of(status: SyncStatus, total_processed: u64) -> Self {
        Self {
            status,
            current_page: None,
            last_page: None,
            total: None,
            items_in_page: None,
            total_processed,
            percentage: 0.0,
            concurrency: None,
            with_images: None,
            without_images: None,
            errors: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Cumulative delivery accounting. `read` counts every record seen, including
/// malformed lines; `read == sent + failed` always holds at the end of a
/// delivery pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryTotals {
    pub read: u64,
    pub sent: u64,
    pub failed: u64,
}

impl DeliveryTotals {
    pub fn merge(&mut self, other: DeliveryTotals) {
        self.read += other.read;
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Single terminal artifact returned to the caller. A run never surfaces an
/// unhandled error: partial failure is expressed through `success == false`
/// plus whatever totals were accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub success: bool,
    /// Records collected from the source across all pages.
    pub total_processed: u64,
    /// Records seen by the deliverer.
    pub read: u64,
    /// Records accepted by the destination.
    pub sent: u64,
    /// Records that could not be delivered (rejected batches, malformed lines).
    pub failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SyncStatus::PageCollected).unwrap();
        assert_eq!(json, "\"page_collected\"");
        assert_eq!(SyncStatus::ImagesEnriching.to_string(), "images_enriching");
    }

    #[test]
    fn sparse_event_omits_absent_fields() {
        let event = ProgressEvent::of(SyncStatus::Started, 0);
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("current_page").is_none());
        assert!(value.get("with_images").is_none());
        assert_eq!(value["status"], "started");
    }

    #[test]
    fn totals_merge_accumulates() {
        let mut totals = DeliveryTotals { read: 10, sent: 8, failed: 2 };
        totals.merge(DeliveryTotals { read: 5, sent: 0, failed: 5 });
        assert_eq!(totals, DeliveryTotals { read: 15, sent: 8, failed: 7 });
        assert_eq!(totals.read, totals.sent + totals.failed);
    }
}
