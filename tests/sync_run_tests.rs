//! End-to-end pipeline runs over in-memory source and destination fakes.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use parts_sync::domain::record::{PartImage, PartRecord};
use parts_sync::infrastructure::config::SyncConfig;
use parts_sync::sync::deliverer::DestinationApi;
use parts_sync::sync::error::{DeliveryError, FetchError, ImageFetchError};
use parts_sync::sync::mapping::DestinationPart;
use parts_sync::sync::source::{PageCursor, PageEnvelope, PageLinks, SourceApi};
use parts_sync::{SyncRun, SyncStatus};

const PAGES: u32 = 3;
const PER_PAGE: u32 = 100;

/// Three-page source with sequential ids 1..=300. Pages listed in
/// `failing_pages` always return a server error; image fetches attach one
/// image to even ids.
struct FakeSource {
    failing_pages: Vec<u32>,
    cursors_seen: Mutex<Vec<PageCursor>>,
}

impl FakeSource {
    fn new() -> Self {
        Self { failing_pages: Vec::new(), cursors_seen: Mutex::new(Vec::new()) }
    }

    fn page_number(cursor: &PageCursor) -> u32 {
        match cursor {
            PageCursor::Page(n) => *n,
            PageCursor::Url(url) => url
                .split("page=")
                .nth(1)
                .and_then(|rest| rest.split('&').next())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
        }
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn fetch_page(&self, cursor: &PageCursor) -> Result<PageEnvelope, FetchError> {
        self.cursors_seen.lock().unwrap().push(cursor.clone());
        let page = Self::page_number(cursor);
        if page == 0 || page > PAGES {
            return Err(FetchError::Status { status: 404 });
        }
        if self.failing_pages.contains(&page) {
            return Err(FetchError::Status { status: 500 });
        }
        let first = (page - 1) * PER_PAGE + 1;
        let data: Vec<PartRecord> = (first..first + PER_PAGE)
            .map(|id| {
                serde_json::from_value(json!({"partId": id.to_string(), "price": "10.50"}))
                    .unwrap()
            })
            .collect();
        let next_page_url = (page < PAGES)
            .then(|| format!("http://source.test/api/parts?page={}", page + 1));
        Ok(PageEnvelope {
            data,
            links: PageLinks {
                current_page: page,
                last_page: PAGES,
                total: u64::from(PAGES * PER_PAGE),
                next_page_url,
            },
        })
    }

    async fn fetch_images(&self, part_id: &str) -> Result<Vec<PartImage>, ImageFetchError> {
        let id: u32 = part_id.parse().map_err(|_| ImageFetchError::Status { status: 400 })?;
        if id % 2 != 0 {
            return Ok(Vec::new());
        }
        Ok(vec![PartImage {
            location_ref: Some(format!("https://cdn.test/{id}.jpg")),
            is_primary: true,
            filename: None,
            extension: None,
            last_modified: None,
        }])
    }
}

#[derive(Default)]
struct FakeDestination {
    items_accepted: AtomicU32,
    batches: AtomicU32,
}

#[async_trait]
impl DestinationApi for FakeDestination {
    async fn push_batch(
        &self,
        batch: &[DestinationPart],
    ) -> Result<serde_json::Value, DeliveryError> {
        self.items_accepted.fetch_add(batch.len() as u32, Ordering::SeqCst);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"accepted": batch.len()}))
    }
}

fn test_config(dir: &TempDir) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.source.max_retries = 0;
    config.images.max_retries = 0;
    config.delivery.max_retries = 0;
    config.output.raw_path = dir.path().join("parts.raw.ndjson");
    config.output.enriched_path = dir.path().join("parts.enriched.ndjson");
    config
}

#[tokio::test]
async fn full_run_processes_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let source = Arc::new(FakeSource::new());
    let destination = Arc::new(FakeDestination::default());
    let events: Arc<Mutex<Vec<_>>> = Arc::new(Mutex::new(Vec::new()));
    let events_out = events.clone();

    let run = SyncRun::with_apis(config.clone(), source.clone(), destination.clone())
        .on_progress(move |event| events.lock().unwrap().push(event));
    let result = run.run().await;

    assert!(result.success, "run should succeed: {:?}", result.error);
    assert_eq!(result.total_processed, 300);
    assert_eq!(result.read, 300);
    assert_eq!(result.sent, 300);
    assert_eq!(result.failed, 0);
    assert_eq!(result.read, result.sent + result.failed);
    assert_eq!(destination.items_accepted.load(Ordering::SeqCst), 300);
    // 100 records per page at the default batch size of 10.
    assert_eq!(destination.batches.load(Ordering::SeqCst), 30);

    let events = events_out.lock().unwrap();
    assert_eq!(events.first().map(|e| e.status), Some(SyncStatus::Started));
    assert_eq!(events.last().map(|e| e.status), Some(SyncStatus::Completed));
    assert!(events.iter().any(|e| e.status == SyncStatus::PageCollected));
    assert!(events.iter().any(|e| e.status == SyncStatus::ImagesEnriched));
    let completed = events.last().unwrap();
    assert_eq!(completed.total_processed, 300);
    assert_eq!(completed.percentage, 100.0);
}

#[tokio::test]
async fn raw_snapshot_preserves_source_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let run = SyncRun::with_apis(
        config.clone(),
        Arc::new(FakeSource::new()),
        Arc::new(FakeDestination::default()),
    );
    assert!(run.run().await.success);

    let raw = std::fs::read_to_string(&config.output.raw_path).unwrap();
    let ids: Vec<u32> = raw
        .lines()
        .map(|line| {
            let record: PartRecord = serde_json::from_str(line).unwrap();
            record.part_id.unwrap().parse().unwrap()
        })
        .collect();
    assert_eq!(ids, (1..=300).collect::<Vec<u32>>());

    // Enriched holds every record too, in per-page completion order.
    let enriched = std::fs::read_to_string(&config.output.enriched_path).unwrap();
    assert_eq!(enriched.lines().count(), 300);
}

#[tokio::test]
async fn continuation_urls_are_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let source = Arc::new(FakeSource::new());
    let run = SyncRun::with_apis(
        config,
        source.clone(),
        Arc::new(FakeDestination::default()),
    );
    assert!(run.run().await.success);

    let cursors = source.cursors_seen.lock().unwrap();
    // The fake hands out plain-http continuation URLs without per_page; both
    // get fixed up before the next fetch.
    assert!(cursors.iter().any(|c| matches!(
        c,
        PageCursor::Url(url) if url == "https://source.test/api/parts?page=2&per_page=100"
    )));
}

#[tokio::test]
async fn snapshots_are_truncated_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    for _ in 0..2 {
        let run = SyncRun::with_apis(
            config.clone(),
            Arc::new(FakeSource::new()),
            Arc::new(FakeDestination::default()),
        );
        assert!(run.run().await.success);
    }

    let raw = std::fs::read_to_string(&config.output.raw_path).unwrap();
    assert_eq!(raw.lines().count(), 300, "second run must not append to the first");
}

#[tokio::test]
async fn failed_page_is_skipped_and_the_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let source = Arc::new(FakeSource {
        failing_pages: vec![2],
        cursors_seen: Mutex::new(Vec::new()),
    });
    let destination = Arc::new(FakeDestination::default());
    let run = SyncRun::with_apis(config, source, destination.clone());
    let result = run.run().await;

    assert!(result.success);
    assert_eq!(result.total_processed, 200);
    assert_eq!(result.sent, 200);
    assert_eq!(destination.items_accepted.load(Ordering::SeqCst), 200);
}

#[tokio::test]
async fn unopenable_sink_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    // A directory cannot be truncated as a snapshot file.
    config.output.raw_path = dir.path().to_path_buf();

    let run = SyncRun::with_apis(
        config,
        Arc::new(FakeSource::new()),
        Arc::new(FakeDestination::default()),
    );
    let result = run.run().await;

    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(result.total_processed, 0);
}
