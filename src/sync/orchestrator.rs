//! Run orchestration: page fetch → raw snapshot → image enrichment →
//! enriched snapshot → batch delivery, page by page.
//!
//! A run always terminates in a [`SyncRunResult`]. Page-level failures skip
//! to the next page by numeric advance; record- and batch-level failures are
//! absorbed as counters by the components. Only failures to open or close the
//! snapshot sink flip `success` to false.

use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::domain::events::{DeliveryTotals, ProgressEvent, SyncRunResult, SyncStatus};
use crate::infrastructure::config::{defaults, SyncConfig};
use crate::infrastructure::retry::RetryPolicy;
use crate::sync::concurrency::AdaptiveConcurrencyController;
use crate::sync::deliverer::{BatchDeliverer, DestinationApi, DestinationClient};
use crate::sync::enricher::ImageEnricher;
use crate::sync::page_fetcher::PageFetcher;
use crate::sync::sink::DualSink;
use crate::sync::source::{PageCursor, SourceApi, SourceClient};

type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// One synchronization run over the full source data set.
pub struct SyncRun {
    config: SyncConfig,
    source: Arc<dyn SourceApi>,
    destination: Arc<dyn DestinationApi>,
    on_progress: Option<ProgressCallback>,
    run_id: Uuid,
}

impl SyncRun {
    /// Build a run against the real HTTP clients.
    pub fn new(config: SyncConfig) -> anyhow::Result<Self> {
        let source =
            SourceClient::new(config.source.clone(), config.images.request_timeout())?;
        let destination = DestinationClient::new(config.delivery.clone())?;
        Ok(Self::with_apis(config, Arc::new(source), Arc::new(destination)))
    }

    /// Build a run over externally supplied API implementations.
    pub fn with_apis(
        config: SyncConfig,
        source: Arc<dyn SourceApi>,
        destination: Arc<dyn DestinationApi>,
    ) -> Self {
        Self { config, source, destination, on_progress: None, run_id: Uuid::new_v4() }
    }

    /// Register the progress consumer. Dropping the consumer never stops the
    /// run; events are simply discarded.
    pub fn on_progress(
        mut self,
        callback: impl Fn(ProgressEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute the run to completion.
    pub async fn run(&self) -> SyncRunResult {
        let span = tracing::info_span!("sync_run", run_id = %self.run_id);
        self.execute().instrument(span).await
    }

    async fn execute(&self) -> SyncRunResult {
        info!("Synchronization run starting");
        self.emit(ProgressEvent::of(SyncStatus::Started, 0));

        let mut sink = match DualSink::open(&self.config.output).await {
            Ok(sink) => sink,
            Err(error) => {
                error!(%error, "Failed to open snapshot sink");
                return self.fatal(0, DeliveryTotals::default(), error.to_string());
            }
        };

        let fetcher = PageFetcher::new(
            self.source.clone(),
            RetryPolicy::from_millis(
                self.config.source.max_retries,
                defaults::BACKOFF_BASE_MS,
                defaults::BACKOFF_CAP_MS,
                defaults::BACKOFF_JITTER_MS,
            ),
        );
        let controller = AdaptiveConcurrencyController::new(&self.config.images);
        let enricher = ImageEnricher::new(
            self.source.clone(),
            self.config.images.clone(),
            RetryPolicy::from_millis(
                self.config.images.max_retries,
                defaults::BACKOFF_BASE_MS,
                defaults::BACKOFF_CAP_MS,
                defaults::BACKOFF_JITTER_MS,
            ),
        );
        let deliverer = BatchDeliverer::new(
            self.destination.clone(),
            self.config.delivery.clone(),
            RetryPolicy::from_millis(
                self.config.delivery.max_retries,
                defaults::BACKOFF_BASE_MS,
                defaults::BACKOFF_CAP_MS,
                defaults::BACKOFF_JITTER_MS,
            ),
        );

        let mut cursor = PageCursor::Page(1);
        let mut current_page: u32 = 1;
        let mut last_page: Option<u32> = None;
        let mut total: Option<u64> = None;
        let mut total_processed: u64 = 0;
        let mut totals = DeliveryTotals::default();

        loop {
            let envelope = match fetcher.fetch_page(&cursor).await {
                Ok(envelope) => envelope,
                Err(fetch_error) => {
                    // Terminal page failure: skip the page by numeric advance
                    // when more pages are known to exist, otherwise stop.
                    warn!(page = current_page, %fetch_error, "Page unrecoverable, skipping");
                    match last_page {
                        Some(last) if current_page < last => {
                            current_page += 1;
                            cursor = PageCursor::Page(current_page);
                            continue;
                        }
                        _ => break,
                    }
                }
            };

            current_page = envelope.links.current_page;
            last_page = Some(envelope.links.last_page);
            total = Some(envelope.links.total);
            let items_in_page = envelope.data.len();

            for record in &envelope.data {
                if let Err(write_error) = sink.write_raw(record).await {
                    warn!(%write_error, "Raw snapshot write failed, record kept in pipeline");
                }
            }
            total_processed += items_in_page as u64;
            info!(
                page = current_page,
                last_page = envelope.links.last_page,
                items = items_in_page,
                total_processed,
                "Page collected"
            );
            self.emit(self.page_event(
                SyncStatus::PageCollected,
                current_page,
                last_page,
                total,
                items_in_page,
                total_processed,
                controller.current_limit(),
            ));

            self.emit(self.page_event(
                SyncStatus::ImagesEnriching,
                current_page,
                last_page,
                total,
                items_in_page,
                total_processed,
                controller.current_limit(),
            ));
            let page_base = total_processed - items_in_page as u64;
            let next_cursor = envelope.next_cursor(self.config.source.per_page);
            let enrichment = enricher
                .enrich_page(envelope.data, &controller, |progress| {
                    let mut event = self.page_event(
                        SyncStatus::ImagesEnriching,
                        current_page,
                        last_page,
                        total,
                        items_in_page,
                        page_base + progress.processed as u64,
                        progress.concurrency,
                    );
                    event.with_images = Some(progress.with_images);
                    event.without_images = Some(progress.without_images);
                    event.errors = Some(progress.errors);
                    self.emit(event);
                })
                .await;

            for part in &enrichment.parts {
                if let Err(write_error) = sink.write_enriched(part).await {
                    warn!(%write_error, "Enriched snapshot write failed, record kept in pipeline");
                }
            }
            let mut enriched_event = self.page_event(
                SyncStatus::ImagesEnriched,
                current_page,
                last_page,
                total,
                items_in_page,
                total_processed,
                controller.current_limit(),
            );
            enriched_event.with_images = Some(enrichment.with_images);
            enriched_event.without_images = Some(enrichment.without_images);
            enriched_event.errors = Some(enrichment.errors);
            self.emit(enriched_event);

            let delivered = deliverer
                .deliver(enrichment.parts.into_iter().map(Ok))
                .await;
            totals.merge(delivered);
            self.emit(self.page_event(
                SyncStatus::BatchDelivered,
                current_page,
                last_page,
                total,
                items_in_page,
                total_processed,
                controller.current_limit(),
            ));

            match next_cursor {
                Some(next) => {
                    cursor = next;
                    current_page += 1;
                }
                None => break,
            }
        }

        if let Err(close_error) = sink.close().await {
            error!(%close_error, "Failed to close snapshot sink");
            return self.fatal(total_processed, totals, close_error.to_string());
        }

        info!(
            total_processed,
            read = totals.read,
            sent = totals.sent,
            failed = totals.failed,
            "Synchronization run complete"
        );
        let mut completed = ProgressEvent::of(SyncStatus::Completed, total_processed);
        completed.current_page = Some(current_page);
        completed.last_page = last_page;
        completed.total = total;
        completed.percentage = percentage(total_processed, total);
        self.emit(completed);

        SyncRunResult {
            success: true,
            total_processed,
            read: totals.read,
            sent: totals.sent,
            failed: totals.failed,
            error: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn page_event(
        &self,
        status: SyncStatus,
        current_page: u32,
        last_page: Option<u32>,
        total: Option<u64>,
        items_in_page: usize,
        total_processed: u64,
        concurrency: usize,
    ) -> ProgressEvent {
        let mut event = ProgressEvent::of(status, total_processed);
        event.current_page = Some(current_page);
        event.last_page = last_page;
        event.total = total;
        event.items_in_page = Some(items_in_page);
        event.percentage = percentage(total_processed, total);
        event.concurrency = Some(concurrency);
        event
    }

    fn fatal(&self, total_processed: u64, totals: DeliveryTotals, message: String) -> SyncRunResult {
        let mut event = ProgressEvent::of(SyncStatus::Error, total_processed);
        event.error = Some(message.clone());
        self.emit(event);
        SyncRunResult {
            success: false,
            total_processed,
            read: totals.read,
            sent: totals.sent,
            failed: totals.failed,
            error: Some(message),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}

/// Share of `total` processed, rounded to two decimals. Zero when the total
/// is unknown or zero.
fn percentage(processed: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => {
            let ratio = processed as f64 / total as f64;
            (ratio * 10_000.0).round() / 100.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, Some(3)), 33.33);
        assert_eq!(percentage(2, Some(3)), 66.67);
        assert_eq!(percentage(300, Some(300)), 100.0);
        assert_eq!(percentage(5, None), 0.0);
        assert_eq!(percentage(5, Some(0)), 0.0);
    }
}
