//! Image enrichment under the adaptive concurrency limit.
//!
//! Every input record produces exactly one output record, in completion
//! order. A record's images are fetched with their own retry budget and a
//! per-attempt timeout, all wrapped in a hard per-task deadline that can cut
//! a task short even mid-retry; any terminal failure degrades to an empty
//! image list instead of aborting siblings. Dispatch re-reads the shared
//! limit before every task so downward nudges take effect immediately.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::domain::record::{EnrichedPart, PartImage, PartRecord};
use crate::infrastructure::config::ImageConfig;
use crate::infrastructure::retry::RetryPolicy;
use crate::sync::concurrency::AdaptiveConcurrencyController;
use crate::sync::error::ImageFetchError;
use crate::sync::source::SourceApi;

/// Running counts reported every `progress_every` completed items.
#[derive(Debug, Clone, Copy)]
pub struct EnrichProgress {
    pub processed: usize,
    pub items_in_page: usize,
    pub with_images: usize,
    pub without_images: usize,
    pub errors: usize,
    pub concurrency: usize,
}

/// Outcome of one page's enrichment: records in completion order plus the
/// final counts.
#[derive(Debug)]
pub struct PageEnrichment {
    pub parts: Vec<EnrichedPart>,
    pub with_images: usize,
    pub without_images: usize,
    pub errors: usize,
}

enum TaskOutcome {
    WithImages,
    WithoutImages,
    Failed,
}

pub struct ImageEnricher {
    api: Arc<dyn SourceApi>,
    config: ImageConfig,
    policy: RetryPolicy,
}

impl ImageEnricher {
    pub fn new(api: Arc<dyn SourceApi>, config: ImageConfig, policy: RetryPolicy) -> Self {
        Self { api, config, policy }
    }

    /// Enrich one page of records. Count-preserving: the returned parts are
    /// one-to-one with the input, ordered by task completion.
    pub async fn enrich_page(
        &self,
        records: Vec<PartRecord>,
        controller: &AdaptiveConcurrencyController,
        mut on_progress: impl FnMut(EnrichProgress),
    ) -> PageEnrichment {
        let items_in_page = records.len();
        let mut queue: VecDeque<PartRecord> = records.into();
        let mut in_flight = FuturesUnordered::new();
        let mut parts = Vec::with_capacity(items_in_page);
        let mut with_images = 0usize;
        let mut without_images = 0usize;
        let mut errors = 0usize;
        let mut processed = 0usize;

        loop {
            // Dispatch while there is headroom; the limit is re-read before
            // every dispatch so nudges apply immediately.
            while in_flight.len() < controller.current_limit().max(1) {
                let Some(record) = queue.pop_front() else { break };
                in_flight.push(self.enrich_one(record, controller));
            }

            let Some((part, outcome)) = in_flight.next().await else { break };
            processed += 1;
            match outcome {
                TaskOutcome::WithImages => with_images += 1,
                TaskOutcome::WithoutImages => without_images += 1,
                TaskOutcome::Failed => {
                    without_images += 1;
                    errors += 1;
                }
            }
            parts.push(part);

            if self.config.progress_every > 0 && processed % self.config.progress_every == 0 {
                on_progress(EnrichProgress {
                    processed,
                    items_in_page,
                    with_images,
                    without_images,
                    errors,
                    concurrency: controller.current_limit(),
                });
            }
        }

        debug_assert_eq!(parts.len(), items_in_page);
        PageEnrichment { parts, with_images, without_images, errors }
    }

    async fn enrich_one(
        &self,
        record: PartRecord,
        controller: &AdaptiveConcurrencyController,
    ) -> (EnrichedPart, TaskOutcome) {
        let Some(part_id) = record.part_id.clone() else {
            debug!("Record without identifier, skipping image fetch");
            return (EnrichedPart::without_images(record), TaskOutcome::WithoutImages);
        };

        match timeout(
            self.config.task_deadline(),
            self.fetch_images_with_retry(&part_id, controller),
        )
        .await
        {
            Ok(Ok(images)) => {
                controller.record_success();
                let outcome = if images.is_empty() {
                    TaskOutcome::WithoutImages
                } else {
                    TaskOutcome::WithImages
                };
                (EnrichedPart::new(record, images), outcome)
            }
            Ok(Err(error)) => {
                warn!(part_id, %error, "Image enrichment failed, continuing without images");
                (EnrichedPart::without_images(record), TaskOutcome::Failed)
            }
            Err(_) => {
                warn!(
                    part_id,
                    deadline_ms = self.config.task_deadline_ms,
                    "Image task hit hard deadline, continuing without images"
                );
                (EnrichedPart::without_images(record), TaskOutcome::Failed)
            }
        }
    }

    /// Retry loop for one record's images. While the breaker is open the
    /// call returns empty immediately without touching the network.
    async fn fetch_images_with_retry(
        &self,
        part_id: &str,
        controller: &AdaptiveConcurrencyController,
    ) -> Result<Vec<PartImage>, ImageFetchError> {
        if controller.is_open() {
            debug!(part_id, "Circuit breaker open, skipping image fetch");
            return Ok(Vec::new());
        }

        let mut attempt: u32 = 0;
        loop {
            let result = match timeout(
                self.config.request_timeout(),
                self.api.fetch_images(part_id),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ImageFetchError::Timeout),
            };

            match result {
                Ok(mut images) => {
                    // Primary-first, capped at N. Sort is stable, so source
                    // order is preserved within each group.
                    images.sort_by_key(|image| !image.is_primary);
                    images.truncate(self.config.max_images_per_item);
                    return Ok(images);
                }
                Err(error) => {
                    if error.is_overload() {
                        controller.record_overload();
                    }
                    if self.policy.should_retry(attempt) {
                        sleep(self.policy.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    if error.is_overload() && controller.should_trip() {
                        controller.trip();
                    }
                    return Err(error);
                }
            }
        }
    }
}
