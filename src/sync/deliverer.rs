//! Batched delivery to the destination API.
//!
//! Enriched records are mapped to the destination schema and POSTed as JSON
//! arrays of up to `batch_size` records. Batches are tallied independently: a
//! batch that exhausts its retries counts entirely as failed and delivery
//! moves on, so `read == sent + failed` always holds at the end.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::events::DeliveryTotals;
use crate::domain::record::EnrichedPart;
use crate::infrastructure::config::DeliveryConfig;
use crate::infrastructure::http::HttpClient;
use crate::infrastructure::retry::RetryPolicy;
use crate::sync::error::{DeliveryError, ParseError, SinkError};
use crate::sync::mapping::{map_part, DestinationPart};

/// One POST attempt of a mapped batch. Retrying lives in [`BatchDeliverer`].
#[async_trait]
pub trait DestinationApi: Send + Sync {
    async fn push_batch(&self, batch: &[DestinationPart]) -> Result<Value, DeliveryError>;
}

/// Basic-auth JSON client for the destination batch endpoint.
pub struct DestinationClient {
    config: DeliveryConfig,
    http: HttpClient,
}

impl DestinationClient {
    pub fn new(config: DeliveryConfig) -> Result<Self, DeliveryError> {
        let http = HttpClient::new(config.request_timeout()).map_err(DeliveryError::from)?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl DestinationApi for DestinationClient {
    async fn push_batch(&self, batch: &[DestinationPart]) -> Result<Value, DeliveryError> {
        let response = self
            .http
            .post_json(
                &self.config.endpoint,
                batch,
                Some((&self.config.username, &self.config.password)),
            )
            .await?;
        Ok(response)
    }
}

pub struct BatchDeliverer {
    api: Arc<dyn DestinationApi>,
    config: DeliveryConfig,
    policy: RetryPolicy,
}

impl BatchDeliverer {
    pub fn new(api: Arc<dyn DestinationApi>, config: DeliveryConfig, policy: RetryPolicy) -> Self {
        Self { api, config, policy }
    }

    /// Deliver a stream of parsed records. Malformed items count as read and
    /// failed without ever reaching the wire; an optional `item_limit` caps
    /// how many items are consumed.
    pub async fn deliver<I>(&self, items: I) -> DeliveryTotals
    where
        I: IntoIterator<Item = Result<EnrichedPart, ParseError>>,
    {
        let mut totals = DeliveryTotals::default();
        let mut batch: Vec<DestinationPart> = Vec::with_capacity(self.config.batch_size);

        for item in items {
            if let Some(limit) = self.config.item_limit {
                if totals.read >= limit as u64 {
                    debug!(limit, "Item limit reached, stopping delivery early");
                    break;
                }
            }
            totals.read += 1;
            match item {
                Ok(part) => batch.push(map_part(&part, &self.config)),
                Err(error) => {
                    warn!(line = error.line, %error, "Skipping malformed record");
                    totals.failed += 1;
                    continue;
                }
            }
            if batch.len() >= self.config.batch_size {
                self.flush(&mut batch, &mut totals).await;
            }
        }
        self.flush(&mut batch, &mut totals).await;

        info!(
            read = totals.read,
            sent = totals.sent,
            failed = totals.failed,
            "Delivery pass complete"
        );
        totals
    }

    /// Replay the persisted enriched snapshot through the delivery path.
    pub async fn deliver_snapshot(&self, path: &Path) -> Result<DeliveryTotals, SinkError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| SinkError::new(path, error))?;
        let items = content.lines().enumerate().filter_map(|(index, line)| {
            if line.trim().is_empty() {
                return None;
            }
            Some(
                serde_json::from_str::<EnrichedPart>(line)
                    .map_err(|source| ParseError { line: index + 1, source }),
            )
        });
        Ok(self.deliver(items).await)
    }

    async fn flush(&self, batch: &mut Vec<DestinationPart>, totals: &mut DeliveryTotals) {
        if batch.is_empty() {
            return;
        }
        let size = batch.len() as u64;
        match self.push_with_retry(batch).await {
            Ok(()) => totals.sent += size,
            Err(error) => {
                warn!(size, %error, "Batch rejected after retries, counting as failed");
                totals.failed += size;
            }
        }
        batch.clear();
    }

    async fn push_with_retry(&self, batch: &[DestinationPart]) -> Result<(), DeliveryError> {
        let mut attempt: u32 = 0;
        loop {
            match self.api.push_batch(batch).await {
                Ok(_) => return Ok(()),
                Err(error) => {
                    if !self.policy.should_retry(attempt) {
                        return Err(error);
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "Batch delivery failed, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
