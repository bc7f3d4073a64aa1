//! Sequential page fetching with retry.
//!
//! Exactly one page request is in flight at a time, driven by a single
//! cursor. Failed attempts back off exponentially with jitter; a page that
//! exhausts its budget surfaces a `FetchError` and the orchestrator decides
//! how to advance.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::infrastructure::retry::RetryPolicy;
use crate::sync::error::FetchError;
use crate::sync::source::{PageCursor, PageEnvelope, SourceApi};

pub struct PageFetcher {
    api: Arc<dyn SourceApi>,
    policy: RetryPolicy,
}

impl PageFetcher {
    pub fn new(api: Arc<dyn SourceApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    /// Fetch one page, retrying every failure class (non-success status,
    /// timeout, network error) up to the policy's budget.
    pub async fn fetch_page(&self, cursor: &PageCursor) -> Result<PageEnvelope, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            match self.api.fetch_page(cursor).await {
                Ok(envelope) => {
                    if attempt > 0 {
                        info!(
                            page = envelope.links.current_page,
                            attempt = attempt + 1,
                            "Source page fetched after retries"
                        );
                    }
                    return Ok(envelope);
                }
                Err(error) => {
                    if !self.policy.should_retry(attempt) {
                        return Err(error);
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "Source page fetch failed, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
