//! Synchronization pipeline.
//!
//! Components in dependency order: the adaptive concurrency controller, the
//! source seam and page fetcher, the image enricher, the dual NDJSON sink,
//! destination mapping, the batch deliverer, and the orchestrator composing
//! them per page.

pub mod concurrency;
pub mod deliverer;
pub mod enricher;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod page_fetcher;
pub mod sink;
pub mod source;
