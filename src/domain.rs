//! Domain module - Core data model of the synchronization pipeline
//!
//! Contains the record/image/enriched-record types flowing through the
//! pipeline and the progress/result types exposed to consumers.

pub mod events;
pub mod record;
