//! Infrastructure layer - configuration, HTTP access, retry policy, logging.
//!
//! External integrations and cross-cutting concerns shared by the pipeline
//! components in `sync`.

pub mod config;
pub mod http;
pub mod logging;
pub mod retry;
