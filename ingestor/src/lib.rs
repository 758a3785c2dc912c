//! Storage monitor ingestion service.
//!
//! Agents POST free-space readings to `/receive_data`; each reading is
//! stored through a single-connection [`db::Gateway`] inside one
//! transaction. The export, report, setup and dump jobs reuse the same
//! gateway.

pub mod config;
pub mod db;
pub mod dump;
pub mod envelope;
pub mod errors;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod report;
pub mod rest;
pub mod schema;
pub mod validate;

pub use config::Config;
pub use db::Gateway;
pub use errors::{Error, Result};
