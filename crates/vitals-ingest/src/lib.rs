//! File-level ingestion for vitals.
//!
//! Wraps a [`HealthStore`](vitals_core::store::HealthStore) with the pieces
//! that work on whole files: a stability check, a content fingerprint
//! ledger, an optional failure cap, and batch/folder ingestion.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod pipeline;
pub mod stability;

pub use config::{IngestConfig, IngestSettings, expand_tilde};
pub use error::{Error, Result};
pub use pipeline::{DropStats, FileResult, IngestReport, Ingestor};
