//! Per-file ingestion errors.

use std::path::PathBuf;

use thiserror::Error;
use vitals_core::store::BoxError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("parse error: {0}")]
  Parse(#[from] vitals_export::Error),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("ledger {path:?}: {source}")]
  Ledger {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub(crate) fn ledger(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Ledger { path: path.into(), source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
