//! Error types for `vitals-core`.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("interval [{start}, {end}) is empty or inverted")]
  EmptyInterval {
    start: DateTime<Utc>,
    end:   DateTime<Utc>,
  },

  #[error("unknown sleep stage: {0:?}")]
  UnknownSleepStage(String),

  #[error("unknown source kind: {0:?}")]
  UnknownSource(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
