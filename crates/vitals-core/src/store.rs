//! The `HealthStore` trait and its write-side contract.
//!
//! The trait is implemented by storage backends (e.g. `vitals-store-sqlite`).
//! The ingestion pipeline depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::canonical::{NormalizedRecord, SleepSegment, TableCounts};

/// Type-erased failure raised by a record producer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ─── Sink ────────────────────────────────────────────────────────────────────

/// Returned to a producer when the sink itself failed.
///
/// The underlying cause stays with the store, which reports it as its own
/// error type once the producer returns.
#[derive(Debug, Error)]
#[error("record sink failed; the write transaction will be rolled back")]
pub struct SinkError;

/// Insert-if-absent destination for canonical records within one
/// transaction.
pub trait RecordSink {
  /// Insert `record` unless a row with the same natural key exists.
  ///
  /// Returns `true` if a row was added, `false` for a duplicate. Existing
  /// rows are never overwritten.
  fn accept(&mut self, record: &NormalizedRecord) -> Result<bool, SinkError>;
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Per-table insert and duplicate tallies of one write transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
  pub inserted:   TableCounts,
  pub duplicates: TableCounts,
}

/// Result of [`HealthStore::ingest`] when the database itself did not fail.
#[derive(Debug)]
pub enum WriteOutcome<T> {
  /// The producer finished; all accepted records are committed.
  Committed { counts: IngestCounts, output: T },
  /// The producer failed; nothing from this transaction was kept.
  RolledBack(BoxError),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a canonical time-series store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait HealthStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Bring the schema to the latest version. Idempotent. Returns the
  /// resulting schema version.
  fn migrate(&self) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  /// Run `produce` inside a single write transaction.
  ///
  /// The transaction commits if `produce` returns `Ok` and rolls back if it
  /// returns `Err` or if the sink fails. `produce` runs on the store's own
  /// thread, so it may block on file I/O.
  fn ingest<F, T>(
    &self,
    produce: F,
  ) -> impl Future<Output = Result<WriteOutcome<T>, Self::Error>> + Send + '_
  where
    F: FnOnce(&mut dyn RecordSink) -> Result<T, BoxError> + Send + 'static,
    T: Send + 'static;

  /// Row count of every canonical table.
  fn table_counts(&self) -> impl Future<Output = Result<TableCounts, Self::Error>> + Send + '_;

  /// Stored sleep rows that form a valid interval, optionally only those
  /// starting on or after `since` (UTC).
  fn sleep_segments(
    &self,
    since: Option<NaiveDate>,
  ) -> impl Future<Output = Result<Vec<SleepSegment>, Self::Error>> + Send + '_;
}
