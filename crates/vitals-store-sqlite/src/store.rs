//! [`SqliteStore`], the SQLite implementation of [`HealthStore`].

use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use strum::IntoEnumIterator;
use tracing::debug;
use vitals_core::{
  canonical::{NormalizedRecord, SleepSegment, Table, TableCounts},
  store::{BoxError, HealthStore, IngestCounts, RecordSink, SinkError, WriteOutcome},
};

use crate::{
  Result,
  encode::{RawSegment, encode_dt, insert_record},
  schema::{self, PRAGMAS},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A canonical time-series store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and migrate it to the latest schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn };
    store.apply_pragmas().await?;
    store.migrate().await?;
    Ok(store)
  }

  async fn apply_pragmas(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Current `PRAGMA user_version`.
  pub async fn schema_version(&self) -> Result<u32> {
    Ok(self.conn.call(|conn| Ok(schema::schema_version(conn)?)).await?)
  }

  /// In-memory store migrated only up to `version`, reproducing an older
  /// on-disk layout.
  #[cfg(test)]
  pub(crate) async fn open_in_memory_at(version: u32) -> Result<Self> {
    let store = Self { conn: tokio_rusqlite::Connection::open_in_memory().await? };
    store.apply_pragmas().await?;
    store
      .conn
      .call(move |conn| Ok(schema::migrate_to(conn, version)?))
      .await?;
    Ok(store)
  }

  /// Run `f` directly against the connection. Test-only escape hatch.
  #[cfg(test)]
  pub(crate) async fn with_conn<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut Connection) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    Ok(self.conn.call(move |conn| Ok(f(conn)?)).await?)
  }
}

// ─── Transaction sink ────────────────────────────────────────────────────────

/// Sink bound to one open transaction.
///
/// A database failure is kept here and the producer only sees
/// [`SinkError`]; the store reports the real cause once the producer
/// returns.
struct TxSink<'c> {
  conn:    &'c Connection,
  counts:  IngestCounts,
  failure: Option<rusqlite::Error>,
}

impl<'c> TxSink<'c> {
  fn new(conn: &'c Connection) -> Self {
    Self { conn, counts: IngestCounts::default(), failure: None }
  }
}

impl RecordSink for TxSink<'_> {
  fn accept(&mut self, record: &NormalizedRecord) -> Result<bool, SinkError> {
    if self.failure.is_some() {
      return Err(SinkError);
    }

    match insert_record(self.conn, record) {
      Ok(true) => {
        self.counts.inserted.add(record.table(), 1);
        Ok(true)
      }
      Ok(false) => {
        debug!(key = %record.natural_key(), "duplicate record");
        self.counts.duplicates.add(record.table(), 1);
        Ok(false)
      }
      Err(e) => {
        self.failure = Some(e);
        Err(SinkError)
      }
    }
  }
}

// ─── HealthStore impl ────────────────────────────────────────────────────────

impl HealthStore for SqliteStore {
  type Error = crate::Error;

  async fn migrate(&self) -> Result<u32> {
    Ok(self.conn.call(|conn| Ok(schema::migrate(conn)?)).await?)
  }

  async fn ingest<F, T>(&self, produce: F) -> Result<WriteOutcome<T>>
  where
    F: FnOnce(&mut dyn RecordSink) -> Result<T, BoxError> + Send + 'static,
    T: Send + 'static,
  {
    self.migrate().await?;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut sink = TxSink::new(&tx);
        let produced = produce(&mut sink);
        let TxSink { counts, failure, .. } = sink;

        // Dropping `tx` without commit rolls it back.
        if let Some(e) = failure {
          return Err(e.into());
        }

        match produced {
          Ok(output) => {
            tx.commit()?;
            Ok(WriteOutcome::Committed { counts, output })
          }
          Err(cause) => {
            tx.rollback()?;
            Ok(WriteOutcome::RolledBack(cause))
          }
        }
      })
      .await?;

    Ok(outcome)
  }

  async fn table_counts(&self) -> Result<TableCounts> {
    let counts = self
      .conn
      .call(|conn| {
        let mut counts = TableCounts::default();
        for table in Table::iter() {
          let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            [],
            |row| row.get(0),
          )?;
          counts.add(table, n as u64);
        }
        Ok(counts)
      })
      .await?;

    Ok(counts)
  }

  async fn sleep_segments(&self, since: Option<NaiveDate>) -> Result<Vec<SleepSegment>> {
    let since_str = since
      .map(|d| encode_dt(d.and_time(NaiveTime::MIN).and_utc()))
      .unwrap_or_default();

    let raws: Vec<RawSegment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT stage, start_at, end_at, COALESCE(device, source)
           FROM sleep
           WHERE stage IS NOT NULL
             AND start_at IS NOT NULL
             AND end_at IS NOT NULL
             AND end_at > start_at
             AND start_at >= ?1
           ORDER BY start_at, end_at, stage, device",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![since_str], |row| {
            Ok(RawSegment {
              stage:  row.get(0)?,
              start:  row.get(1)?,
              end:    row.get(2)?,
              device: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSegment::into_segment).collect()
  }
}
