//! The per-file ingestion state machine.
//!
//! A file moves `Unseen → Stable → Parsed` and then ends `Recorded` (its
//! fingerprint appended to the ledger) or `Failed` (nothing appended, so a
//! later run retries it). Parsing happens inside the store's write
//! transaction: records stream from the file straight into the database and
//! a failure anywhere rolls the whole file back.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, warn};
use vitals_core::{
  normalize::{Dropped, normalize},
  record::SourceKind,
  store::{BoxError, HealthStore, IngestCounts, RecordSink, WriteOutcome},
};

use crate::{
  Error, Result,
  config::IngestConfig,
  fingerprint::fingerprint_file,
  ledger::{FailureLedger, FingerprintLedger},
  stability::is_stable,
};

/// Per-file progress: `info` normally, `debug` when quiet.
macro_rules! progress {
  ($quiet:expr, $($arg:tt)+) => {
    if $quiet {
      tracing::debug!($($arg)+)
    } else {
      tracing::info!($($arg)+)
    }
  };
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Raw records that produced no canonical rows, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropStats {
  pub total:     u64,
  pub by_reason: BTreeMap<&'static str, u64>,
}

impl DropStats {
  fn add(&mut self, dropped: &Dropped) {
    self.total += 1;
    *self.by_reason.entry(dropped.reason()).or_default() += 1;
  }
}

/// What happened to one file that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestReport {
  /// Parsed and committed; the fingerprint is now in the ledger.
  Recorded {
    fingerprint: String,
    counts:      IngestCounts,
    dropped:     DropStats,
  },
  /// Byte-identical to a file already recorded. Nothing was read.
  Duplicate { fingerprint: String },
  /// Empty or still growing. Nothing was read.
  Unstable,
  /// Failed too many times; skipped until the failure ledger is cleared.
  Quarantined { fingerprint: String, attempts: u32 },
}

/// Outcome of one file in a batch.
#[derive(Debug)]
pub struct FileResult {
  pub path:   PathBuf,
  pub result: Result<IngestReport>,
}

// ─── Ingestor ────────────────────────────────────────────────────────────────

/// Ingests export files one at a time into a [`HealthStore`].
pub struct Ingestor<S> {
  store:        S,
  config:       IngestConfig,
  fingerprints: FingerprintLedger,
  failures:     FailureLedger,
}

impl<S: HealthStore> Ingestor<S> {
  pub fn new(
    store: S,
    config: IngestConfig,
    fingerprints: FingerprintLedger,
    failures: FailureLedger,
  ) -> Self {
    Self { store, config, fingerprints, failures }
  }

  /// Load both ledgers from disk and wrap `store`.
  pub fn open(
    store: S,
    config: IngestConfig,
    ledger_path: &Path,
    failures_path: &Path,
  ) -> Result<Self> {
    Ok(Self::new(
      store,
      config,
      FingerprintLedger::load(ledger_path)?,
      FailureLedger::load(failures_path)?,
    ))
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn fingerprints(&self) -> &FingerprintLedger { &self.fingerprints }

  /// Ingest one export file.
  ///
  /// `Err` means the file failed: nothing it contained was kept and its
  /// fingerprint was not recorded.
  pub async fn ingest_file(&mut self, path: &Path, kind: SourceKind) -> Result<IngestReport> {
    let quiet = self.config.quiet;

    if !is_stable(path, self.config.stability_window).await? {
      progress!(quiet, path = %path.display(), "file is empty or still changing; skipped");
      return Ok(IngestReport::Unstable);
    }

    let fingerprint = fingerprint_file(path).await?;
    if self.fingerprints.contains(&fingerprint) {
      progress!(quiet, path = %path.display(), %fingerprint, "file already ingested");
      return Ok(IngestReport::Duplicate { fingerprint });
    }

    let attempts = self.failures.attempts(&fingerprint);
    if let Some(limit) = self.config.max_attempts
      && attempts >= limit
    {
      warn!(path = %path.display(), %fingerprint, attempts, "file quarantined after repeated failures");
      return Ok(IngestReport::Quarantined { fingerprint, attempts });
    }

    debug!(path = %path.display(), %fingerprint, %kind, "file stable; parsing");
    match self.write(path, kind).await {
      Ok((counts, dropped)) => {
        self.fingerprints.append(&fingerprint)?;
        self.failures.clear(&fingerprint)?;

        if dropped.total > 0 {
          warn!(path = %path.display(), dropped = dropped.total, reasons = ?dropped.by_reason, "records dropped");
        }
        progress!(
          quiet,
          path = %path.display(),
          inserted = counts.inserted.total(),
          duplicates = counts.duplicates.total(),
          "file recorded"
        );
        Ok(IngestReport::Recorded { fingerprint, counts, dropped })
      }
      Err(e) => {
        let attempts = self
          .failures
          .record_failure(&fingerprint)
          .unwrap_or_else(|ledger_err| {
            warn!(%fingerprint, error = %ledger_err, "failed to record ingestion failure");
            self.failures.attempts(&fingerprint)
          });
        warn!(path = %path.display(), %fingerprint, attempts, error = %e, "ingestion failed; nothing recorded");
        Err(e)
      }
    }
  }

  /// Ingest `paths` in order. Every file gets a result; one failure does not
  /// stop the rest.
  pub async fn ingest_batch<I, P>(&mut self, paths: I, kind: SourceKind) -> Vec<FileResult>
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    let mut results = Vec::new();
    for path in paths {
      let path = path.into();
      let result = self.ingest_file(&path, kind).await;
      results.push(FileResult { path, result });
    }
    results
  }

  /// Ingest every export of `kind` directly inside `dir`, in file-name
  /// order.
  pub async fn ingest_folder(&mut self, dir: &Path, kind: SourceKind) -> Result<Vec<FileResult>> {
    let files = vitals_export::export_files_in(dir, kind)?;
    debug!(dir = %dir.display(), files = files.len(), "ingesting folder");
    Ok(self.ingest_batch(files, kind).await)
  }

  async fn write(&self, path: &Path, kind: SourceKind) -> Result<(IngestCounts, DropStats)> {
    let path = path.to_path_buf();
    let outcome = self
      .store
      .ingest(move |sink| produce(&path, kind, sink))
      .await
      .map_err(Error::store)?;

    match outcome {
      WriteOutcome::Committed { counts, output } => Ok((counts, output)),
      WriteOutcome::RolledBack(cause) => Err(match cause.downcast::<vitals_export::Error>() {
        Ok(parse) => Error::Parse(*parse),
        Err(other) => Error::Store(other),
      }),
    }
  }
}

/// Parse, normalize and sink every record of one file.
fn produce(path: &Path, kind: SourceKind, sink: &mut dyn RecordSink) -> Result<DropStats, BoxError> {
  let mut dropped = DropStats::default();
  vitals_export::for_each_record(path, kind, |raw| -> Result<(), BoxError> {
    match normalize(&raw) {
      Ok(records) => {
        for record in &records {
          sink.accept(record)?;
        }
      }
      Err(reason) => {
        debug!(metric = %raw.metric, ?reason, "record dropped");
        dropped.add(&reason);
      }
    }
    Ok(())
  })?;
  Ok(dropped)
}
