//! `vitals` binary.
//!
//! Reads `vitals.toml` (or the path given with `--config`) plus `VITALS_*`
//! environment overrides, opens the SQLite store and runs one command. Every
//! command prints its result as JSON on stdout.

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vitals_core::{record::SourceKind, sleep::nightly_summaries, store::HealthStore};
use vitals_ingest::{FileResult, IngestSettings, Ingestor};
use vitals_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Ingest wearable and health exports into SQLite")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vitals.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Ingest a single export file.
  Ingest {
    path: PathBuf,
    /// apple_health, whoop, oura or fitbit.
    #[arg(long)]
    kind: SourceKind,
  },
  /// Ingest every export of one kind directly inside a folder.
  IngestFolder {
    dir:  PathBuf,
    #[arg(long)]
    kind: SourceKind,
  },
  /// Schema version, row counts and ledger size.
  Status,
  /// Nightly sleep summaries.
  Sleep {
    /// Only nights on or after this date (YYYY-MM-DD).
    #[arg(long)]
    since: Option<NaiveDate>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = IngestSettings::load(&cli.config)
    .context("failed to read configuration")?
    .expanded();

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  let mut ingestor = Ingestor::open(
    store,
    settings.ingest_config(),
    &settings.ledger_path,
    &settings.failures_path,
  )
  .context("failed to load ledgers")?;

  let output = match cli.command {
    Command::Ingest { path, kind } => {
      let report = ingestor
        .ingest_file(&path, kind)
        .await
        .with_context(|| format!("failed to ingest {path:?}"))?;
      json!({ "path": path, "report": report })
    }
    Command::IngestFolder { dir, kind } => {
      let results = ingestor
        .ingest_folder(&dir, kind)
        .await
        .with_context(|| format!("failed to list {dir:?}"))?;
      Value::Array(results.iter().map(file_result_json).collect())
    }
    Command::Status => {
      let store = ingestor.store();
      json!({
        "schema_version": store.migrate().await?,
        "tables":         store.table_counts().await?,
        "fingerprints":   ingestor.fingerprints().len(),
      })
    }
    Command::Sleep { since } => {
      let segments = ingestor.store().sleep_segments(since).await?;
      serde_json::to_value(nightly_summaries(&segments))?
    }
  };

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

fn file_result_json(entry: &FileResult) -> Value {
  match &entry.result {
    Ok(report) => json!({ "path": entry.path, "report": report }),
    Err(e) => json!({ "path": entry.path, "error": e.to_string() }),
  }
}
