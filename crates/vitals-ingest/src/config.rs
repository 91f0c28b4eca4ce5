//! Runtime settings, read from an optional TOML file and `VITALS_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;

/// Settings for the `vitals` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSettings {
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  #[serde(default = "default_ledger_path")]
  pub ledger_path:         PathBuf,
  #[serde(default = "default_failures_path")]
  pub failures_path:       PathBuf,
  #[serde(default = "default_stability_window_ms")]
  pub stability_window_ms: u64,
  #[serde(default)]
  pub max_attempts:        Option<u32>,
  #[serde(default)]
  pub quiet:               bool,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/vitals/vitals.db") }

fn default_ledger_path() -> PathBuf { PathBuf::from("~/.local/share/vitals/processed.txt") }

fn default_failures_path() -> PathBuf { PathBuf::from("~/.local/share/vitals/failures.json") }

fn default_stability_window_ms() -> u64 { 2_000 }

impl IngestSettings {
  /// Layer `file` (if present) under the `VITALS_*` environment.
  pub fn load(file: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(config::Environment::with_prefix("VITALS"))
      .build()?
      .try_deserialize()
  }

  /// The same settings with `~` expanded in every path.
  pub fn expanded(mut self) -> Self {
    self.store_path = expand_tilde(&self.store_path);
    self.ledger_path = expand_tilde(&self.ledger_path);
    self.failures_path = expand_tilde(&self.failures_path);
    self
  }

  pub fn ingest_config(&self) -> IngestConfig {
    IngestConfig {
      stability_window: Duration::from_millis(self.stability_window_ms),
      max_attempts:     self.max_attempts,
      quiet:            self.quiet,
    }
  }
}

/// Behaviour knobs handed to the [`Ingestor`](crate::Ingestor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
  /// How long a file's size must stay unchanged before it is read.
  pub stability_window: Duration,
  /// Quarantine a file after this many failed attempts; `None` retries
  /// forever.
  pub max_attempts:     Option<u32>,
  /// Log per-file progress at `debug` instead of `info`.
  pub quiet:            bool,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      stability_window: Duration::from_millis(default_stability_window_ms()),
      max_attempts:     None,
      quiet:            false,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("vitals.toml");
    std::fs::write(
      &file,
      "store_path = \"/data/vitals.db\"\nmax_attempts = 3\nstability_window_ms = 0\n",
    )
    .unwrap();

    let settings = IngestSettings::load(&file).unwrap();
    assert_eq!(settings.store_path, PathBuf::from("/data/vitals.db"));
    assert_eq!(settings.max_attempts, Some(3));
    assert!(!settings.quiet);

    let config = settings.ingest_config();
    assert_eq!(config.stability_window, Duration::ZERO);
    assert_eq!(config.max_attempts, Some(3));
  }

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = IngestSettings::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings.stability_window_ms, 2_000);
    assert_eq!(settings.max_attempts, None);
    assert!(settings.ledger_path.ends_with("processed.txt"));
  }

  #[test]
  fn tilde_expands_against_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
