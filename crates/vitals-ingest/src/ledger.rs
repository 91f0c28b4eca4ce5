//! On-disk ledgers kept next to the database.
//!
//! [`FingerprintLedger`] lists every file that was fully ingested, one hex
//! digest per line, append-only. [`FailureLedger`] counts failed attempts
//! per fingerprint as a JSON object.

use std::{
  collections::{BTreeMap, HashSet},
  fs::{self, OpenOptions},
  io::{self, Write},
  path::{Path, PathBuf},
};

use crate::{Error, Result};

fn ensure_parent(path: &Path) -> io::Result<()> {
  match path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
    _ => Ok(()),
  }
}

fn read_if_exists(path: &Path) -> io::Result<Option<String>> {
  match fs::read_to_string(path) {
    Ok(text) => Ok(Some(text)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

// ─── Fingerprints ────────────────────────────────────────────────────────────

/// Fingerprints of completed files.
#[derive(Debug)]
pub struct FingerprintLedger {
  path: PathBuf,
  seen: HashSet<String>,
}

impl FingerprintLedger {
  /// Load the ledger at `path`; a missing file is an empty ledger.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let text = read_if_exists(&path).map_err(|e| Error::ledger(&path, e))?;
    let seen = text
      .unwrap_or_default()
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_owned)
      .collect();
    Ok(Self { path, seen })
  }

  pub fn contains(&self, fingerprint: &str) -> bool { self.seen.contains(fingerprint) }

  pub fn len(&self) -> usize { self.seen.len() }

  pub fn is_empty(&self) -> bool { self.seen.is_empty() }

  /// Append `fingerprint` and flush it to disk. Already-present entries are
  /// not written twice.
  pub fn append(&mut self, fingerprint: &str) -> Result<()> {
    if self.contains(fingerprint) {
      return Ok(());
    }

    let write = || -> io::Result<()> {
      ensure_parent(&self.path)?;
      let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
      writeln!(file, "{fingerprint}")?;
      file.sync_data()
    };
    write().map_err(|e| Error::ledger(&self.path, e))?;

    self.seen.insert(fingerprint.to_owned());
    Ok(())
  }
}

// ─── Failures ────────────────────────────────────────────────────────────────

/// Failed-attempt counters keyed by fingerprint.
#[derive(Debug)]
pub struct FailureLedger {
  path:     PathBuf,
  attempts: BTreeMap<String, u32>,
}

impl FailureLedger {
  /// Load the ledger at `path`; a missing file is an empty ledger.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let attempts = match read_if_exists(&path).map_err(|e| Error::ledger(&path, e))? {
      Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)?,
      _ => BTreeMap::new(),
    };
    Ok(Self { path, attempts })
  }

  pub fn attempts(&self, fingerprint: &str) -> u32 {
    self.attempts.get(fingerprint).copied().unwrap_or(0)
  }

  /// Count one more failure for `fingerprint`; returns the new total.
  pub fn record_failure(&mut self, fingerprint: &str) -> Result<u32> {
    let n = self.attempts.entry(fingerprint.to_owned()).or_default();
    *n += 1;
    let total = *n;
    self.save()?;
    Ok(total)
  }

  /// Forget `fingerprint` after it finally succeeded.
  pub fn clear(&mut self, fingerprint: &str) -> Result<()> {
    if self.attempts.remove(fingerprint).is_some() {
      self.save()?;
    }
    Ok(())
  }

  /// Rewrite the whole map through a sibling temp file.
  fn save(&self) -> Result<()> {
    let json = serde_json::to_string_pretty(&self.attempts)?;
    let tmp = self.path.with_extension("json.tmp");
    let write = || -> io::Result<()> {
      ensure_parent(&self.path)?;
      fs::write(&tmp, json.as_bytes())?;
      fs::rename(&tmp, &self.path)
    };
    write().map_err(|e| Error::ledger(&self.path, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fingerprints_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/processed.txt");

    let mut ledger = FingerprintLedger::load(&path).unwrap();
    assert!(ledger.is_empty());
    ledger.append("aa").unwrap();
    ledger.append("bb").unwrap();
    ledger.append("aa").unwrap();

    let reloaded = FingerprintLedger::load(&path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.contains("aa"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "aa\nbb\n");
  }

  #[test]
  fn failures_count_up_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failures.json");

    let mut ledger = FailureLedger::load(&path).unwrap();
    assert_eq!(ledger.record_failure("aa").unwrap(), 1);
    assert_eq!(ledger.record_failure("aa").unwrap(), 2);
    assert_eq!(FailureLedger::load(&path).unwrap().attempts("aa"), 2);

    ledger.clear("aa").unwrap();
    assert_eq!(FailureLedger::load(&path).unwrap().attempts("aa"), 0);
  }

  #[test]
  fn corrupt_failure_ledger_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failures.json");
    fs::write(&path, "{not json").unwrap();

    assert!(matches!(FailureLedger::load(&path), Err(Error::Json(_))));
  }
}
