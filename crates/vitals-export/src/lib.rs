//! Parsers for wearable and health-app exports.
//!
//! Every parser yields [`RawRecord`]s lazily and never holds a whole export
//! in memory. Pure synchronous; no database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use vitals_export::{AppleExport, TabularRecords};
//!
//! let mut export = AppleExport::open("export.zip").unwrap();
//! for record in export.records().unwrap() {
//!   println!("{:?}", record.unwrap().metric);
//! }
//!
//! let rows = TabularRecords::open("physiological_cycles.csv", None).unwrap();
//! println!("{} rows", rows.count());
//! ```

pub mod apple;
pub mod error;
pub mod fitbit;
pub mod tabular;
pub mod timestamp;

use std::path::{Path, PathBuf};

pub use apple::{AppleExport, RecordStream};
pub use error::{Error, Result};
pub use fitbit::{FitbitExport, FitbitRecords};
pub use tabular::{TabularKind, TabularRecords, csv_files_in};
use vitals_core::record::{RawRecord, SourceKind};
use walkdir::WalkDir;

/// Stream every raw record of the export at `path` into `each`.
///
/// `kind` selects the parser: Apple Health exports are XML (optionally
/// zipped); Whoop and Oura exports are CSV, with `kind` restricting
/// classification to that vendor; Fitbit exports are zips of JSON files. Stops at the first error, whether raised
/// by the parser or by `each`.
pub fn for_each_record<F, E>(path: &Path, kind: SourceKind, mut each: F) -> Result<(), E>
where
  F: FnMut(RawRecord) -> Result<(), E>,
  E: From<Error>,
{
  match kind {
    SourceKind::AppleHealth => {
      let mut export = AppleExport::open(path)?;
      for record in export.records()? {
        each(record?)?;
      }
    }
    SourceKind::Whoop | SourceKind::Oura => {
      for record in TabularRecords::open(path, Some(kind))? {
        each(record?)?;
      }
    }
    SourceKind::Fitbit => {
      let mut export = FitbitExport::open(path)?;
      for record in export.records() {
        each(record?)?;
      }
    }
  }
  Ok(())
}

/// The export files of `kind` directly inside `dir`, sorted by file name.
///
/// Apple Health exports are `*.zip` or `*.xml`; Whoop and Oura exports are
/// `*.csv`; Fitbit exports are `*.zip`.
pub fn export_files_in(dir: &Path, kind: SourceKind) -> Result<Vec<PathBuf>> {
  match kind {
    SourceKind::AppleHealth => files_with_extension(dir, &["zip", "xml"]),
    SourceKind::Whoop | SourceKind::Oura => files_with_extension(dir, &["csv"]),
    SourceKind::Fitbit => files_with_extension(dir, &["zip"]),
  }
}

fn files_with_extension(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  for entry in WalkDir::new(dir)
    .min_depth(1)
    .max_depth(1)
    .sort_by_file_name()
  {
    let entry = entry.map_err(std::io::Error::from)?;
    let matches = entry
      .path()
      .extension()
      .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)));
    if entry.file_type().is_file() && matches {
      files.push(entry.into_path());
    }
  }
  Ok(files)
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn apple_folder_lists_zip_and_xml_only() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.zip", "a.xml", "c.csv", "notes.txt"] {
      fs::write(dir.path().join(name), "x").unwrap();
    }

    let names: Vec<_> = export_files_in(dir.path(), SourceKind::AppleHealth)
      .unwrap()
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["a.xml", "b.zip"]);

    let csv = export_files_in(dir.path(), SourceKind::Whoop).unwrap();
    assert_eq!(csv.len(), 1);

    let zips = export_files_in(dir.path(), SourceKind::Fitbit).unwrap();
    assert_eq!(zips, vec![dir.path().join("b.zip")]);
  }
}
