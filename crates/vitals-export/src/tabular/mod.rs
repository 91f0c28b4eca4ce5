//! Whoop and Oura CSV exports.
//!
//! A file is classified once from its header row, then read row by row.
//! Each row becomes one [`RawRecord`] carrying the row's numeric fields as
//! [`Reading`](vitals_core::record::Reading)s.

mod header;
mod kind;

use std::{
  fs::File,
  io::Read,
  path::{Path, PathBuf},
};

use csv::StringRecord;
use tracing::debug;
use vitals_core::record::{RawRecord, SourceKind};

pub use self::{
  header::{Header, normalize_header},
  kind::{Column, Layout, TabularKind},
};
use crate::{error::Result, timestamp};

/// Streaming reader over one classified CSV export.
pub struct TabularRecords<R> {
  kind:   TabularKind,
  header: Header,
  reader: csv::Reader<R>,
  row:    StringRecord,
}

impl TabularRecords<File> {
  /// Open and classify the CSV at `path`.
  pub fn open(path: impl AsRef<Path>, hint: Option<SourceKind>) -> Result<Self> {
    Self::from_reader(File::open(path)?, hint)
  }
}

impl<R: Read> TabularRecords<R> {
  pub fn from_reader(input: R, hint: Option<SourceKind>) -> Result<Self> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(input);
    let header = Header::from(reader.headers()?);
    let kind = TabularKind::classify(&header, hint)?;
    debug!(%kind, "classified CSV export");

    Ok(Self { kind, header, reader, row: StringRecord::new() })
  }

  pub fn kind(&self) -> TabularKind { self.kind }

  fn build(&self) -> Option<RawRecord> {
    let layout = self.kind.layout()?;
    let recorded_at = self
      .header
      .first_text(&self.row, layout.recorded)
      .and_then(timestamp::parse_vendor)?;
    let bound = |aliases: &[&str]| {
      self
        .header
        .first_text(&self.row, aliases)
        .and_then(timestamp::parse_vendor)
    };
    let source = self.kind.source();

    let mut raw = RawRecord::new(
      source,
      layout.category,
      layout.metric,
      bound(layout.start).unwrap_or(recorded_at),
    );
    raw.end = bound(layout.end);
    raw.recorded_at = recorded_at;
    raw.device = Some(source.as_str().to_owned());
    raw.readings = layout
      .columns
      .iter()
      .filter_map(|column| self.header.coalesce(&self.row, column))
      .collect();

    Some(raw)
  }
}

impl<R: Read> Iterator for TabularRecords<R> {
  type Item = Result<RawRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    // Kinds without a table still read every row so ragged input fails.
    loop {
      match self.reader.read_record(&mut self.row) {
        Ok(true) => match self.build() {
          Some(raw) => return Some(Ok(raw)),
          None => continue,
        },
        Ok(false) => return None,
        Err(e) => return Some(Err(e.into())),
      }
    }
  }
}

/// The `*.csv` files directly inside `dir`, sorted by file name.
pub fn csv_files_in(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
  crate::files_with_extension(dir.as_ref(), &["csv"])
}
