//! Error types for the export parsers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("zip archive error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("malformed XML: {0}")]
  Xml(#[from] quick_xml::Error),

  #[error("no export.xml entry in archive {}", .0.display())]
  MissingExportXml(PathBuf),

  #[error("invalid timestamp in {attribute}: {value:?}")]
  InvalidTimestamp {
    attribute: &'static str,
    value:     String,
  },

  #[error("invalid number in {attribute}: {value:?}")]
  InvalidNumber {
    attribute: &'static str,
    value:     String,
  },

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("unrecognized CSV format (columns: {columns})")]
  UnrecognizedFormat { columns: String },
}

impl From<quick_xml::events::attributes::AttrError> for Error {
  fn from(e: quick_xml::events::attributes::AttrError) -> Self { Self::Xml(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
