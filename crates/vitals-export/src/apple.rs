//! Streaming parser for Apple Health exports.
//!
//! An export is `export.zip` containing `apple_health_export/export.xml`, or
//! the bare `export.xml`. The document can be several gigabytes, so it is
//! read with `quick-xml`'s pull reader and a single reused event buffer:
//! memory is bounded by the largest element, not by the file.

use std::{
  fs::File,
  io::{BufRead, BufReader},
  path::{Path, PathBuf},
};

use quick_xml::{
  Reader,
  events::{BytesStart, Event},
};
use tracing::debug;
use vitals_core::record::{Category, Field, RawRecord, Reading, SourceKind, Unit};
use zip::ZipArchive;

use crate::{
  error::{Error, Result},
  timestamp,
};

const EXPORT_ENTRY_SUFFIX: &str = "export.xml";

/// Type identifiers with a canonical table.
const RECORD_TYPES: &[(&str, Category, &str)] = &[
  ("HKQuantityTypeIdentifierHeartRate", Category::HeartRate, "heart_rate"),
  ("HKQuantityTypeIdentifierRestingHeartRate", Category::HeartRate, "resting_heart_rate"),
  (
    "HKQuantityTypeIdentifierWalkingHeartRateAverage",
    Category::HeartRate,
    "walking_heart_rate_avg",
  ),
  ("HKQuantityTypeIdentifierRespiratoryRate", Category::HeartRate, "respiratory_rate"),
  ("HKQuantityTypeIdentifierHeartRateVariabilitySDNN", Category::Hrv, "hrv_sdnn"),
  ("HKCategoryTypeIdentifierSleepAnalysis", Category::Sleep, "sleep_analysis"),
];

// ─── Container ───────────────────────────────────────────────────────────────

enum Container {
  Xml,
  Zip {
    archive: ZipArchive<BufReader<File>>,
    entry:   String,
  },
}

/// An opened Apple Health export, ready to stream.
pub struct AppleExport {
  path:      PathBuf,
  container: Container,
}

impl AppleExport {
  /// Open `path`, treating `*.zip` as an archive and anything else as the
  /// bare XML document.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let is_zip = path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    let container = if is_zip {
      let archive = ZipArchive::new(BufReader::new(File::open(&path)?))?;
      let entry = archive
        .file_names()
        .filter(|name| !name.starts_with("__MACOSX"))
        .find(|name| name.ends_with(EXPORT_ENTRY_SUFFIX))
        .map(str::to_owned)
        .ok_or_else(|| Error::MissingExportXml(path.clone()))?;
      Container::Zip { archive, entry }
    } else {
      Container::Xml
    };

    Ok(Self { path, container })
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Stream the export's records in document order.
  ///
  /// Each call starts again from the beginning of the document.
  pub fn records(&mut self) -> Result<RecordStream<Box<dyn BufRead + '_>>> {
    let input: Box<dyn BufRead + '_> = match &mut self.container {
      Container::Xml => Box::new(BufReader::new(File::open(&self.path)?)),
      Container::Zip { archive, entry } => Box::new(BufReader::new(archive.by_name(entry)?)),
    };
    Ok(RecordStream::new(input))
  }
}

// ─── Stream ──────────────────────────────────────────────────────────────────

/// Lazy, finite sequence of raw records pulled from an export document.
///
/// Unknown record types are skipped. The first error ends the stream.
pub struct RecordStream<R> {
  reader:   Reader<R>,
  buf:      Vec<u8>,
  finished: bool,
}

impl<R: BufRead> RecordStream<R> {
  pub fn new(input: R) -> Self {
    Self { reader: Reader::from_reader(input), buf: Vec::new(), finished: false }
  }

  #[cfg(test)]
  fn buffer_capacity(&self) -> usize { self.buf.capacity() }
}

impl<R: BufRead> Iterator for RecordStream<R> {
  type Item = Result<RawRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    loop {
      self.buf.clear();
      let item = match self.reader.read_event_into(&mut self.buf) {
        Ok(Event::Start(e) | Event::Empty(e)) => match e.name().as_ref() {
          b"Record" => ElementAttrs::read(&e).and_then(record).transpose(),
          b"Workout" => Some(ElementAttrs::read(&e).and_then(workout)),
          _ => None,
        },
        Ok(Event::Eof) => {
          self.finished = true;
          return None;
        }
        Ok(_) => None,
        Err(e) => Some(Err(Error::Xml(e))),
      };

      if let Some(item) = item {
        self.finished = item.is_err();
        return Some(item);
      }
    }
  }
}

// ─── Element mapping ─────────────────────────────────────────────────────────

/// The attributes of `<Record>` and `<Workout>` that are used.
#[derive(Debug, Default)]
struct ElementAttrs {
  kind:          Option<String>,
  value:         Option<String>,
  unit:          Option<String>,
  start_date:    Option<String>,
  end_date:      Option<String>,
  source_name:   Option<String>,
  activity:      Option<String>,
  duration:      Option<String>,
  duration_unit: Option<String>,
  distance:      Option<String>,
  distance_unit: Option<String>,
  energy:        Option<String>,
  energy_unit:   Option<String>,
}

impl ElementAttrs {
  fn read(e: &BytesStart<'_>) -> Result<Self> {
    let mut out = Self::default();
    for attr in e.attributes() {
      let attr = attr?;
      let slot = match attr.key.as_ref() {
        b"type" => &mut out.kind,
        b"value" => &mut out.value,
        b"unit" => &mut out.unit,
        b"startDate" => &mut out.start_date,
        b"endDate" => &mut out.end_date,
        b"sourceName" => &mut out.source_name,
        b"workoutActivityType" => &mut out.activity,
        b"duration" => &mut out.duration,
        b"durationUnit" => &mut out.duration_unit,
        b"totalDistance" => &mut out.distance,
        b"totalDistanceUnit" => &mut out.distance_unit,
        b"totalEnergyBurned" => &mut out.energy,
        b"totalEnergyBurnedUnit" => &mut out.energy_unit,
        _ => continue,
      };
      *slot = Some(attr.unescape_value()?.into_owned());
    }
    Ok(out)
  }

  fn start(&self) -> Result<chrono::DateTime<chrono::Utc>> {
    let value = self.start_date.as_deref().unwrap_or_default();
    timestamp::parse_apple(value).ok_or_else(|| Error::InvalidTimestamp {
      attribute: "startDate",
      value:     value.to_owned(),
    })
  }

  fn end(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    self
      .end_date
      .as_deref()
      .map(|value| {
        timestamp::parse_apple(value).ok_or_else(|| Error::InvalidTimestamp {
          attribute: "endDate",
          value:     value.to_owned(),
        })
      })
      .transpose()
  }
}

fn number(value: &str, attribute: &'static str) -> Result<f64> {
  value
    .trim()
    .parse()
    .map_err(|_| Error::InvalidNumber { attribute, value: value.to_owned() })
}

fn record(attrs: ElementAttrs) -> Result<Option<RawRecord>> {
  let Some(kind) = attrs.kind.as_deref() else {
    return Ok(None);
  };
  let Some(&(_, category, metric)) = RECORD_TYPES.iter().find(|(id, ..)| *id == kind) else {
    debug!(kind, "skipping unmapped record type");
    return Ok(None);
  };

  let mut raw = RawRecord::new(SourceKind::AppleHealth, category, metric, attrs.start()?);
  raw.end = attrs.end()?;

  if category == Category::Sleep {
    raw.label = attrs.value;
  } else {
    raw.value = attrs.value.as_deref().map(|v| number(v, "value")).transpose()?;
    raw.unit = attrs.unit.as_deref().map(Unit::from_label);
  }
  raw.device = attrs.source_name;

  Ok(Some(raw))
}

fn workout(attrs: ElementAttrs) -> Result<RawRecord> {
  let mut raw = RawRecord::new(SourceKind::AppleHealth, Category::Workout, "workout", attrs.start()?);
  raw.end = attrs.end()?;

  let totals = [
    (Field::Duration, &attrs.duration, &attrs.duration_unit, "duration", Unit::Minutes),
    (Field::Distance, &attrs.distance, &attrs.distance_unit, "totalDistance", Unit::Miles),
    (
      Field::Energy,
      &attrs.energy,
      &attrs.energy_unit,
      "totalEnergyBurned",
      Unit::Kilocalories,
    ),
  ];
  for (field, value, unit, attribute, default_unit) in totals {
    if let Some(value) = value {
      let unit = unit.as_deref().map(Unit::from_label).unwrap_or(default_unit);
      raw.readings.push(Reading::new(field, number(value, attribute)?, unit));
    }
  }

  raw.label = attrs.activity;
  raw.device = attrs.source_name;
  Ok(raw)
}
