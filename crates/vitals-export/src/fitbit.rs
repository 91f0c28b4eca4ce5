//! Parser for Fitbit data exports.
//!
//! An export is a zip of per-day JSON files. Four families are read:
//! `activities-heart-*.json` (resting heart rate), `hrv-*.json` (daily
//! RMSSD), `sleep-*.json` (sessions with stage summaries) and
//! `exercise-*.json` (workouts). Everything else in the archive is ignored.
//!
//! Files are decoded one at a time. A file that is not valid JSON, or not a
//! JSON array, is skipped; an entry that does not have the expected shape is
//! skipped too.

use std::{
  collections::BTreeMap,
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
  vec,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};
use vitals_core::record::{Category, Field, RawRecord, Reading, SourceKind, Unit};
use zip::ZipArchive;

use crate::{
  error::{Error, Result},
  timestamp,
};

const DEVICE: &str = "fitbit";

// ─── File families ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
  Heart,
  Hrv,
  Sleep,
  Exercise,
}

impl FileKind {
  /// Classify an archive entry by its lowercased base name.
  fn of(entry: &str) -> Option<Self> {
    let lower = entry.to_lowercase();
    let base = lower.rsplit('/').next().unwrap_or(&lower);
    if !base.ends_with(".json") {
      return None;
    }

    if is_heart_summary(base) {
      Some(Self::Heart)
    } else if dated(base, "sleep") {
      Some(Self::Sleep)
    } else if dated(base, "hrv") {
      Some(Self::Hrv)
    } else if dated(base, "exercise") {
      Some(Self::Exercise)
    } else {
      None
    }
  }
}

/// `activities-heart` as a whole word, excluding the intraday series.
fn is_heart_summary(base: &str) -> bool {
  const NAME: &str = "activities-heart";
  if base.contains("intraday") {
    return false;
  }
  base.match_indices(NAME).any(|(at, _)| {
    base[at + NAME.len()..]
      .chars()
      .next()
      .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
  })
}

/// `<prefix>-YYYY…` or `<prefix>_YYYY…`.
fn dated(base: &str, prefix: &str) -> bool {
  base
    .strip_prefix(prefix)
    .and_then(|rest| rest.strip_prefix(['-', '_']))
    .is_some_and(|rest| rest.len() >= 4 && rest.as_bytes()[..4].iter().all(u8::is_ascii_digit))
}

// ─── Export ──────────────────────────────────────────────────────────────────

/// An opened Fitbit export archive.
pub struct FitbitExport {
  path:    PathBuf,
  archive: ZipArchive<BufReader<File>>,
}

impl FitbitExport {
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let archive = ZipArchive::new(BufReader::new(File::open(&path)?))?;
    Ok(Self { path, archive })
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Stream the records of every recognized file, in archive order.
  pub fn records(&mut self) -> FitbitRecords<'_> {
    let pending = (0..self.archive.len())
      .filter_map(|index| {
        let name = self.archive.name_for_index(index)?;
        if name.starts_with("__MACOSX") {
          return None;
        }
        FileKind::of(name).map(|kind| (index, kind))
      })
      .collect::<Vec<_>>()
      .into_iter();

    FitbitRecords {
      archive: &mut self.archive,
      pending,
      current: Vec::new().into_iter(),
      finished: false,
    }
  }
}

/// Records of a [`FitbitExport`], decoded one file at a time.
///
/// The first error ends the stream.
pub struct FitbitRecords<'a> {
  archive:  &'a mut ZipArchive<BufReader<File>>,
  pending:  vec::IntoIter<(usize, FileKind)>,
  current:  vec::IntoIter<RawRecord>,
  finished: bool,
}

impl FitbitRecords<'_> {
  /// Decode the next recognized file. `Ok(None)` when the file was skipped.
  fn load(&mut self, index: usize, kind: FileKind) -> Result<Option<Vec<RawRecord>>> {
    let file = self.archive.by_index(index)?;
    let name = file.name().to_owned();

    let entries = match serde_json::from_reader::<_, Value>(BufReader::new(file)) {
      Ok(Value::Array(entries)) if !entries.is_empty() => entries,
      Ok(_) => {
        debug!(entry = %name, "not a non-empty JSON array; skipped");
        return Ok(None);
      }
      Err(e) => {
        warn!(entry = %name, error = %e, "malformed JSON; skipped");
        return Ok(None);
      }
    };

    let records = match kind {
      FileKind::Heart => heart(entries)?,
      FileKind::Hrv => hrv(entries)?,
      FileKind::Sleep => sleep(entries)?,
      FileKind::Exercise => exercise(entries)?,
    };
    debug!(entry = %name, records = records.len(), "decoded");
    Ok(Some(records))
  }
}

impl Iterator for FitbitRecords<'_> {
  type Item = Result<RawRecord>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    loop {
      if let Some(record) = self.current.next() {
        return Some(Ok(record));
      }
      let (index, kind) = self.pending.next()?;
      match self.load(index, kind) {
        Ok(Some(records)) => self.current = records.into_iter(),
        Ok(None) => {}
        Err(e) => {
          self.finished = true;
          return Some(Err(e));
        }
      }
    }
  }
}

// ─── Entries ─────────────────────────────────────────────────────────────────

/// Decode each entry as `T`, dropping those of another shape.
fn shaped<T: DeserializeOwned>(entries: Vec<Value>) -> impl Iterator<Item = T> {
  entries
    .into_iter()
    .filter_map(|entry| serde_json::from_value(entry).ok())
}

fn parse_time(attribute: &'static str, value: &str) -> Result<DateTime<Utc>> {
  timestamp::parse_vendor(value).ok_or_else(|| Error::InvalidTimestamp {
    attribute,
    value: value.to_owned(),
  })
}

fn fitbit_record(category: Category, metric: &str, at: DateTime<Utc>) -> RawRecord {
  let mut raw = RawRecord::new(SourceKind::Fitbit, category, metric, at);
  raw.device = Some(DEVICE.to_owned());
  raw
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartDay {
  #[serde(default)]
  date_time: String,
  value:     HeartValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartValue {
  resting_heart_rate: Option<f64>,
}

fn heart(entries: Vec<Value>) -> Result<Vec<RawRecord>> {
  let mut out = Vec::new();
  for day in shaped::<HeartDay>(entries) {
    let Some(rhr) = day.value.resting_heart_rate else { continue };
    if day.date_time.is_empty() {
      continue;
    }
    let mut raw = fitbit_record(
      Category::HeartRate,
      "resting_heart_rate",
      parse_time("dateTime", &day.date_time)?,
    );
    raw.value = Some(rhr);
    raw.unit = Some(Unit::CountPerMinute);
    out.push(raw);
  }
  Ok(out)
}

#[derive(Deserialize)]
struct HrvEntry {
  #[serde(default)]
  hrv: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HrvDay {
  #[serde(default)]
  date_time: String,
  value:     HrvValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HrvValue {
  daily_rmssd: Option<f64>,
}

fn hrv(entries: Vec<Value>) -> Result<Vec<RawRecord>> {
  let mut out = Vec::new();
  for entry in shaped::<HrvEntry>(entries) {
    for day in shaped::<HrvDay>(entry.hrv) {
      let Some(rmssd) = day.value.daily_rmssd else { continue };
      if day.date_time.is_empty() {
        continue;
      }
      let mut raw = fitbit_record(Category::Hrv, "hrv_rmssd", parse_time("dateTime", &day.date_time)?);
      raw.value = Some((rmssd * 100.0).round() / 100.0);
      raw.unit = Some(Unit::Milliseconds);
      out.push(raw);
    }
  }
  Ok(out)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SleepSession {
  #[serde(default)]
  date_of_sleep: String,
  start_time:    Option<String>,
  end_time:      Option<String>,
  time_in_bed:   Option<f64>,
  efficiency:    Option<f64>,
  minutes_awake: Option<f64>,
  #[serde(default)]
  levels:        Levels,
}

#[derive(Default, Deserialize)]
struct Levels {
  #[serde(default)]
  summary: BTreeMap<String, StageSummary>,
}

#[derive(Deserialize)]
struct StageSummary {
  minutes: Option<f64>,
}

impl Levels {
  fn minutes(&self, stage: &str) -> Option<f64> { self.summary.get(stage)?.minutes }
}

fn sleep(entries: Vec<Value>) -> Result<Vec<RawRecord>> {
  let mut out = Vec::new();
  for session in shaped::<SleepSession>(entries) {
    if session.date_of_sleep.is_empty() {
      continue;
    }
    let night = parse_time("dateOfSleep", &session.date_of_sleep)?;
    let start = session
      .start_time
      .as_deref()
      .map(|s| parse_time("startTime", s))
      .transpose()?;
    let end = session
      .end_time
      .as_deref()
      .map(|s| parse_time("endTime", s))
      .transpose()?;

    let mut raw = fitbit_record(Category::Sleep, "sleep", start.unwrap_or(night));
    raw.recorded_at = night;
    raw.end = end.filter(|_| start.is_some());

    let minutes = |field, value: Option<f64>| value.map(|v| Reading::new(field, v, Unit::Minutes));
    raw.readings = [
      session
        .efficiency
        .map(|v| Reading::new(Field::SleepPerformance, v, Unit::Percent)),
      minutes(Field::TimeInBed, session.time_in_bed),
      minutes(Field::LightSleep, session.levels.minutes("light")),
      minutes(Field::RemSleep, session.levels.minutes("rem")),
      minutes(Field::DeepSleep, session.levels.minutes("deep")),
      minutes(Field::Awake, session.levels.minutes("wake").or(session.minutes_awake)),
    ]
    .into_iter()
    .flatten()
    .collect();
    out.push(raw);
  }
  Ok(out)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Exercise {
  #[serde(default)]
  start_time:      String,
  end_time:        Option<String>,
  active_duration: Option<f64>,
  duration:        Option<f64>,
  distance:        Option<f64>,
  distance_unit:   Option<String>,
  calories:        Option<f64>,
  activity_name:   Option<String>,
}

/// Only mile and kilometer distances are understood.
fn distance_unit(label: &str) -> Option<Unit> {
  let label = label.to_lowercase();
  if label.contains("mile") {
    Some(Unit::Miles)
  } else if label.contains("kilometer") || label == "km" {
    Some(Unit::Kilometers)
  } else {
    None
  }
}

fn exercise(entries: Vec<Value>) -> Result<Vec<RawRecord>> {
  let mut out = Vec::new();
  for session in shaped::<Exercise>(entries) {
    if session.start_time.is_empty() {
      continue;
    }
    let mut raw = fitbit_record(Category::Workout, "workout", parse_time("startTime", &session.start_time)?);
    raw.label = Some(session.activity_name.unwrap_or_else(|| "unknown".to_owned()));
    raw.end = session
      .end_time
      .as_deref()
      .map(|s| parse_time("endTime", s))
      .transpose()?;

    let duration = session
      .active_duration
      .or(session.duration)
      .map(|ms| Reading::new(Field::Duration, ms, Unit::Milliseconds));
    let distance = session.distance.zip(session.distance_unit.as_deref().and_then(distance_unit));
    raw.readings = [
      duration,
      distance.map(|(d, unit)| Reading::new(Field::Distance, d, unit)),
      session
        .calories
        .map(|kcal| Reading::new(Field::Energy, kcal, Unit::Kilocalories)),
    ]
    .into_iter()
    .flatten()
    .collect();
    out.push(raw);
  }
  Ok(out)
}
