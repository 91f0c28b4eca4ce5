//! Canonical records: the normalized rows persisted by a store.
//!
//! Every variant of [`NormalizedRecord`] belongs to exactly one [`Table`] and
//! exposes a [`NaturalKey`]: the minimal tuple identifying "the same
//! real-world observation". Stores enforce uniqueness on that key.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
  Error, Result,
  record::SourceKind,
};

// ─── Tables ──────────────────────────────────────────────────────────────────

/// The fixed set of canonical tables.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
  HeartRate,
  Hrv,
  Sleep,
  Workouts,
  WhoopRecovery,
  WhoopStrain,
  OuraReadiness,
}

impl Table {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Sleep stages ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SleepStage {
  Deep,
  Rem,
  Core,
  Light,
  /// Umbrella segment: asleep, no stage granularity.
  Unspecified,
  Awake,
  InBed,
  /// Vendor nightly aggregate row (Whoop, Oura).
  Asleep,
}

impl SleepStage {
  pub fn as_str(self) -> &'static str { self.into() }

  /// Deep, REM, core and light are reported per sleep cycle.
  pub fn is_granular(self) -> bool {
    matches!(self, Self::Deep | Self::Rem | Self::Core | Self::Light)
  }

  pub fn decode(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownSleepStage(s.to_owned()))
  }
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Canonical stored form: UTC ISO-8601 with second precision and a `Z`
/// suffix, e.g. `2024-01-15T13:23:44Z`.
pub fn canonical_timestamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A single scalar sample (heart-rate and HRV tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
  pub source:      SourceKind,
  pub metric:      String,
  pub value:       f64,
  pub unit:        String,
  pub recorded_at: DateTime<Utc>,
  pub device:      Option<String>,
}

/// Nightly aggregates reported by Whoop and Oura; `None` for segment rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepAggregates {
  pub performance_pct:   Option<f64>,
  pub time_in_bed_hours: Option<f64>,
  pub light_hours:       Option<f64>,
  pub rem_hours:         Option<f64>,
  pub deep_hours:        Option<f64>,
  pub awake_hours:       Option<f64>,
  pub disturbances:      Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
  pub source:      SourceKind,
  pub stage:       SleepStage,
  pub start:       Option<DateTime<Utc>>,
  pub end:         Option<DateTime<Utc>>,
  pub recorded_at: DateTime<Utc>,
  pub device:      Option<String>,
  pub aggregates:  SleepAggregates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
  pub source:           SourceKind,
  pub activity:         String,
  pub duration_minutes: Option<f64>,
  pub distance_km:      Option<f64>,
  pub calories:         Option<f64>,
  pub recorded_at:      DateTime<Utc>,
  pub end:              Option<DateTime<Utc>>,
  pub device:           Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
  pub recorded_at:        DateTime<Utc>,
  pub recovery_score:     Option<f64>,
  pub hrv_ms:             Option<f64>,
  pub resting_heart_rate: Option<f64>,
  pub spo2_pct:           Option<f64>,
  pub skin_temp_celsius:  Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainRecord {
  pub recorded_at:    DateTime<Utc>,
  pub day_strain:     Option<f64>,
  pub calories:       Option<f64>,
  pub max_heart_rate: Option<f64>,
  pub avg_heart_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessRecord {
  pub recorded_at:           DateTime<Utc>,
  pub readiness_score:       Option<f64>,
  pub hrv_balance:           Option<f64>,
  pub resting_heart_rate:    Option<f64>,
  pub temperature_deviation: Option<f64>,
  pub recovery_index:        Option<f64>,
  pub activity_balance:      Option<f64>,
  pub sleep_balance:         Option<f64>,
}

// ─── Sleep segments ──────────────────────────────────────────────────────────

/// A staged sleep interval `[start, end)` owned by one device.
///
/// Construction enforces `end > start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SleepSegment {
  start:  DateTime<Utc>,
  end:    DateTime<Utc>,
  stage:  SleepStage,
  device: String,
}

impl SleepSegment {
  pub fn new(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    stage: SleepStage,
    device: impl Into<String>,
  ) -> Result<Self> {
    if end <= start {
      return Err(Error::EmptyInterval { start, end });
    }
    Ok(Self { start, end, stage, device: device.into() })
  }

  pub fn start(&self) -> DateTime<Utc> { self.start }

  pub fn end(&self) -> DateTime<Utc> { self.end }

  pub fn stage(&self) -> SleepStage { self.stage }

  pub fn device(&self) -> &str { &self.device }
}

// ─── Normalized record ───────────────────────────────────────────────────────

/// A record mapped into one canonical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum NormalizedRecord {
  HeartRate(MetricSample),
  Hrv(MetricSample),
  Sleep(SleepRecord),
  Workout(WorkoutRecord),
  WhoopRecovery(RecoveryRecord),
  WhoopStrain(StrainRecord),
  OuraReadiness(ReadinessRecord),
}

impl NormalizedRecord {
  pub fn table(&self) -> Table {
    match self {
      Self::HeartRate(_) => Table::HeartRate,
      Self::Hrv(_) => Table::Hrv,
      Self::Sleep(_) => Table::Sleep,
      Self::Workout(_) => Table::Workouts,
      Self::WhoopRecovery(_) => Table::WhoopRecovery,
      Self::WhoopStrain(_) => Table::WhoopStrain,
      Self::OuraReadiness(_) => Table::OuraReadiness,
    }
  }

  pub fn recorded_at(&self) -> DateTime<Utc> {
    match self {
      Self::HeartRate(s) | Self::Hrv(s) => s.recorded_at,
      Self::Sleep(s) => s.recorded_at,
      Self::Workout(w) => w.recorded_at,
      Self::WhoopRecovery(r) => r.recorded_at,
      Self::WhoopStrain(s) => s.recorded_at,
      Self::OuraReadiness(r) => r.recorded_at,
    }
  }

  /// The dedup identity of this record. Absent optional parts encode as the
  /// empty string, matching the `COALESCE(col, '')` unique indexes. Sleep
  /// rows without bounds key on `recorded_at` instead, like
  /// `COALESCE(start_at, recorded_at)` in the index.
  pub fn natural_key(&self) -> NaturalKey {
    let dev = |d: &Option<String>| d.clone().unwrap_or_default();

    let parts = match self {
      Self::HeartRate(s) | Self::Hrv(s) => vec![
        s.source.as_str().to_owned(),
        s.metric.clone(),
        canonical_timestamp(s.recorded_at),
        dev(&s.device),
      ],
      Self::Sleep(s) => vec![
        s.source.as_str().to_owned(),
        s.stage.as_str().to_owned(),
        canonical_timestamp(s.start.unwrap_or(s.recorded_at)),
        canonical_timestamp(s.end.unwrap_or(s.recorded_at)),
        dev(&s.device),
      ],
      Self::Workout(w) => vec![
        w.source.as_str().to_owned(),
        w.activity.clone(),
        canonical_timestamp(w.recorded_at),
        dev(&w.device),
      ],
      Self::WhoopRecovery(r) => vec![
        SourceKind::Whoop.as_str().to_owned(),
        canonical_timestamp(r.recorded_at),
      ],
      Self::WhoopStrain(s) => vec![
        SourceKind::Whoop.as_str().to_owned(),
        canonical_timestamp(s.recorded_at),
      ],
      Self::OuraReadiness(r) => vec![
        SourceKind::Oura.as_str().to_owned(),
        canonical_timestamp(r.recorded_at),
      ],
    };

    NaturalKey { table: self.table(), parts }
  }
}

/// Identity tuple of a canonical row within its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
  pub table: Table,
  pub parts: Vec<String>,
}

impl fmt::Display for NaturalKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.table, self.parts.join(", "))
  }
}

// ─── Per-table counts ────────────────────────────────────────────────────────

/// Row counts keyed by table, in table declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts(BTreeMap<Table, u64>);

impl TableCounts {
  pub fn add(&mut self, table: Table, n: u64) {
    *self.0.entry(table).or_default() += n;
  }

  pub fn get(&self, table: Table) -> u64 { self.0.get(&table).copied().unwrap_or(0) }

  pub fn total(&self) -> u64 { self.0.values().sum() }

  pub fn iter(&self) -> impl Iterator<Item = (Table, u64)> + '_ {
    self.0.iter().map(|(t, n)| (*t, *n))
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
  }

  #[test]
  fn segment_rejects_empty_and_inverted_intervals() {
    assert!(SleepSegment::new(at(1, 0), at(1, 0), SleepStage::Deep, "Watch").is_err());
    assert!(SleepSegment::new(at(2, 0), at(1, 0), SleepStage::Deep, "Watch").is_err());
    assert!(SleepSegment::new(at(1, 0), at(1, 1), SleepStage::Deep, "Watch").is_ok());
  }

  #[test]
  fn canonical_timestamp_is_utc_with_z_suffix() {
    assert_eq!(canonical_timestamp(at(13, 23)), "2024-01-15T13:23:00Z");
  }

  #[test]
  fn sleep_key_without_bounds_uses_recorded_at() {
    let night = |day: u32| {
      NormalizedRecord::Sleep(SleepRecord {
        source:      SourceKind::Whoop,
        stage:       SleepStage::Asleep,
        start:       None,
        end:         None,
        recorded_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        device:      None,
        aggregates:  SleepAggregates::default(),
      })
    };
    let key = night(14).natural_key();
    assert_eq!(key.table, Table::Sleep);
    assert_eq!(key.parts, vec![
      "whoop",
      "asleep",
      "2024-01-14T00:00:00Z",
      "2024-01-14T00:00:00Z",
      ""
    ]);
    assert_ne!(key, night(15).natural_key());
  }

  #[test]
  fn table_names_are_snake_case() {
    assert_eq!(Table::WhoopRecovery.as_str(), "whoop_recovery");
    assert_eq!("oura_readiness".parse::<Table>().unwrap(), Table::OuraReadiness);
    assert_eq!(SleepStage::InBed.as_str(), "in_bed");
  }

  #[test]
  fn counts_accumulate_per_table() {
    let mut counts = TableCounts::default();
    counts.add(Table::Hrv, 2);
    counts.add(Table::Hrv, 1);
    counts.add(Table::Sleep, 4);
    assert_eq!(counts.get(Table::Hrv), 3);
    assert_eq!(counts.get(Table::Workouts), 0);
    assert_eq!(counts.total(), 7);
  }
}
