//! Raw records: the parser-side representation of one observation.
//!
//! A [`RawRecord`] is what a parser yields for a single element or row,
//! before any canonical mapping. Timestamps are already in UTC; everything
//! else (units, identifiers, column semantics) is still source-specific.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

// ─── Sources ─────────────────────────────────────────────────────────────────

/// The exporter a file comes from.
///
/// Doubles as the `source` column of every persisted row.
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
pub enum SourceKind {
  AppleHealth,
  Whoop,
  Oura,
  Fitbit,
}

impl SourceKind {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Categories ──────────────────────────────────────────────────────────────

/// Coarse grouping assigned by a parser; decides which canonical table a
/// record is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  HeartRate,
  Hrv,
  Sleep,
  Workout,
  Recovery,
  Strain,
  Readiness,
  /// Recognized but without a canonical table (e.g. Oura activity rows).
  Activity,
}

// ─── Units ───────────────────────────────────────────────────────────────────

/// Units seen across the supported exports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
  CountPerMinute,
  Milliseconds,
  Percent,
  Hours,
  Minutes,
  Seconds,
  Kilometers,
  Miles,
  Meters,
  Kilocalories,
  Kilojoules,
  Celsius,
  Count,
  Other(String),
}

impl Unit {
  /// Parse an exporter unit label. Unknown labels are preserved verbatim.
  pub fn from_label(label: &str) -> Self {
    match label.trim() {
      "count/min" | "bpm" => Self::CountPerMinute,
      "ms" => Self::Milliseconds,
      "%" | "pct" => Self::Percent,
      "hr" | "h" | "hours" => Self::Hours,
      "min" | "minutes" => Self::Minutes,
      "s" | "sec" | "seconds" => Self::Seconds,
      "km" => Self::Kilometers,
      "mi" => Self::Miles,
      "m" => Self::Meters,
      "kcal" | "Cal" | "cal" => Self::Kilocalories,
      "kJ" => Self::Kilojoules,
      "degC" => Self::Celsius,
      "count" => Self::Count,
      other => Self::Other(other.to_owned()),
    }
  }

  /// Canonical label stored in `unit` columns.
  pub fn label(&self) -> &str {
    match self {
      Self::CountPerMinute => "count/min",
      Self::Milliseconds => "ms",
      Self::Percent => "%",
      Self::Hours => "hr",
      Self::Minutes => "min",
      Self::Seconds => "s",
      Self::Kilometers => "km",
      Self::Miles => "mi",
      Self::Meters => "m",
      Self::Kilocalories => "kcal",
      Self::Kilojoules => "kJ",
      Self::Celsius => "degC",
      Self::Count => "count",
      Self::Other(label) => label,
    }
  }
}

// ─── Readings ────────────────────────────────────────────────────────────────

/// Logical columns of vendor aggregate rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
  RecoveryScore,
  Hrv,
  RestingHeartRate,
  LowestHeartRate,
  Spo2,
  SkinTemp,
  DayStrain,
  Calories,
  MaxHeartRate,
  AvgHeartRate,
  SleepPerformance,
  TimeInBed,
  LightSleep,
  RemSleep,
  DeepSleep,
  Awake,
  Disturbances,
  ReadinessScore,
  HrvBalance,
  TemperatureDeviation,
  RecoveryIndex,
  ActivityBalance,
  SleepBalance,
  Duration,
  Distance,
  Energy,
}

/// One numeric column value together with the unit it was exported in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
  pub field: Field,
  pub value: f64,
  pub unit:  Unit,
}

impl Reading {
  pub fn new(field: Field, value: f64, unit: Unit) -> Self {
    Self { field, value, unit }
  }
}

// ─── Raw record ──────────────────────────────────────────────────────────────

/// A single source observation as produced by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
  pub source:      SourceKind,
  pub category:    Category,
  /// Source-level metric name, e.g. `heart_rate` or `hrv_sdnn`.
  pub metric:      String,
  pub value:       Option<f64>,
  pub unit:        Option<Unit>,
  /// Categorical payload: a sleep stage or workout activity identifier.
  pub label:       Option<String>,
  pub start:       DateTime<Utc>,
  pub end:         Option<DateTime<Utc>>,
  pub recorded_at: DateTime<Utc>,
  pub device:      Option<String>,
  pub readings:    Vec<Reading>,
}

impl RawRecord {
  /// A record starting (and recorded) at `start`, with no payload yet.
  pub fn new(
    source: SourceKind,
    category: Category,
    metric: impl Into<String>,
    start: DateTime<Utc>,
  ) -> Self {
    Self {
      source,
      category,
      metric: metric.into(),
      value: None,
      unit: None,
      label: None,
      start,
      end: None,
      recorded_at: start,
      device: None,
      readings: Vec::new(),
    }
  }

  /// First reading for `field`, if the row carried one.
  pub fn reading(&self, field: Field) -> Option<&Reading> {
    self.readings.iter().find(|r| r.field == field)
  }
}
