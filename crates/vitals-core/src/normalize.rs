//! Raw → canonical mapping.
//!
//! [`normalize`] is pure: it only converts values. One raw record may yield
//! several canonical records (a Whoop recovery row also produces an HRV
//! sample), or none, in which case the reason is returned as [`Dropped`].

use serde::Serialize;

use crate::{
  canonical::{
    MetricSample, NormalizedRecord, ReadinessRecord, RecoveryRecord, SleepAggregates,
    SleepRecord, SleepStage, StrainRecord, WorkoutRecord,
  },
  record::{Category, Field, RawRecord, Reading, SourceKind, Unit},
};

const MILE_IN_KM: f64 = 1.609344;
const KJ_PER_KCAL: f64 = 4.184;

/// Why a raw record produced no canonical rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Dropped {
  /// A sample without a numeric value.
  MissingValue,
  /// A sleep segment without an end, or with `end <= start`.
  EmptyInterval,
  UnknownSleepStage(String),
  /// Recognized, but there is no canonical table for it.
  NoCanonicalTable,
}

impl Dropped {
  /// Stable snake_case name of the reason, without its detail.
  pub fn reason(&self) -> &'static str {
    match self {
      Self::MissingValue => "missing_value",
      Self::EmptyInterval => "empty_interval",
      Self::UnknownSleepStage(_) => "unknown_sleep_stage",
      Self::NoCanonicalTable => "no_canonical_table",
    }
  }
}

pub type Normalized = Result<Vec<NormalizedRecord>, Dropped>;

/// Map one raw record into its canonical table(s).
pub fn normalize(raw: &RawRecord) -> Normalized {
  match raw.category {
    Category::HeartRate => sample(raw, Unit::CountPerMinute).map(|s| vec![NormalizedRecord::HeartRate(s)]),
    Category::Hrv => sample(raw, Unit::Milliseconds).map(|s| vec![NormalizedRecord::Hrv(s)]),
    Category::Sleep => sleep(raw),
    Category::Workout => Ok(vec![NormalizedRecord::Workout(workout(raw))]),
    Category::Recovery => Ok(recovery(raw)),
    Category::Strain => Ok(vec![NormalizedRecord::WhoopStrain(StrainRecord {
      recorded_at:    raw.recorded_at,
      day_strain:     value_of(raw, Field::DayStrain),
      calories:       value_of(raw, Field::Calories),
      max_heart_rate: value_of(raw, Field::MaxHeartRate),
      avg_heart_rate: value_of(raw, Field::AvgHeartRate),
    })]),
    Category::Readiness => Ok(readiness(raw)),
    Category::Activity => Err(Dropped::NoCanonicalTable),
  }
}

// ─── Samples ─────────────────────────────────────────────────────────────────

fn sample(raw: &RawRecord, default_unit: Unit) -> Result<MetricSample, Dropped> {
  let value = raw.value.ok_or(Dropped::MissingValue)?;
  Ok(MetricSample {
    source: raw.source,
    metric: raw.metric.clone(),
    value,
    unit: raw.unit.as_ref().unwrap_or(&default_unit).label().to_owned(),
    recorded_at: raw.recorded_at,
    device: raw.device.clone(),
  })
}

/// A sample derived from a vendor aggregate column.
fn derived(raw: &RawRecord, metric: &str, value: f64, unit: Unit) -> MetricSample {
  MetricSample {
    source:      raw.source,
    metric:      metric.to_owned(),
    value,
    unit:        unit.label().to_owned(),
    recorded_at: raw.recorded_at,
    device:      raw.device.clone(),
  }
}

// ─── Sleep ───────────────────────────────────────────────────────────────────

/// Apple Health `HKCategoryValueSleepAnalysis*` values. The pre-staging
/// `Asleep` value is an umbrella like `AsleepUnspecified`.
fn apple_sleep_stage(label: &str) -> Option<SleepStage> {
  let suffix = label.strip_prefix("HKCategoryValueSleepAnalysis").unwrap_or(label);
  Some(match suffix {
    "AsleepDeep" | "DeepSleep" => SleepStage::Deep,
    "AsleepREM" | "REM" => SleepStage::Rem,
    "AsleepCore" | "CoreSleep" => SleepStage::Core,
    "AsleepUnspecified" | "Asleep" => SleepStage::Unspecified,
    "Awake" => SleepStage::Awake,
    "InBed" => SleepStage::InBed,
    _ => return None,
  })
}

fn sleep(raw: &RawRecord) -> Normalized {
  match raw.source {
    SourceKind::AppleHealth => {
      let label = raw.label.as_deref().unwrap_or_default();
      let stage = apple_sleep_stage(label)
        .ok_or_else(|| Dropped::UnknownSleepStage(label.to_owned()))?;
      let end = raw.end.filter(|end| *end > raw.start).ok_or(Dropped::EmptyInterval)?;

      Ok(vec![NormalizedRecord::Sleep(SleepRecord {
        source: raw.source,
        stage,
        start: Some(raw.start),
        end: Some(end),
        recorded_at: raw.recorded_at,
        device: raw.device.clone(),
        aggregates: SleepAggregates::default(),
      })])
    }
    SourceKind::Whoop | SourceKind::Oura | SourceKind::Fitbit => Ok(vendor_sleep(raw)),
  }
}

fn vendor_sleep(raw: &RawRecord) -> Vec<NormalizedRecord> {
  // Session bounds are kept only when both ends are known and ordered.
  let (start, end) = match raw.end {
    Some(end) if end > raw.start => (Some(raw.start), Some(end)),
    _ => (None, None),
  };

  let mut out = vec![NormalizedRecord::Sleep(SleepRecord {
    source: raw.source,
    stage: SleepStage::Asleep,
    start,
    end,
    recorded_at: raw.recorded_at,
    device: raw.device.clone(),
    aggregates: SleepAggregates {
      performance_pct:   reading(raw, Field::SleepPerformance).map(percent),
      time_in_bed_hours: reading(raw, Field::TimeInBed).and_then(hours),
      light_hours:       reading(raw, Field::LightSleep).and_then(hours),
      rem_hours:         reading(raw, Field::RemSleep).and_then(hours),
      deep_hours:        reading(raw, Field::DeepSleep).and_then(hours),
      awake_hours:       reading(raw, Field::Awake).and_then(hours),
      disturbances:      value_of(raw, Field::Disturbances),
    },
  })];

  if let Some(rhr) = value_of(raw, Field::LowestHeartRate) {
    out.push(NormalizedRecord::HeartRate(derived(
      raw,
      "resting_heart_rate",
      rhr,
      Unit::CountPerMinute,
    )));
  }
  if let Some(hrv) = value_of(raw, Field::Hrv) {
    out.push(NormalizedRecord::Hrv(derived(raw, "hrv_rmssd", hrv, Unit::Milliseconds)));
  }
  out
}

// ─── Workouts ────────────────────────────────────────────────────────────────

const WORKOUT_ACTIVITIES: &[(&str, &str)] = &[
  ("Running", "running"),
  ("Cycling", "cycling"),
  ("Walking", "walking"),
  ("Swimming", "swimming"),
  ("Hiking", "hiking"),
  ("Rowing", "rowing"),
  ("Elliptical", "elliptical"),
  ("HighIntensityIntervalTraining", "hiit"),
  ("HIIT", "hiit"),
  ("TraditionalStrengthTraining", "strength_training"),
  ("StrengthTraining", "strength_training"),
  ("FunctionalStrengthTraining", "functional_strength"),
  ("Yoga", "yoga"),
];

/// Known `HKWorkoutActivityType*` names map to canonical activities; others
/// fall back to the lowercased suffix.
fn workout_activity(label: &str) -> String {
  let suffix = label.strip_prefix("HKWorkoutActivityType").unwrap_or(label);
  WORKOUT_ACTIVITIES
    .iter()
    .find(|(name, _)| *name == suffix)
    .map(|(_, activity)| (*activity).to_owned())
    .unwrap_or_else(|| suffix.to_lowercase())
}

/// Fitbit `activityName` keywords, first match wins.
const FITBIT_ACTIVITY_KEYWORDS: &[(&str, &str)] = &[
  ("run", "running"),
  ("walk", "walking"),
  ("hike", "walking"),
  ("bike", "cycling"),
  ("cycling", "cycling"),
  ("swim", "swimming"),
  ("yoga", "yoga"),
  ("pilates", "yoga"),
  ("weight", "strength_training"),
  ("strength", "strength_training"),
  ("circuit", "hiit"),
  ("interval", "hiit"),
  ("hiit", "hiit"),
  ("sport", "hiit"),
];

/// Free-text Fitbit activity names; unmatched names are snake_cased.
fn fitbit_activity(name: &str) -> String {
  let lower = name.trim().to_lowercase();
  FITBIT_ACTIVITY_KEYWORDS
    .iter()
    .find(|(keyword, _)| lower.contains(keyword))
    .map(|(_, activity)| (*activity).to_owned())
    .unwrap_or_else(|| lower.replace(' ', "_"))
}

fn workout(raw: &RawRecord) -> WorkoutRecord {
  let label = raw.label.as_deref().unwrap_or(&raw.metric);
  let activity = match raw.source {
    SourceKind::Fitbit => fitbit_activity(label),
    _ => workout_activity(label),
  };

  WorkoutRecord {
    source:           raw.source,
    activity,
    duration_minutes: reading(raw, Field::Duration).and_then(minutes).map(|v| round(v, 2)),
    distance_km:      reading(raw, Field::Distance).and_then(kilometers).map(|v| round(v, 3)),
    calories:         reading(raw, Field::Energy).and_then(kilocalories).map(|v| round(v, 1)),
    recorded_at:      raw.recorded_at,
    end:              raw.end,
    device:           raw.device.clone(),
  }
}

// ─── Vendor daily scores ─────────────────────────────────────────────────────

fn recovery(raw: &RawRecord) -> Vec<NormalizedRecord> {
  let hrv_ms = value_of(raw, Field::Hrv);
  let mut out = vec![NormalizedRecord::WhoopRecovery(RecoveryRecord {
    recorded_at: raw.recorded_at,
    recovery_score: value_of(raw, Field::RecoveryScore),
    hrv_ms,
    resting_heart_rate: value_of(raw, Field::RestingHeartRate),
    spo2_pct: value_of(raw, Field::Spo2),
    skin_temp_celsius: value_of(raw, Field::SkinTemp),
  })];

  // Recovery HRV joins Apple's SDNN series.
  if let Some(hrv) = hrv_ms {
    out.push(NormalizedRecord::Hrv(derived(raw, "hrv_sdnn", hrv, Unit::Milliseconds)));
  }
  out
}

fn readiness(raw: &RawRecord) -> Vec<NormalizedRecord> {
  let hrv_balance = value_of(raw, Field::HrvBalance);
  let resting_heart_rate = value_of(raw, Field::RestingHeartRate);

  let mut out = vec![NormalizedRecord::OuraReadiness(ReadinessRecord {
    recorded_at: raw.recorded_at,
    readiness_score: value_of(raw, Field::ReadinessScore),
    hrv_balance,
    resting_heart_rate,
    temperature_deviation: value_of(raw, Field::TemperatureDeviation),
    recovery_index: value_of(raw, Field::RecoveryIndex),
    activity_balance: value_of(raw, Field::ActivityBalance),
    sleep_balance: value_of(raw, Field::SleepBalance),
  })];

  if let Some(hrv) = hrv_balance {
    out.push(NormalizedRecord::Hrv(derived(raw, "hrv_rmssd", hrv, Unit::Milliseconds)));
  }
  if let Some(rhr) = resting_heart_rate {
    out.push(NormalizedRecord::HeartRate(derived(
      raw,
      "resting_heart_rate",
      rhr,
      Unit::CountPerMinute,
    )));
  }
  out
}

// ─── Unit conversion ─────────────────────────────────────────────────────────

fn reading(raw: &RawRecord, field: Field) -> Option<&Reading> { raw.reading(field) }

fn value_of(raw: &RawRecord, field: Field) -> Option<f64> { raw.reading(field).map(|r| r.value) }

fn round(v: f64, places: i32) -> f64 {
  let scale = 10f64.powi(places);
  (v * scale).round() / scale
}

fn hours(r: &Reading) -> Option<f64> {
  let h = match r.unit {
    Unit::Hours => r.value,
    Unit::Minutes => r.value / 60.0,
    Unit::Seconds => r.value / 3600.0,
    _ => return None,
  };
  Some(round(h, 3))
}

fn minutes(r: &Reading) -> Option<f64> {
  match r.unit {
    Unit::Minutes => Some(r.value),
    Unit::Seconds => Some(r.value / 60.0),
    Unit::Hours => Some(r.value * 60.0),
    Unit::Milliseconds => Some(r.value / 60_000.0),
    _ => None,
  }
}

fn kilometers(r: &Reading) -> Option<f64> {
  match r.unit {
    Unit::Kilometers => Some(r.value),
    Unit::Miles => Some(r.value * MILE_IN_KM),
    Unit::Meters => Some(r.value / 1000.0),
    _ => None,
  }
}

fn kilocalories(r: &Reading) -> Option<f64> {
  match r.unit {
    Unit::Kilocalories => Some(r.value),
    Unit::Kilojoules => Some(r.value / KJ_PER_KCAL),
    _ => None,
  }
}

/// Scores exported as a fraction (`0.87`) are scaled to percent.
fn percent(r: &Reading) -> f64 {
  if r.value <= 1.0 { round(r.value * 100.0, 1) } else { r.value }
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone, Utc};

  use super::*;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
  }

  fn apple_sleep(label: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> RawRecord {
    let mut raw = RawRecord::new(SourceKind::AppleHealth, Category::Sleep, "sleep_analysis", start);
    raw.label = Some(label.into());
    raw.end = Some(end);
    raw.device = Some("Apple Watch".into());
    raw
  }

  #[test]
  fn heart_rate_sample_keeps_value_and_unit() {
    let mut raw = RawRecord::new(SourceKind::AppleHealth, Category::HeartRate, "heart_rate", at(8, 0));
    raw.value = Some(72.0);
    raw.unit = Some(Unit::from_label("count/min"));

    let out = normalize(&raw).unwrap();
    let NormalizedRecord::HeartRate(s) = &out[0] else { panic!("expected heart rate") };
    assert_eq!(s.value, 72.0);
    assert_eq!(s.unit, "count/min");
  }

  #[test]
  fn sample_without_value_is_dropped() {
    let raw = RawRecord::new(SourceKind::AppleHealth, Category::Hrv, "hrv_sdnn", at(8, 0));
    assert_eq!(normalize(&raw), Err(Dropped::MissingValue));
  }

  #[test]
  fn apple_sleep_stage_maps_from_category_value() {
    let raw = apple_sleep("HKCategoryValueSleepAnalysisAsleepREM", at(1, 0), at(1, 30));
    let out = normalize(&raw).unwrap();
    let NormalizedRecord::Sleep(s) = &out[0] else { panic!("expected sleep") };
    assert_eq!(s.stage, SleepStage::Rem);
    assert_eq!(s.end, Some(at(1, 30)));
  }

  #[test]
  fn legacy_stage_labels_still_map() {
    for (label, stage) in [
      ("HKCategoryValueSleepAnalysisREM", SleepStage::Rem),
      ("HKCategoryValueSleepAnalysisDeepSleep", SleepStage::Deep),
      ("HKCategoryValueSleepAnalysisCoreSleep", SleepStage::Core),
    ] {
      let out = normalize(&apple_sleep(label, at(1, 0), at(1, 30))).unwrap();
      let NormalizedRecord::Sleep(s) = &out[0] else { panic!("expected sleep") };
      assert_eq!(s.stage, stage, "{label}");
    }
  }

  #[test]
  fn inverted_sleep_interval_is_dropped() {
    let raw = apple_sleep("HKCategoryValueSleepAnalysisAsleepDeep", at(2, 0), at(1, 0));
    assert_eq!(normalize(&raw), Err(Dropped::EmptyInterval));
  }

  #[test]
  fn unknown_sleep_stage_is_dropped_not_fatal() {
    let raw = apple_sleep("HKCategoryValueSleepAnalysisDreaming", at(1, 0), at(2, 0));
    assert!(matches!(normalize(&raw), Err(Dropped::UnknownSleepStage(_))));
  }

  #[test]
  fn workout_distance_converts_miles_to_km() {
    let mut raw = RawRecord::new(SourceKind::AppleHealth, Category::Workout, "workout", at(7, 0));
    raw.label = Some("HKWorkoutActivityTypeRunning".into());
    raw.readings = vec![
      Reading::new(Field::Duration, 30.0, Unit::Minutes),
      Reading::new(Field::Distance, 3.1, Unit::Miles),
      Reading::new(Field::Energy, 1046.0, Unit::Kilojoules),
    ];

    let out = normalize(&raw).unwrap();
    let NormalizedRecord::Workout(w) = &out[0] else { panic!("expected workout") };
    assert_eq!(w.activity, "running");
    assert_eq!(w.duration_minutes, Some(30.0));
    assert_eq!(w.distance_km, Some(4.989));
    assert_eq!(w.calories, Some(250.0));
  }

  #[test]
  fn unknown_workout_type_uses_lowercased_suffix() {
    assert_eq!(workout_activity("HKWorkoutActivityTypePickleball"), "pickleball");
    assert_eq!(workout_activity("HKWorkoutActivityTypeHighIntensityIntervalTraining"), "hiit");
  }

  #[test]
  fn fitbit_workout_maps_free_text_activity() {
    let mut raw = RawRecord::new(SourceKind::Fitbit, Category::Workout, "workout", at(17, 0));
    raw.label = Some("Outdoor Bike".into());
    raw.readings = vec![
      Reading::new(Field::Duration, 2_730_000.0, Unit::Milliseconds),
      Reading::new(Field::Distance, 2.0, Unit::Miles),
    ];

    let out = normalize(&raw).unwrap();
    let NormalizedRecord::Workout(w) = &out[0] else { panic!("expected workout") };
    assert_eq!(w.activity, "cycling");
    assert_eq!(w.duration_minutes, Some(45.5));
    assert_eq!(w.distance_km, Some(3.219));

    raw.label = Some("Stair Climber".into());
    let NormalizedRecord::Workout(w) = &normalize(&raw).unwrap()[0] else { panic!("expected workout") };
    assert_eq!(w.activity, "stair_climber");
  }

  #[test]
  fn fitbit_sleep_session_is_a_vendor_night() {
    let mut raw = RawRecord::new(SourceKind::Fitbit, Category::Sleep, "sleep", at(0, 0));
    raw.end = Some(at(7, 0));
    raw.device = Some("fitbit".into());
    raw.readings = vec![
      Reading::new(Field::SleepPerformance, 93.0, Unit::Percent),
      Reading::new(Field::DeepSleep, 62.0, Unit::Minutes),
    ];

    let out = normalize(&raw).unwrap();
    assert_eq!(out.len(), 1);
    let NormalizedRecord::Sleep(s) = &out[0] else { panic!("expected sleep") };
    assert_eq!(s.stage, SleepStage::Asleep);
    assert_eq!(s.end, Some(at(7, 0)));
    assert_eq!(s.aggregates.performance_pct, Some(93.0));
    assert_eq!(s.aggregates.deep_hours, Some(1.033));
  }

  #[test]
  fn recovery_with_zero_hrv_keeps_zero_and_derives_sample() {
    let mut raw = RawRecord::new(SourceKind::Whoop, Category::Recovery, "recovery", at(6, 0));
    raw.device = Some("whoop".into());
    raw.readings = vec![
      Reading::new(Field::RecoveryScore, 55.0, Unit::Percent),
      Reading::new(Field::Hrv, 0.0, Unit::Milliseconds),
    ];

    let out = normalize(&raw).unwrap();
    assert_eq!(out.len(), 2);
    let NormalizedRecord::WhoopRecovery(r) = &out[0] else { panic!("expected recovery") };
    assert_eq!(r.hrv_ms, Some(0.0));
    let NormalizedRecord::Hrv(h) = &out[1] else { panic!("expected hrv") };
    assert_eq!(h.value, 0.0);
    assert_eq!(h.metric, "hrv_sdnn");
  }

  #[test]
  fn vendor_sleep_converts_durations_and_fractional_performance() {
    let mut raw = RawRecord::new(SourceKind::Oura, Category::Sleep, "sleep", at(23, 0));
    raw.end = Some(at(23, 0) + chrono::TimeDelta::hours(8));
    raw.readings = vec![
      Reading::new(Field::DeepSleep, 5400.0, Unit::Seconds),
      Reading::new(Field::RemSleep, 90.0, Unit::Minutes),
      Reading::new(Field::SleepPerformance, 0.91, Unit::Percent),
    ];

    let out = normalize(&raw).unwrap();
    let NormalizedRecord::Sleep(s) = &out[0] else { panic!("expected sleep") };
    assert_eq!(s.stage, SleepStage::Asleep);
    assert_eq!(s.start, Some(at(23, 0)));
    assert_eq!(s.aggregates.deep_hours, Some(1.5));
    assert_eq!(s.aggregates.rem_hours, Some(1.5));
    assert_eq!(s.aggregates.performance_pct, Some(91.0));
  }

  #[test]
  fn activity_rows_have_no_table() {
    let raw = RawRecord::new(SourceKind::Oura, Category::Activity, "activity", at(0, 0));
    assert_eq!(normalize(&raw), Err(Dropped::NoCanonicalTable));
  }
}
