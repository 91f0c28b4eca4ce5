//! Classification of vendor CSV exports and their column layouts.
//!
//! Each [`TabularKind`] owns a signature (columns whose presence identifies
//! it) and a [`Layout`] (where its dates and numeric fields live). Aliases
//! are listed in priority order and absorb exporter version drift.

use strum::{Display, EnumIter, IntoEnumIterator};
use vitals_core::record::{Category, Field, SourceKind, Unit};

use super::header::Header;
use crate::error::{Error, Result};

/// One logical field and the column names it may appear under, each with
/// the unit that spelling implies.
#[derive(Debug)]
pub struct Column {
  pub field:   Field,
  pub aliases: &'static [(&'static str, Unit)],
}

/// Where a kind keeps its dates and numeric fields.
#[derive(Debug)]
pub struct Layout {
  pub category: Category,
  pub metric:   &'static str,
  /// Day or cycle the row belongs to. Rows without one are skipped.
  pub recorded: &'static [&'static str],
  /// Session bounds, for sleep rows that carry them.
  pub start:    &'static [&'static str],
  pub end:      &'static [&'static str],
  pub columns:  &'static [Column],
}

/// The closed set of recognized CSV exports, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum TabularKind {
  WhoopRecovery,
  WhoopStrain,
  WhoopSleep,
  OuraReadiness,
  OuraSleep,
  OuraActivity,
}

impl TabularKind {
  pub fn source(self) -> SourceKind {
    match self {
      Self::WhoopRecovery | Self::WhoopStrain | Self::WhoopSleep => SourceKind::Whoop,
      Self::OuraReadiness | Self::OuraSleep | Self::OuraActivity => SourceKind::Oura,
    }
  }

  fn signature(self) -> &'static [&'static str] {
    match self {
      Self::WhoopRecovery => &[
        "recovery_score_pct",
        "recovery_score",
        "heart_rate_variability_ms",
        "hrv_ms",
        "resting_heart_rate_bpm",
        "rhr_bpm",
        "skin_temp_celsius",
        "blood_oxygen_pct",
        "spo2_pct",
      ],
      Self::WhoopStrain => &[
        "day_strain",
        "strain",
        "energy_burned_cal",
        "max_hr_bpm",
        "max_heart_rate_bpm",
        "average_hr_bpm",
        "average_heart_rate_bpm",
      ],
      Self::WhoopSleep => &[
        "sleep_performance_pct",
        "sleep_performance",
        "sleep_onset",
        "wake_onset",
        "in_bed_duration_min",
        "light_sleep_duration_min",
        "deep_sws_duration_min",
        "rem_duration_min",
        "awake_duration_min",
        "sws_min",
        "rem_sleep_min",
        "light_sleep_min",
      ],
      Self::OuraReadiness => &[
        "readiness_score",
        "readiness",
        "recovery_index",
        "hrv_balance",
        "activity_balance",
        "sleep_balance",
        "temperature_deviation",
      ],
      Self::OuraSleep => &[
        "bedtime_start",
        "bedtime_end",
        "deep_sleep_duration",
        "rem_sleep_duration",
        "light_sleep_duration",
        "sleep_score",
        "hr_lowest",
        "average_hrv",
        "efficiency",
        "restless_periods",
        "total_bedtime",
      ],
      Self::OuraActivity => &[
        "steps",
        "activity_score",
        "active_calories",
        "total_calories",
        "daily_movement",
        "inactivity_alerts",
      ],
    }
  }

  /// Number of signature columns present in `header`.
  pub fn score(self, header: &Header) -> u32 {
    self
      .signature()
      .iter()
      .filter(|name| header.contains(name))
      .count() as u32
  }

  /// Pick the kind whose signature best matches `header`.
  ///
  /// The highest non-zero score wins; ties go to the earlier variant.
  /// `hint` restricts the candidates to one vendor.
  pub fn classify(header: &Header, hint: Option<SourceKind>) -> Result<Self> {
    let mut best: Option<(Self, u32)> = None;
    for kind in Self::iter().filter(|k| hint.is_none_or(|h| k.source() == h)) {
      let score = kind.score(header);
      if score > best.map_or(0, |(_, s)| s) {
        best = Some((kind, score));
      }
    }

    best
      .map(|(kind, _)| kind)
      .ok_or_else(|| Error::UnrecognizedFormat { columns: header.names().join(",") })
  }

  /// `None` for kinds recognized only so they are not misclassified.
  pub fn layout(self) -> Option<&'static Layout> {
    match self {
      Self::WhoopRecovery => Some(&WHOOP_RECOVERY),
      Self::WhoopStrain => Some(&WHOOP_STRAIN),
      Self::WhoopSleep => Some(&WHOOP_SLEEP),
      Self::OuraReadiness => Some(&OURA_READINESS),
      Self::OuraSleep => Some(&OURA_SLEEP),
      Self::OuraActivity => None,
    }
  }
}

// ─── Layouts ─────────────────────────────────────────────────────────────────

const WHOOP_CYCLE: &[&str] = &["cycle_start_time", "date", "start_time"];
const OURA_DAY: &[&str] = &["date", "day", "summary_date"];

static WHOOP_RECOVERY: Layout = Layout {
  category: Category::Recovery,
  metric:   "recovery",
  recorded: WHOOP_CYCLE,
  start:    &[],
  end:      &[],
  columns:  &[
    Column {
      field:   Field::RecoveryScore,
      aliases: &[
        ("recovery_score_pct", Unit::Percent),
        ("recovery_score", Unit::Percent),
        ("recovery", Unit::Percent),
      ],
    },
    Column {
      field:   Field::Hrv,
      aliases: &[
        ("heart_rate_variability_ms", Unit::Milliseconds),
        ("hrv_ms", Unit::Milliseconds),
        ("hrv", Unit::Milliseconds),
      ],
    },
    Column {
      field:   Field::RestingHeartRate,
      aliases: &[
        ("resting_heart_rate_bpm", Unit::CountPerMinute),
        ("rhr_bpm", Unit::CountPerMinute),
        ("rhr", Unit::CountPerMinute),
      ],
    },
    Column {
      field:   Field::Spo2,
      aliases: &[
        ("spo2_pct", Unit::Percent),
        ("blood_oxygen_pct", Unit::Percent),
        ("spo2", Unit::Percent),
      ],
    },
    Column {
      field:   Field::SkinTemp,
      aliases: &[("skin_temp_celsius", Unit::Celsius), ("skin_temp", Unit::Celsius)],
    },
  ],
};

static WHOOP_STRAIN: Layout = Layout {
  category: Category::Strain,
  metric:   "strain",
  recorded: WHOOP_CYCLE,
  start:    &[],
  end:      &[],
  columns:  &[
    Column {
      field:   Field::DayStrain,
      aliases: &[("day_strain", Unit::Count), ("strain", Unit::Count)],
    },
    Column {
      field:   Field::Calories,
      aliases: &[
        ("calories", Unit::Kilocalories),
        ("energy_burned_cal", Unit::Kilocalories),
        ("active_calories", Unit::Kilocalories),
      ],
    },
    Column {
      field:   Field::MaxHeartRate,
      aliases: &[
        ("max_heart_rate_bpm", Unit::CountPerMinute),
        ("max_hr_bpm", Unit::CountPerMinute),
        ("max_hr", Unit::CountPerMinute),
      ],
    },
    Column {
      field:   Field::AvgHeartRate,
      aliases: &[
        ("average_heart_rate_bpm", Unit::CountPerMinute),
        ("average_hr_bpm", Unit::CountPerMinute),
        ("avg_hr", Unit::CountPerMinute),
      ],
    },
  ],
};

static WHOOP_SLEEP: Layout = Layout {
  category: Category::Sleep,
  metric:   "sleep",
  recorded: &["cycle_start_time", "sleep_onset", "date"],
  start:    &["sleep_onset"],
  end:      &["wake_onset"],
  columns:  &[
    Column {
      field:   Field::SleepPerformance,
      aliases: &[("sleep_performance_pct", Unit::Percent), ("sleep_performance", Unit::Percent)],
    },
    Column {
      field:   Field::TimeInBed,
      aliases: &[
        ("time_in_bed_hours", Unit::Hours),
        ("in_bed_duration_min", Unit::Minutes),
        ("total_in_bed_min_min", Unit::Minutes),
        ("total_in_bed_min", Unit::Minutes),
        ("total_in_bed_minutes", Unit::Minutes),
      ],
    },
    Column {
      field:   Field::LightSleep,
      aliases: &[
        ("light_sleep_duration_hours", Unit::Hours),
        ("light_sleep_duration_min", Unit::Minutes),
        ("light_sleep_min", Unit::Minutes),
      ],
    },
    Column {
      field:   Field::RemSleep,
      aliases: &[
        ("rem_sleep_duration_hours", Unit::Hours),
        ("rem_duration_min", Unit::Minutes),
        ("rem_sleep_min", Unit::Minutes),
      ],
    },
    Column {
      field:   Field::DeepSleep,
      aliases: &[
        ("slow_wave_sleep_duration_hours", Unit::Hours),
        ("deep_sws_duration_min", Unit::Minutes),
        ("sws_min", Unit::Minutes),
      ],
    },
    Column {
      field:   Field::Awake,
      aliases: &[
        ("awake_duration_hours", Unit::Hours),
        ("awake_duration_min", Unit::Minutes),
        ("awake_min", Unit::Minutes),
      ],
    },
    Column { field: Field::Disturbances, aliases: &[("disturbances", Unit::Count)] },
  ],
};

static OURA_READINESS: Layout = Layout {
  category: Category::Readiness,
  metric:   "readiness",
  recorded: OURA_DAY,
  start:    &[],
  end:      &[],
  columns:  &[
    Column {
      field:   Field::ReadinessScore,
      aliases: &[
        ("readiness_score", Unit::Count),
        ("score", Unit::Count),
        ("readiness", Unit::Count),
      ],
    },
    Column {
      field:   Field::RestingHeartRate,
      aliases: &[
        ("resting_heart_rate", Unit::CountPerMinute),
        ("rhr", Unit::CountPerMinute),
        ("heart_rate", Unit::CountPerMinute),
      ],
    },
    Column {
      field:   Field::HrvBalance,
      aliases: &[
        ("hrv_balance", Unit::Milliseconds),
        ("hrv", Unit::Milliseconds),
        ("average_hrv", Unit::Milliseconds),
      ],
    },
    Column {
      field:   Field::TemperatureDeviation,
      aliases: &[
        ("temperature_deviation", Unit::Celsius),
        ("temperature", Unit::Celsius),
        ("skin_temp_deviation", Unit::Celsius),
      ],
    },
    Column { field: Field::RecoveryIndex, aliases: &[("recovery_index", Unit::Count)] },
    Column { field: Field::ActivityBalance, aliases: &[("activity_balance", Unit::Count)] },
    Column { field: Field::SleepBalance, aliases: &[("sleep_balance", Unit::Count)] },
  ],
};

static OURA_SLEEP: Layout = Layout {
  category: Category::Sleep,
  metric:   "sleep",
  recorded: OURA_DAY,
  start:    &["bedtime_start", "sleep_start"],
  end:      &["bedtime_end", "sleep_end"],
  columns:  &[
    Column {
      field:   Field::SleepPerformance,
      aliases: &[("efficiency", Unit::Percent), ("sleep_efficiency", Unit::Percent)],
    },
    Column {
      field:   Field::TimeInBed,
      aliases: &[("time_in_bed", Unit::Seconds), ("total_bedtime", Unit::Seconds)],
    },
    Column {
      field:   Field::DeepSleep,
      aliases: &[
        ("deep_sleep_duration", Unit::Seconds),
        ("deep", Unit::Seconds),
        ("deep_sleep", Unit::Seconds),
      ],
    },
    Column {
      field:   Field::LightSleep,
      aliases: &[
        ("light_sleep_duration", Unit::Seconds),
        ("light", Unit::Seconds),
        ("light_sleep", Unit::Seconds),
      ],
    },
    Column {
      field:   Field::RemSleep,
      aliases: &[
        ("rem_sleep_duration", Unit::Seconds),
        ("rem", Unit::Seconds),
        ("rem_sleep", Unit::Seconds),
      ],
    },
    Column {
      field:   Field::Awake,
      aliases: &[
        ("awake_duration", Unit::Seconds),
        ("awake_time", Unit::Seconds),
        ("awake", Unit::Seconds),
      ],
    },
    Column {
      field:   Field::Disturbances,
      aliases: &[("restless_periods", Unit::Count), ("disturbances", Unit::Count)],
    },
    Column {
      field:   Field::LowestHeartRate,
      aliases: &[
        ("hr_lowest", Unit::CountPerMinute),
        ("lowest_heart_rate", Unit::CountPerMinute),
      ],
    },
    Column {
      field:   Field::Hrv,
      aliases: &[
        ("average_hrv", Unit::Milliseconds),
        ("hrv_average", Unit::Milliseconds),
        ("hrv", Unit::Milliseconds),
      ],
    },
  ],
};

#[cfg(test)]
mod tests {
  use super::*;

  fn header(cols: &[&str]) -> Header { Header::new(cols.iter().copied()) }

  #[test]
  fn classifies_whoop_exports() {
    let recovery = header(&[
      "Cycle start time",
      "Recovery score %",
      "Resting heart rate (bpm)",
      "Heart rate variability (ms)",
    ]);
    assert_eq!(TabularKind::classify(&recovery, None).unwrap(), TabularKind::WhoopRecovery);

    let sleep = header(&["Cycle start time", "Sleep onset", "Wake onset", "Sleep performance %"]);
    assert_eq!(TabularKind::classify(&sleep, None).unwrap(), TabularKind::WhoopSleep);

    let strain = header(&["Cycle start time", "Day Strain", "Energy burned (cal)", "Max HR (bpm)"]);
    assert_eq!(TabularKind::classify(&strain, None).unwrap(), TabularKind::WhoopStrain);
  }

  #[test]
  fn classifies_oura_exports() {
    let readiness = header(&["date", "readiness_score", "hrv_balance", "recovery_index"]);
    assert_eq!(TabularKind::classify(&readiness, None).unwrap(), TabularKind::OuraReadiness);

    let sleep = header(&["date", "bedtime_start", "bedtime_end", "deep_sleep_duration"]);
    assert_eq!(TabularKind::classify(&sleep, None).unwrap(), TabularKind::OuraSleep);

    let activity = header(&["date", "steps", "activity_score"]);
    assert_eq!(TabularKind::classify(&activity, None).unwrap(), TabularKind::OuraActivity);
  }

  #[test]
  fn hint_restricts_candidates() {
    let hrv_only = header(&["date", "hrv_balance", "recovery_score"]);
    assert_eq!(
      TabularKind::classify(&hrv_only, Some(SourceKind::Oura)).unwrap(),
      TabularKind::OuraReadiness
    );
    assert_eq!(
      TabularKind::classify(&hrv_only, Some(SourceKind::Whoop)).unwrap(),
      TabularKind::WhoopRecovery
    );
  }

  #[test]
  fn ties_go_to_declaration_order() {
    let tied = header(&["recovery_score", "day_strain"]);
    assert_eq!(TabularKind::classify(&tied, None).unwrap(), TabularKind::WhoopRecovery);
  }

  #[test]
  fn unknown_header_is_a_typed_error() {
    let unknown = header(&["name", "email"]);
    assert!(matches!(
      TabularKind::classify(&unknown, None),
      Err(Error::UnrecognizedFormat { .. })
    ));
    assert!(TabularKind::classify(&unknown, Some(SourceKind::AppleHealth)).is_err());
  }
}
