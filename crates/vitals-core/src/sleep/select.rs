//! Authoritative-device selection for redundantly reported sleep.
//!
//! One real night may be reported by companion apps writing a long
//! `unspecified` umbrella segment and by the primary wearable writing
//! granular stages. Adding both double-counts, so exactly one device is
//! chosen per night:
//!
//! 1. if any device reports granular stages, only those devices compete and
//!    every umbrella segment is ignored;
//! 2. a device named like the primary wearable (`watch`) wins;
//! 3. then the greatest deep + REM time;
//! 4. then the greatest total asleep time;
//! 5. then the lexicographically smallest device name.
//!
//! A date where no device reports any asleep time falls back to the device
//! with the most in-bed time, counting that time as light sleep.

use std::{cmp::Reverse, collections::BTreeMap};

use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

use crate::canonical::{SleepSegment, SleepStage};

use super::merge::bucket_durations;

const PRIMARY_WEARABLE_PATTERN: &str = "watch";

// ─── Per-device night ────────────────────────────────────────────────────────

/// Merged stage durations for one device on one date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceNight {
  pub device: String,
  pub stages: BTreeMap<SleepStage, TimeDelta>,
}

impl DeviceNight {
  fn stage(&self, stage: SleepStage) -> TimeDelta {
    self.stages.get(&stage).copied().unwrap_or_else(TimeDelta::zero)
  }

  pub fn is_granular(&self) -> bool {
    self
      .stages
      .iter()
      .any(|(stage, d)| stage.is_granular() && *d > TimeDelta::zero())
  }

  fn is_primary_wearable(&self) -> bool {
    self.device.to_lowercase().contains(PRIMARY_WEARABLE_PATTERN)
  }

  fn deep_rem(&self) -> TimeDelta { self.stage(SleepStage::Deep) + self.stage(SleepStage::Rem) }

  /// Light time: core + light for granular devices, umbrella time otherwise.
  fn light(&self, granular: bool) -> TimeDelta {
    if granular {
      self.stage(SleepStage::Core) + self.stage(SleepStage::Light)
    } else {
      self.stage(SleepStage::Unspecified) + self.stage(SleepStage::Asleep)
    }
  }

  fn asleep(&self, granular: bool) -> TimeDelta { self.deep_rem() + self.light(granular) }

  fn has_sleep(&self) -> bool { self.asleep(self.is_granular()) > TimeDelta::zero() }

  fn rank(&self, granular: bool) -> (bool, TimeDelta, TimeDelta, Reverse<&str>) {
    (
      self.is_primary_wearable(),
      self.deep_rem(),
      self.asleep(granular),
      Reverse(self.device.as_str()),
    )
  }
}

/// Pick the authoritative device among `nights` (all for the same date).
///
/// Returns `None` only for an empty slice.
pub fn select_device(nights: &[DeviceNight]) -> Option<&DeviceNight> {
  let granular = nights.iter().any(DeviceNight::is_granular);
  nights
    .iter()
    .filter(|n| !granular || n.is_granular())
    .max_by(|a, b| a.rank(granular).cmp(&b.rank(granular)))
}

// ─── Nightly summary ─────────────────────────────────────────────────────────

/// Derived per-date sleep totals from the selected device. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightSummary {
  pub date:         NaiveDate,
  pub device:       String,
  /// Whether the selected device reported stage granularity.
  pub granular:     bool,
  pub deep_hours:   f64,
  pub rem_hours:    f64,
  pub light_hours:  f64,
  pub awake_hours:  f64,
  pub in_bed_hours: f64,
  pub asleep_hours: f64,
}

fn hours(d: TimeDelta) -> f64 { d.num_seconds() as f64 / 3600.0 }

/// Merge, group by date and select one device per date.
///
/// Only devices with asleep time compete. Dates with in-bed time alone are
/// summarized from in-bed time; dates with neither are omitted.
pub fn nightly_summaries(segments: &[SleepSegment]) -> Vec<NightSummary> {
  let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, DeviceNight>> = BTreeMap::new();

  for (key, merged) in bucket_durations(segments) {
    let night = by_date
      .entry(key.date)
      .or_default()
      .entry(key.device.clone())
      .or_insert_with(|| DeviceNight { device: key.device, ..Default::default() });
    night.stages.insert(key.stage, merged);
  }

  by_date
    .into_iter()
    .filter_map(|(date, devices)| {
      let nights: Vec<DeviceNight> = devices.into_values().collect();
      let sleeping: Vec<DeviceNight> = nights.iter().filter(|n| n.has_sleep()).cloned().collect();
      match select_device(&sleeping) {
        Some(chosen) => Some(summarize(date, chosen)),
        None => in_bed_fallback(date, &nights),
      }
    })
    .collect()
}

fn summarize(date: NaiveDate, chosen: &DeviceNight) -> NightSummary {
  let granular = chosen.is_granular();
  NightSummary {
    date,
    device: chosen.device.clone(),
    granular,
    deep_hours: hours(chosen.stage(SleepStage::Deep)),
    rem_hours: hours(chosen.stage(SleepStage::Rem)),
    light_hours: hours(chosen.light(granular)),
    awake_hours: hours(chosen.stage(SleepStage::Awake)),
    in_bed_hours: hours(chosen.stage(SleepStage::InBed)),
    asleep_hours: hours(chosen.asleep(granular)),
  }
}

fn in_bed_fallback(date: NaiveDate, nights: &[DeviceNight]) -> Option<NightSummary> {
  let chosen = nights.iter().max_by(|a, b| {
    (a.stage(SleepStage::InBed), Reverse(a.device.as_str()))
      .cmp(&(b.stage(SleepStage::InBed), Reverse(b.device.as_str())))
  })?;
  let in_bed = chosen.stage(SleepStage::InBed);
  if in_bed <= TimeDelta::zero() {
    return None;
  }

  Some(NightSummary {
    date,
    device: chosen.device.clone(),
    granular: false,
    deep_hours: 0.0,
    rem_hours: 0.0,
    light_hours: hours(in_bed),
    awake_hours: hours(chosen.stage(SleepStage::Awake)),
    in_bed_hours: hours(in_bed),
    asleep_hours: hours(in_bed),
  })
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeZone, Utc};

  use super::*;

  fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
  }

  fn seg(
    from: (u32, u32),
    to: (u32, u32),
    stage: SleepStage,
    device: &str,
  ) -> SleepSegment {
    SleepSegment::new(at(2, from.0, from.1), at(2, to.0, to.1), stage, device).unwrap()
  }

  fn night(device: &str, stages: &[(SleepStage, i64)]) -> DeviceNight {
    DeviceNight {
      device: device.into(),
      stages: stages
        .iter()
        .map(|(s, mins)| (*s, TimeDelta::minutes(*mins)))
        .collect(),
    }
  }

  #[test]
  fn granular_device_beats_umbrella_only_device() {
    let segments = vec![
      seg((0, 0), (2, 0), SleepStage::Deep, "Sleep Tracker A"),
      seg((2, 0), (3, 30), SleepStage::Rem, "Sleep Tracker A"),
      seg((0, 0), (8, 0), SleepStage::Unspecified, "Companion B"),
    ];

    let summaries = nightly_summaries(&segments);
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s.device, "Sleep Tracker A");
    assert!(s.granular);
    assert_eq!(s.deep_hours + s.rem_hours, 3.5);
    assert_eq!(s.asleep_hours, 3.5);
  }

  #[test]
  fn umbrella_of_the_granular_device_is_excluded() {
    let segments = vec![
      seg((1, 0), (2, 0), SleepStage::Deep, "Apple Watch"),
      seg((2, 0), (4, 0), SleepStage::Core, "Apple Watch"),
      seg((0, 30), (7, 0), SleepStage::Unspecified, "Apple Watch"),
    ];

    let s = &nightly_summaries(&segments)[0];
    assert_eq!(s.light_hours, 2.0);
    assert_eq!(s.asleep_hours, 3.0);
  }

  #[test]
  fn watch_named_device_is_preferred_over_more_deep_rem() {
    let nights = vec![
      night("AutoSleep", &[(SleepStage::Deep, 120), (SleepStage::Rem, 120)]),
      night("Apple Watch", &[(SleepStage::Deep, 30), (SleepStage::Rem, 30)]),
    ];
    assert_eq!(select_device(&nights).unwrap().device, "Apple Watch");
  }

  #[test]
  fn without_watch_greatest_deep_rem_wins() {
    let nights = vec![
      night("Oura", &[(SleepStage::Deep, 60), (SleepStage::Rem, 30)]),
      night("Sleep Cycle", &[(SleepStage::Deep, 70), (SleepStage::Rem, 40)]),
    ];
    assert_eq!(select_device(&nights).unwrap().device, "Sleep Cycle");
  }

  #[test]
  fn full_tie_breaks_on_device_name() {
    let nights = vec![
      night("b-app", &[(SleepStage::Deep, 60)]),
      night("a-app", &[(SleepStage::Deep, 60)]),
    ];
    assert_eq!(select_device(&nights).unwrap().device, "a-app");

    let mut reversed = nights.clone();
    reversed.reverse();
    assert_eq!(select_device(&reversed).unwrap().device, "a-app");
  }

  #[test]
  fn umbrella_only_nights_use_unspecified_time() {
    let segments = vec![
      seg((0, 0), (6, 0), SleepStage::Unspecified, "Companion"),
      seg((0, 0), (7, 0), SleepStage::Unspecified, "Other App"),
    ];
    let s = &nightly_summaries(&segments)[0];
    assert!(!s.granular);
    assert_eq!(s.device, "Other App");
    assert_eq!(s.light_hours, 7.0);
  }

  #[test]
  fn granular_watch_beats_vendor_asleep_night() {
    let segments = vec![
      seg((0, 0), (1, 0), SleepStage::Deep, "Apple Watch"),
      seg((1, 0), (2, 30), SleepStage::Rem, "Apple Watch"),
      seg((2, 30), (6, 0), SleepStage::Core, "Apple Watch"),
      seg((0, 0), (8, 0), SleepStage::Asleep, "whoop"),
    ];

    let summaries = nightly_summaries(&segments);
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s.device, "Apple Watch");
    assert!(s.granular);
    assert_eq!(s.light_hours, 3.5);
    assert_eq!(s.asleep_hours, 6.0);
  }

  #[test]
  fn in_bed_only_dates_count_as_light_sleep() {
    let segments = vec![seg((0, 0), (8, 0), SleepStage::InBed, "Phone")];
    let summaries = nightly_summaries(&segments);
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s.device, "Phone");
    assert!(!s.granular);
    assert_eq!(s.light_hours, 8.0);
    assert_eq!(s.asleep_hours, 8.0);
    assert_eq!(s.deep_hours + s.rem_hours, 0.0);
  }

  #[test]
  fn in_bed_only_watch_does_not_hide_another_devices_sleep() {
    let segments = vec![
      seg((0, 0), (8, 0), SleepStage::InBed, "Apple Watch"),
      seg((0, 30), (7, 0), SleepStage::Unspecified, "Companion"),
    ];
    let s = &nightly_summaries(&segments)[0];
    assert_eq!(s.device, "Companion");
    assert_eq!(s.asleep_hours, 6.5);
  }

  #[test]
  fn awake_only_dates_are_omitted() {
    let segments = vec![seg((3, 0), (3, 20), SleepStage::Awake, "Apple Watch")];
    assert!(nightly_summaries(&segments).is_empty());
  }

  #[test]
  fn empty_input_selects_nothing() {
    assert!(select_device(&[]).is_none());
  }
}
