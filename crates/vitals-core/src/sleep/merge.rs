//! Interval union arithmetic for sleep segments.
//!
//! Devices may write both short per-cycle segments and a longer reprocessed
//! block covering the same span. Elapsed time is therefore the measure of the
//! union of a bucket's intervals, never the sum of their lengths.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::canonical::{SleepSegment, SleepStage};

/// Upper bound, in hours, a single bucket is expected to stay under.
/// Cross-midnight sessions can legitimately exceed it, so it is only logged.
const BUCKET_SANITY_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl From<&SleepSegment> for Interval {
  fn from(seg: &SleepSegment) -> Self { Self { start: seg.start(), end: seg.end() } }
}

/// Length of the union of `intervals`.
///
/// Sorts by start and merges any interval whose start is at or before the
/// current run's end. Input order does not affect the result.
pub fn union_duration<I>(intervals: I) -> TimeDelta
where
  I: IntoIterator<Item = Interval>,
{
  let mut sorted: Vec<Interval> = intervals.into_iter().collect();
  sorted.sort_unstable();

  let mut iter = sorted.into_iter();
  let Some(first) = iter.next() else {
    return TimeDelta::zero();
  };

  let mut total = TimeDelta::zero();
  let (mut run_start, mut run_end) = (first.start, first.end);

  for iv in iter {
    if iv.start <= run_end {
      run_end = run_end.max(iv.end);
    } else {
      total += run_end - run_start;
      run_start = iv.start;
      run_end = iv.end;
    }
  }

  total + (run_end - run_start)
}

/// Grouping key for merged durations.
///
/// `date` is the UTC calendar date of each segment's start, so a session
/// crossing midnight lands in two buckets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BucketKey {
  pub date:   NaiveDate,
  pub device: String,
  pub stage:  SleepStage,
}

/// Merged duration per `(date, device, stage)`.
pub fn bucket_durations(segments: &[SleepSegment]) -> BTreeMap<BucketKey, TimeDelta> {
  let mut groups: BTreeMap<BucketKey, Vec<Interval>> = BTreeMap::new();
  for seg in segments {
    let key = BucketKey {
      date:   seg.start().date_naive(),
      device: seg.device().to_owned(),
      stage:  seg.stage(),
    };
    groups.entry(key).or_default().push(Interval::from(seg));
  }

  groups
    .into_iter()
    .map(|(key, intervals)| {
      let merged = union_duration(intervals);
      if merged > TimeDelta::hours(BUCKET_SANITY_HOURS) {
        tracing::warn!(
          date = %key.date,
          device = %key.device,
          stage = %key.stage,
          hours = merged.num_minutes() as f64 / 60.0,
          "merged sleep bucket exceeds 24h"
        );
      }
      (key, merged)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, h, m, 0).unwrap()
  }

  fn iv(a: (u32, u32), b: (u32, u32)) -> Interval {
    Interval { start: at(a.0, a.1), end: at(b.0, b.1) }
  }

  #[test]
  fn overlapping_segments_count_once() {
    let total = union_duration([iv((0, 0), (0, 30)), iv((0, 15), (0, 45))]);
    assert_eq!(total, TimeDelta::minutes(45));
  }

  #[test]
  fn touching_segments_merge_into_one_run() {
    let total = union_duration([iv((1, 0), (1, 30)), iv((1, 30), (2, 0))]);
    assert_eq!(total, TimeDelta::minutes(60));
  }

  #[test]
  fn disjoint_segments_sum() {
    let total = union_duration([iv((1, 0), (1, 30)), iv((3, 0), (3, 10))]);
    assert_eq!(total, TimeDelta::minutes(40));
  }

  #[test]
  fn reprocessed_block_swallows_per_cycle_segments() {
    let total = union_duration([
      iv((2, 0), (2, 20)),
      iv((2, 40), (3, 0)),
      iv((1, 50), (3, 10)),
      iv((2, 10), (2, 50)),
    ]);
    assert_eq!(total, TimeDelta::minutes(80));
  }

  #[test]
  fn result_is_independent_of_input_order() {
    let a = [iv((0, 0), (0, 30)), iv((0, 15), (0, 45)), iv((2, 0), (2, 5))];
    let mut b = a;
    b.reverse();
    assert_eq!(union_duration(a), union_duration(b));
  }

  #[test]
  fn empty_input_is_zero() {
    assert_eq!(union_duration(Vec::new()), TimeDelta::zero());
  }

  #[test]
  fn buckets_split_by_device_and_stage() {
    let segs = vec![
      SleepSegment::new(at(1, 0), at(1, 30), SleepStage::Deep, "Watch").unwrap(),
      SleepSegment::new(at(1, 15), at(1, 45), SleepStage::Deep, "Watch").unwrap(),
      SleepSegment::new(at(1, 0), at(2, 0), SleepStage::Rem, "Watch").unwrap(),
      SleepSegment::new(at(1, 0), at(1, 30), SleepStage::Deep, "AutoSleep").unwrap(),
    ];
    let buckets = bucket_durations(&segs);
    assert_eq!(buckets.len(), 3);

    let watch_deep = BucketKey {
      date:   at(0, 0).date_naive(),
      device: "Watch".into(),
      stage:  SleepStage::Deep,
    };
    assert_eq!(buckets[&watch_deep], TimeDelta::minutes(45));
  }
}
