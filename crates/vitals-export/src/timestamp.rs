//! Exporter timestamp formats, all converted to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Apple Health dates always carry an offset: `2024-01-15 08:23:44 -0500`.
pub fn parse_apple(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S %z")
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// Whoop and Oura CSV dates and Fitbit JSON dates. Offset-bearing values are converted; naive
/// values are taken as UTC.
pub fn parse_vendor(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
    return Some(dt.with_timezone(&Utc));
  }

  NAIVE_DATETIME_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .or_else(|| {
      DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
    })
    .map(|naive| naive.and_utc())
}
