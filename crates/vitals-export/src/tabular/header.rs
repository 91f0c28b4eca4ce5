//! Header normalization and alias lookup.

use std::collections::HashMap;

use csv::StringRecord;
use vitals_core::record::Reading;

use super::kind::Column;

/// Canonical spelling of a column name: `"Recovery score %"` becomes
/// `recovery_score_pct`, `"Deep (SWS) duration (min)"` becomes
/// `deep_sws_duration_min`.
pub fn normalize_header(raw: &str) -> String {
  raw
    .trim_start_matches('\u{feff}')
    .trim()
    .to_lowercase()
    .replace(' ', "_")
    .replace(['(', ')'], "")
    .replace('%', "pct")
    .replace('/', "_per_")
}

/// Normalized header row with a name → position index.
#[derive(Debug, Clone)]
pub struct Header {
  names: Vec<String>,
  index: HashMap<String, usize>,
}

impl Header {
  pub fn new<'a>(raw: impl IntoIterator<Item = &'a str>) -> Self {
    let names: Vec<String> = raw.into_iter().map(normalize_header).collect();
    let mut index = HashMap::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
      // Keep the leftmost of repeated names.
      index.entry(name.clone()).or_insert(i);
    }
    Self { names, index }
  }

  pub fn contains(&self, name: &str) -> bool { self.index.contains_key(name) }

  pub fn names(&self) -> &[String] { &self.names }

  fn cell<'r>(&self, row: &'r StringRecord, name: &str) -> Option<&'r str> {
    let i = *self.index.get(name)?;
    row.get(i).map(str::trim).filter(|v| !v.is_empty())
  }

  /// First non-empty cell among `aliases`.
  pub fn first_text<'r>(&self, row: &'r StringRecord, aliases: &[&str]) -> Option<&'r str> {
    aliases.iter().find_map(|name| self.cell(row, name))
  }

  /// Coalesce `column` over `row`: the first alias whose column exists and
  /// whose cell parses as a number wins, together with that alias's unit.
  /// A parsed `0.0` is a value, not a miss.
  pub fn coalesce(&self, row: &StringRecord, column: &Column) -> Option<Reading> {
    column.aliases.iter().find_map(|(name, unit)| {
      let value: f64 = self.cell(row, name)?.parse().ok()?;
      Some(Reading::new(column.field, value, unit.clone()))
    })
  }
}

impl From<&StringRecord> for Header {
  fn from(row: &StringRecord) -> Self { Self::new(row.iter()) }
}

#[cfg(test)]
mod tests {
  use vitals_core::record::{Field, Unit};

  use super::*;

  const HRV: Column = Column {
    field:   Field::Hrv,
    aliases: &[
      ("heart_rate_variability_ms", Unit::Milliseconds),
      ("hrv_ms", Unit::Milliseconds),
      ("hrv", Unit::Milliseconds),
    ],
  };

  #[test]
  fn normalizes_exporter_headers() {
    assert_eq!(normalize_header("\u{feff}Cycle start time"), "cycle_start_time");
    assert_eq!(normalize_header(" Recovery score % "), "recovery_score_pct");
    assert_eq!(normalize_header("Deep (SWS) duration (min)"), "deep_sws_duration_min");
    assert_eq!(normalize_header("Steps/Day"), "steps_per_day");
  }

  #[test]
  fn coalesce_keeps_zero_from_primary_column() {
    let header = Header::new(["Heart rate variability (ms)", "HRV"]);
    let row = StringRecord::from(vec!["0.0", "55"]);
    let reading = header.coalesce(&row, &HRV).unwrap();
    assert_eq!(reading.value, 0.0);
  }

  #[test]
  fn coalesce_falls_through_empty_and_unparseable_cells() {
    let header = Header::new(["heart_rate_variability_ms", "hrv_ms", "hrv"]);
    let row = StringRecord::from(vec!["", "n/a", "61"]);
    assert_eq!(header.coalesce(&row, &HRV).unwrap().value, 61.0);

    let empty = StringRecord::from(vec!["", "", ""]);
    assert!(header.coalesce(&empty, &HRV).is_none());
  }
}
