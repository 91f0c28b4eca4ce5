//! Sleep canonicalization: interval merging and device selection.

pub mod merge;
pub mod select;

pub use merge::{BucketKey, Interval, bucket_durations, union_duration};
pub use select::{DeviceNight, NightSummary, nightly_summaries, select_device};
