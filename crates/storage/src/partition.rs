//! Partition boundaries for timestamped tables.

use chrono::{DateTime, Datelike, NaiveDate};
use strata_core::schema::PartitionBy;
use strata_core::{Error, Result};

/// Returns the first microsecond of the partition holding `ts`.
pub fn partition_floor(partition_by: PartitionBy, ts: i64) -> Result<i64> {
    if partition_by == PartitionBy::None {
        return Ok(i64::MIN);
    }
    let dt = DateTime::from_timestamp_micros(ts)
        .ok_or_else(|| Error::storage("timestamp out of range"))?
        .naive_utc();
    let date = match partition_by {
        PartitionBy::Day => Some(dt.date()),
        PartitionBy::Month => NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1),
        PartitionBy::Year => NaiveDate::from_ymd_opt(dt.year(), 1, 1),
        PartitionBy::None => None,
    };
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc().timestamp_micros())
        .ok_or_else(|| Error::storage("timestamp out of range"))
}
