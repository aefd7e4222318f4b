//! Keyed aggregation and time sampling.
//!
//! Both factories drain their base when a cursor opens. Groups are emitted
//! in the order their key was first seen. Sampling additionally splits the
//! base into time buckets of the designated timestamp and emits the groups
//! of each bucket before moving to the next one.

use super::{CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::function::{Accumulator, AggregateFunction, FunctionRef};
use crate::model::interval::{DAY_MICROS, HOUR_MICROS, MINUTE_MICROS, SECOND_MICROS};
use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use chrono::{DateTime, Datelike, NaiveDate};
use hashbrown::hash_map::DefaultHashBuilder;
use indexmap::IndexMap;
use strata_core::{Error, Result, RowId, Value};
use tracing::trace;

/// Source of one output column of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupColumn {
    /// The key function at this index.
    Key(usize),
    /// The aggregate at this index.
    Aggregate(usize),
    /// Start of the sample bucket.
    Timestamp,
}

type Groups = IndexMap<Vec<Value>, Vec<Accumulator>, DefaultHashBuilder>;

/// Key functions, aggregates and the output layout shared by both
/// factories.
struct Aggregation {
    keys: Vec<FunctionRef>,
    aggregates: Vec<AggregateFunction>,
    columns: Vec<GroupColumn>,
}

impl Aggregation {
    fn accumulate(&self, groups: &mut Groups, record: &dyn Record) {
        let key: Vec<Value> = self.keys.iter().map(|k| k.eval(record)).collect();
        let accumulators = groups
            .entry(key)
            .or_insert_with(|| self.aggregates.iter().map(|a| a.accumulator()).collect());
        for (aggregate, acc) in self.aggregates.iter().zip(accumulators.iter_mut()) {
            aggregate.update(acc, record);
        }
    }

    fn emit(&self, groups: Groups, bucket: Option<i64>, out: &mut Vec<Vec<Value>>) {
        for (key, accumulators) in groups {
            let row = self
                .columns
                .iter()
                .map(|c| match *c {
                    GroupColumn::Key(i) => key.get(i).cloned().unwrap_or(Value::Null),
                    GroupColumn::Aggregate(i) => accumulators.get(i).map_or(Value::Null, |a| a.result()),
                    GroupColumn::Timestamp => bucket.map_or(Value::Null, Value::Timestamp),
                })
                .collect();
            out.push(row);
        }
    }
}

/// Cursor over rows computed when the cursor opened.
struct GroupCursor {
    rows: Vec<Vec<Value>>,
    next: usize,
}

impl Record for GroupCursor {
    fn value(&self, column: usize) -> Value {
        match self.next.checked_sub(1).and_then(|i| self.rows.get(i)) {
            Some(row) => row.value(column),
            None => Value::Null,
        }
    }

    fn row_id(&self) -> Option<RowId> {
        self.next.checked_sub(1).map(|i| i as RowId)
    }
}

impl RecordCursor for GroupCursor {
    fn has_next(&mut self) -> Result<bool> {
        if self.next < self.rows.len() {
            self.next += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn record(&self) -> &dyn Record {
        self
    }

    fn to_top(&mut self) {
        self.next = 0;
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        if (row as usize) < self.rows.len() {
            self.next = row as usize + 1;
            Ok(())
        } else {
            Err(Error::cursor_misuse(format!("row {} out of range", row)))
        }
    }
}

/// `select k, agg(x) from ...`: one row per distinct key.
///
/// Without key columns the whole input is a single group, which is emitted
/// even when the input is empty.
pub struct GroupByRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    metadata: CursorMetadata,
    aggregation: Aggregation,
}

impl GroupByRecordCursorFactory {
    pub fn new(
        base: Box<dyn RecordCursorFactory>,
        metadata: CursorMetadata,
        keys: Vec<FunctionRef>,
        aggregates: Vec<AggregateFunction>,
        columns: Vec<GroupColumn>,
    ) -> Self {
        Self {
            base,
            metadata,
            aggregation: Aggregation {
                keys,
                aggregates,
                columns,
            },
        }
    }
}

impl RecordCursorFactory for GroupByRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let mut groups = Groups::default();
        if self.aggregation.keys.is_empty() {
            groups.insert(
                Vec::new(),
                self.aggregation.aggregates.iter().map(|a| a.accumulator()).collect(),
            );
        }
        let mut base = self.base.cursor()?;
        while base.has_next()? {
            self.aggregation.accumulate(&mut groups, base.record());
        }
        trace!(groups = groups.len(), "group by");
        let mut rows = Vec::with_capacity(groups.len());
        self.aggregation.emit(groups, None, &mut rows);
        Ok(Box::new(GroupCursor { rows, next: 0 }))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "GroupBy"
    }

    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        vec![self.base.as_ref()]
    }
}

/// Bucket width of `sample by`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sampler {
    pub count: i32,
    /// One of `s m h d M y`.
    pub unit: char,
}

impl Sampler {
    /// Parses `<count><unit>`, such as `15m` or `1M`.
    pub fn parse(text: &str, position: usize) -> Result<Self> {
        let invalid = || Error::parse(position, "Invalid sample by period");
        let unit = text.chars().last().ok_or_else(invalid)?;
        if !matches!(unit, 's' | 'm' | 'h' | 'd' | 'M' | 'y') {
            return Err(invalid());
        }
        let digits = &text[..text.len() - unit.len_utf8()];
        let count = if digits.is_empty() {
            1
        } else {
            digits.parse::<i32>().map_err(|_| invalid())?
        };
        if count <= 0 {
            return Err(invalid());
        }
        Ok(Self { count, unit })
    }

    fn fixed_width(&self) -> Option<i64> {
        let unit = match self.unit {
            's' => SECOND_MICROS,
            'm' => MINUTE_MICROS,
            'h' => HOUR_MICROS,
            'd' => DAY_MICROS,
            _ => return None,
        };
        Some(unit * self.count as i64)
    }

    /// Start of the bucket holding `ts`. Buckets are aligned to the epoch.
    pub fn bucket(&self, ts: i64) -> Option<i64> {
        if let Some(width) = self.fixed_width() {
            return Some(ts - ts.rem_euclid(width));
        }
        let date = DateTime::from_timestamp_micros(ts)?.date_naive();
        let step = if self.unit == 'y' { 12 * self.count } else { self.count };
        let months = (date.year() - 1970) * 12 + date.month0() as i32;
        let start = months - months.rem_euclid(step);
        let first = NaiveDate::from_ymd_opt(1970 + start.div_euclid(12), start.rem_euclid(12) as u32 + 1, 1)?;
        Some(first.and_hms_opt(0, 0, 0)?.and_utc().timestamp_micros())
    }
}

/// `sample by`: groups per time bucket of the designated timestamp.
pub struct SampleByRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    metadata: CursorMetadata,
    timestamp: usize,
    sampler: Sampler,
    aggregation: Aggregation,
}

impl SampleByRecordCursorFactory {
    pub fn new(
        base: Box<dyn RecordCursorFactory>,
        metadata: CursorMetadata,
        timestamp: usize,
        sampler: Sampler,
        keys: Vec<FunctionRef>,
        aggregates: Vec<AggregateFunction>,
        columns: Vec<GroupColumn>,
    ) -> Self {
        Self {
            base,
            metadata,
            timestamp,
            sampler,
            aggregation: Aggregation {
                keys,
                aggregates,
                columns,
            },
        }
    }
}

impl RecordCursorFactory for SampleByRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let mut rows = Vec::new();
        let mut groups = Groups::default();
        let mut current: Option<i64> = None;
        let mut base = self.base.cursor()?;
        while base.has_next()? {
            let record = base.record();
            let Value::Timestamp(ts) = record.value(self.timestamp) else {
                continue;
            };
            let bucket = self.sampler.bucket(ts);
            if bucket != current {
                if !groups.is_empty() {
                    self.aggregation
                        .emit(core::mem::take(&mut groups), current, &mut rows);
                }
                current = bucket;
            }
            self.aggregation.accumulate(&mut groups, record);
        }
        self.aggregation.emit(groups, current, &mut rows);
        trace!(rows = rows.len(), "sample by");
        Ok(Box::new(GroupCursor { rows, next: 0 }))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "SampleBy"
    }

    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        vec![self.base.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::collect_rows;
    use crate::cursor::test_support::*;
    use crate::function::{AggregateKind, RecordColumn};
    use strata_core::DataType;

    fn sales() -> Box<dyn RecordCursorFactory> {
        let row = |k: &str, v: i32, ts: i64| vec![Value::from(k), Value::Int(v), Value::Timestamp(ts)];
        Box::new(RowsFactory::new(
            &[("k", DataType::Symbol), ("v", DataType::Int), ("ts", DataType::Timestamp)],
            vec![
                row("a", 1, 0),
                row("b", 2, HOUR_MICROS / 2),
                row("a", 3, HOUR_MICROS),
                row("a", 4, 2 * HOUR_MICROS + 1),
            ],
        ))
    }

    fn aggregate(kind: AggregateKind) -> AggregateFunction {
        let arg: FunctionRef = Box::new(RecordColumn::new(1, DataType::Int));
        AggregateFunction::new(kind, Some(arg), 0).unwrap()
    }

    fn metadata(columns: &[(&str, DataType)]) -> CursorMetadata {
        let mut m = CursorMetadata::new();
        for (n, t) in columns {
            m.add(*n, *t);
        }
        m
    }

    #[test]
    fn test_group_by_key() {
        let factory = GroupByRecordCursorFactory::new(
            sales(),
            metadata(&[("k", DataType::String), ("sum", DataType::Long)]),
            vec![Box::new(RecordColumn::new(0, DataType::Symbol))],
            vec![aggregate(AggregateKind::Sum)],
            vec![GroupColumn::Key(0), GroupColumn::Aggregate(0)],
        );
        assert_eq!(
            collect_rows(&factory).unwrap(),
            [
                vec![Value::from("a"), Value::Long(8)],
                vec![Value::from("b"), Value::Long(2)],
            ]
        );
    }

    #[test]
    fn test_no_keys_single_group() {
        let empty = Box::new(RowsFactory::new(&[("v", DataType::Int)], Vec::new()));
        let count = AggregateFunction::new(AggregateKind::Count, None, 0).unwrap();
        let factory = GroupByRecordCursorFactory::new(
            empty,
            metadata(&[("count", DataType::Long)]),
            Vec::new(),
            vec![count],
            vec![GroupColumn::Aggregate(0)],
        );
        assert_eq!(collect_rows(&factory).unwrap(), [vec![Value::Long(0)]]);
    }

    #[test]
    fn test_sample_by_hour() {
        let factory = SampleByRecordCursorFactory::new(
            sales(),
            metadata(&[("ts", DataType::Timestamp), ("k", DataType::String), ("max", DataType::Int)]),
            2,
            Sampler::parse("1h", 0).unwrap(),
            vec![Box::new(RecordColumn::new(0, DataType::Symbol))],
            vec![aggregate(AggregateKind::Max)],
            vec![GroupColumn::Timestamp, GroupColumn::Key(0), GroupColumn::Aggregate(0)],
        );
        let h = HOUR_MICROS;
        assert_eq!(
            collect_rows(&factory).unwrap(),
            [
                vec![Value::Timestamp(0), Value::from("a"), Value::Int(1)],
                vec![Value::Timestamp(0), Value::from("b"), Value::Int(2)],
                vec![Value::Timestamp(h), Value::from("a"), Value::Int(3)],
                vec![Value::Timestamp(2 * h), Value::from("a"), Value::Int(4)],
            ]
        );
    }

    #[test]
    fn test_sampler_units() {
        assert_eq!(Sampler::parse("15m", 0).unwrap(), Sampler { count: 15, unit: 'm' });
        assert_eq!(Sampler::parse("d", 0).unwrap().count, 1);
        assert_eq!(Sampler::parse("0h", 3).unwrap_err().position(), Some(3));
        assert!(Sampler::parse("5x", 0).is_err());

        let day = Sampler::parse("1d", 0).unwrap();
        assert_eq!(day.bucket(DAY_MICROS + 5), Some(DAY_MICROS));
        assert_eq!(day.bucket(-1), Some(-DAY_MICROS));

        // 2021-03-15 falls in the quarter starting 2021-01-01
        let quarter = Sampler::parse("3M", 0).unwrap();
        let mid_march = 1_615_766_400_000_000;
        assert_eq!(quarter.bucket(mid_march), Some(1_609_459_200_000_000));
        let year = Sampler::parse("1y", 0).unwrap();
        assert_eq!(year.bucket(mid_march), Some(1_609_459_200_000_000));
    }
}
