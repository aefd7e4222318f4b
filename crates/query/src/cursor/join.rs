//! Joins of two factories.
//!
//! The slave side is read into memory when a cursor opens; the master side
//! streams. Output records hold the master columns followed by the slave
//! columns.

use super::{materialize, CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::function::FunctionRef;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::{Result, Value};
use tracing::trace;

/// How master rows find their slave rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    /// Equal keys; unmatched master rows are dropped.
    Inner,
    /// Equal keys; unmatched master rows get null slave columns.
    Outer,
    /// Every slave row for every master row.
    Cross,
    /// The latest slave row with a timestamp at or before the master
    /// timestamp, among rows with equal keys. Unmatched master rows get null
    /// slave columns.
    AsOf { master_ts: usize, slave_ts: usize },
}

/// Joins `master` with `slave`.
///
/// `filter` is evaluated over the joined record. Inner and cross joins drop
/// combinations that fail it; outer and as-of joins treat it as part of the
/// match condition.
pub struct JoinRecordCursorFactory {
    master: Box<dyn RecordCursorFactory>,
    slave: Box<dyn RecordCursorFactory>,
    kind: JoinKind,
    master_keys: Vec<usize>,
    slave_keys: Vec<usize>,
    metadata: CursorMetadata,
    filter: Option<FunctionRef>,
}

impl JoinRecordCursorFactory {
    pub fn new(
        master: Box<dyn RecordCursorFactory>,
        slave: Box<dyn RecordCursorFactory>,
        kind: JoinKind,
        master_keys: Vec<usize>,
        slave_keys: Vec<usize>,
        metadata: CursorMetadata,
        filter: Option<FunctionRef>,
    ) -> Self {
        Self {
            master,
            slave,
            kind,
            master_keys,
            slave_keys,
            metadata,
            filter,
        }
    }
}

/// Key of a row; `None` when any key column is null, which never matches.
fn key_of(record: &dyn Record, columns: &[usize]) -> Option<Vec<Value>> {
    let key: Vec<Value> = columns.iter().map(|&c| record.value(c)).collect();
    (!key.iter().any(Value::is_null)).then_some(key)
}

fn timestamp(record: &dyn Record, column: usize) -> Option<i64> {
    match record.value(column) {
        Value::Timestamp(ts) => Some(ts),
        _ => None,
    }
}

/// Slave rows indexed by key. Rows keep their slave order.
struct SlaveTable {
    rows: Vec<Vec<Value>>,
    by_key: HashMap<Vec<Value>, Vec<usize>>,
    /// Timestamps of the rows in `by_key`, for as-of lookups.
    timestamps: Vec<Option<i64>>,
}

struct JoinCursor<'a> {
    factory: &'a JoinRecordCursorFactory,
    master: Box<dyn RecordCursor + 'a>,
    slave: SlaveTable,
    master_width: usize,
    slave_width: usize,
    candidates: Vec<usize>,
    next_candidate: usize,
    /// A null-padded row is still owed for the current master row.
    pending_outer: bool,
    current: Vec<Value>,
    master_row: Vec<Value>,
}

impl JoinCursor<'_> {
    fn combine(&mut self, slave: Option<usize>) {
        self.current.clear();
        self.current.extend_from_slice(&self.master_row);
        match slave {
            Some(i) => self.current.extend_from_slice(&self.slave.rows[i]),
            None => self
                .current
                .extend(core::iter::repeat(Value::Null).take(self.slave_width)),
        }
    }

    fn passes(&self) -> bool {
        self.factory
            .filter
            .as_ref()
            .map_or(true, |f| f.get_bool(&self.current))
    }

    fn open_master_row(&mut self) {
        let record = self.master.record();
        self.master_row = materialize(record, self.master_width);
        self.next_candidate = 0;
        self.candidates.clear();
        let factory = self.factory;
        match factory.kind {
            JoinKind::Cross => self.candidates.extend(0..self.slave.rows.len()),
            JoinKind::Inner | JoinKind::Outer => {
                if let Some(rows) = key_of(&self.master_row, &factory.master_keys)
                    .and_then(|key| self.slave.by_key.get(&key))
                {
                    self.candidates.extend_from_slice(rows);
                }
            }
            JoinKind::AsOf { master_ts, .. } => {
                let key = if factory.master_keys.is_empty() {
                    Some(Vec::new())
                } else {
                    key_of(&self.master_row, &factory.master_keys)
                };
                let ts = timestamp(&self.master_row, master_ts);
                if let (Some(rows), Some(ts)) = (key.and_then(|k| self.slave.by_key.get(&k)), ts) {
                    let timestamps = &self.slave.timestamps;
                    let end = rows.partition_point(|&i| timestamps[i].map_or(true, |t| t <= ts));
                    // latest first
                    self.candidates.extend(rows[..end].iter().rev());
                }
            }
        }
        self.pending_outer = matches!(factory.kind, JoinKind::Outer | JoinKind::AsOf { .. });
    }
}

impl Record for JoinCursor<'_> {
    fn value(&self, column: usize) -> Value {
        self.current.value(column)
    }
}

impl RecordCursor for JoinCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        loop {
            while self.next_candidate < self.candidates.len() {
                let slave = self.candidates[self.next_candidate];
                self.next_candidate += 1;
                self.combine(Some(slave));
                if self.passes() {
                    if let JoinKind::AsOf { .. } = self.factory.kind {
                        self.next_candidate = self.candidates.len();
                    }
                    self.pending_outer = false;
                    return Ok(true);
                }
            }
            if self.pending_outer {
                self.pending_outer = false;
                self.combine(None);
                return Ok(true);
            }
            if !self.master.has_next()? {
                return Ok(false);
            }
            self.open_master_row();
        }
    }

    fn record(&self) -> &dyn Record {
        self
    }

    fn to_top(&mut self) {
        self.master.to_top();
        self.candidates.clear();
        self.next_candidate = 0;
        self.pending_outer = false;
    }
}

impl RecordCursorFactory for JoinRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let slave_width = self.slave.metadata().len();
        let mut rows = Vec::new();
        let mut by_key: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
        let mut timestamps = Vec::new();
        let mut cursor = self.slave.cursor()?;
        while cursor.has_next()? {
            let record = cursor.record();
            let index = rows.len();
            rows.push(materialize(record, slave_width));
            match self.kind {
                JoinKind::Cross => {}
                JoinKind::AsOf { slave_ts, .. } => {
                    timestamps.push(timestamp(record, slave_ts));
                    let key = if self.slave_keys.is_empty() {
                        Some(Vec::new())
                    } else {
                        key_of(record, &self.slave_keys)
                    };
                    if let Some(key) = key {
                        by_key.entry(key).or_default().push(index);
                    }
                }
                JoinKind::Inner | JoinKind::Outer => {
                    timestamps.push(None);
                    if let Some(key) = key_of(record, &self.slave_keys) {
                        by_key.entry(key).or_default().push(index);
                    }
                }
            }
        }
        trace!(kind = ?self.kind, slave_rows = rows.len(), keys = by_key.len(), "join");

        Ok(Box::new(JoinCursor {
            factory: self,
            master: self.master.cursor()?,
            slave: SlaveTable {
                rows,
                by_key,
                timestamps,
            },
            master_width: self.master.metadata().len(),
            slave_width,
            candidates: Vec::new(),
            next_candidate: 0,
            pending_outer: false,
            current: Vec::new(),
            master_row: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        match self.kind {
            JoinKind::Inner => "HashJoin",
            JoinKind::Outer => "HashOuterJoin",
            JoinKind::Cross => "CrossJoin",
            JoinKind::AsOf { .. } => "AsOfJoin",
        }
    }

    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        vec![self.master.as_ref(), self.slave.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::collect_rows;
    use crate::cursor::test_support::*;
    use crate::function::{Function, RecordColumn};
    use strata_core::DataType;

    fn metadata(master: &RowsFactory, slave: &RowsFactory) -> CursorMetadata {
        use strata_core::schema::RecordMetadata;
        let mut m = CursorMetadata::new();
        for (prefix, f) in [("a", master), ("b", slave)] {
            for i in 0..f.metadata.len() {
                m.add(alloc::format!("{}.{}", prefix, f.metadata.column_name(i)), f.metadata.column_type(i));
            }
        }
        m
    }

    fn orders() -> RowsFactory {
        RowsFactory::new(
            &[("id", DataType::Int), ("ts", DataType::Timestamp)],
            vec![
                vec![Value::Int(1), Value::Timestamp(10)],
                vec![Value::Int(2), Value::Timestamp(20)],
                vec![Value::Null, Value::Timestamp(30)],
            ],
        )
    }

    fn fills() -> RowsFactory {
        RowsFactory::new(
            &[("id", DataType::Int), ("ts", DataType::Timestamp)],
            vec![
                vec![Value::Null, Value::Timestamp(1)],
                vec![Value::Int(1), Value::Timestamp(5)],
                vec![Value::Int(1), Value::Timestamp(12)],
                vec![Value::Int(3), Value::Timestamp(15)],
            ],
        )
    }

    fn join(kind: JoinKind, keys: bool, filter: Option<FunctionRef>) -> Vec<Vec<Value>> {
        let (m, s) = (orders(), fills());
        let metadata = metadata(&m, &s);
        let k = if keys { vec![0] } else { Vec::new() };
        let factory = JoinRecordCursorFactory::new(Box::new(m), Box::new(s), kind, k.clone(), k, metadata, filter);
        collect_rows(&factory).unwrap()
    }

    fn ts_pairs(rows: &[Vec<Value>]) -> Vec<(Value, Value)> {
        rows.iter().map(|r| (r[1].clone(), r[3].clone())).collect()
    }

    #[test]
    fn test_inner_join() {
        let rows = join(JoinKind::Inner, true, None);
        assert_eq!(
            ts_pairs(&rows),
            [
                (Value::Timestamp(10), Value::Timestamp(5)),
                (Value::Timestamp(10), Value::Timestamp(12)),
            ]
        );
    }

    #[test]
    fn test_outer_join_pads_nulls() {
        let rows = join(JoinKind::Outer, true, None);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], [Value::Int(2), Value::Timestamp(20), Value::Null, Value::Null]);
        assert!(rows[3][2].is_null());
    }

    #[test]
    fn test_cross_join() {
        assert_eq!(join(JoinKind::Cross, false, None).len(), 12);
    }

    #[test]
    fn test_as_of_join() {
        let kind = JoinKind::AsOf { master_ts: 1, slave_ts: 1 };
        let rows = join(kind, true, None);
        assert_eq!(
            ts_pairs(&rows),
            [
                (Value::Timestamp(10), Value::Timestamp(5)),
                (Value::Timestamp(20), Value::Null),
                (Value::Timestamp(30), Value::Null),
            ]
        );

        // without keys every slave row qualifies
        let rows = join(kind, false, None);
        assert_eq!(rows[1][3], Value::Timestamp(15));
    }

    /// `b.ts > 6`
    #[derive(Debug)]
    struct LateFill;

    impl Function for LateFill {
        fn data_type(&self) -> DataType {
            DataType::Boolean
        }

        fn eval(&self, record: &dyn Record) -> Value {
            match RecordColumn::new(3, DataType::Timestamp).eval(record) {
                Value::Timestamp(ts) => Value::Boolean(ts > 6),
                _ => Value::Boolean(false),
            }
        }
    }

    #[test]
    fn test_post_join_filter() {
        let rows = join(JoinKind::Inner, true, Some(Box::new(LateFill)));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][3], Value::Timestamp(12));

        let rows = join(JoinKind::Outer, true, Some(Box::new(LateFill)));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_rewind() {
        let (m, s) = (orders(), fills());
        let metadata = metadata(&m, &s);
        let factory = JoinRecordCursorFactory::new(Box::new(m), Box::new(s), JoinKind::Inner, vec![0], vec![0], metadata, None);
        let mut cursor = factory.cursor().unwrap();
        while cursor.has_next().unwrap() {}
        cursor.to_top();
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.record().value(3), Value::Timestamp(5));
        assert_eq!(factory.name(), "HashJoin");
    }
}
