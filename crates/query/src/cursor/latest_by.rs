//! Latest row per key.
//!
//! Both factories scan the table backward, newest frame first, and keep the
//! first row seen for each key. The surviving rows are returned in table
//! order. A filter, when present, is applied before a row can claim its key.

use super::table::{frames, index_keys, Frame, TableRecord};
use super::{CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::function::FunctionRef;
use crate::model::interval::Interval;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashSet;
use strata_core::reader::TableReader;
use strata_core::{Result, RowId, Value};
use tracing::debug;

/// Rows collected ahead of iteration.
struct RowListCursor<'a> {
    rows: Option<Vec<RowId>>,
    next: usize,
    record: TableRecord<'a>,
    collect: Box<dyn Fn() -> Vec<RowId> + 'a>,
}

impl RecordCursor for RowListCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        let collect = &self.collect;
        let rows = self.rows.get_or_insert_with(|| collect());
        match rows.get(self.next) {
            Some(&row) => {
                self.record.row = row;
                self.next += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn record(&self) -> &dyn Record {
        &self.record
    }

    fn to_top(&mut self) {
        self.next = 0;
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        self.record.row = row;
        Ok(())
    }
}

fn passes(filter: Option<&FunctionRef>, reader: &dyn TableReader, row: RowId) -> bool {
    filter.map_or(true, |f| f.get_bool(&TableRecord { reader, row }))
}

/// Latest row per key of an indexed column.
///
/// Every frame is searched backward through the bitmap index of each key
/// that is still unresolved. After a frame the active key window shrinks to
/// the smallest and largest unresolved keys, so resolved keys at either end
/// are not visited again.
pub struct LatestByIndexedRecordCursorFactory {
    reader: Rc<dyn TableReader>,
    metadata: CursorMetadata,
    column: usize,
    intervals: Option<Vec<Interval>>,
    /// Explicit key values; every key of the column when absent.
    keys: Option<Vec<Option<String>>>,
    filter: Option<FunctionRef>,
}

impl LatestByIndexedRecordCursorFactory {
    pub fn new(
        reader: Rc<dyn TableReader>,
        column: usize,
        intervals: Option<Vec<Interval>>,
        keys: Option<Vec<Option<String>>>,
        filter: Option<FunctionRef>,
    ) -> Self {
        let metadata = CursorMetadata::from_metadata(reader.schema());
        Self {
            reader,
            metadata,
            column,
            intervals,
            keys,
            filter,
        }
    }

    fn candidate_keys(&self) -> Vec<i32> {
        let mut keys = match &self.keys {
            Some(values) => index_keys(self.reader.as_ref(), self.column, values),
            None => {
                let count = self
                    .reader
                    .symbol_table(self.column)
                    .map_or(0, |s| s.len());
                // index key 0 holds nulls
                (0..=count as i32).collect()
            }
        };
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn collect(&self) -> Vec<RowId> {
        let reader = self.reader.as_ref();
        let keys = self.candidate_keys();
        let mut found = alloc::vec![false; keys.len()];
        let mut remaining = keys.len();
        let (mut lo, mut hi) = (0usize, keys.len());
        let mut rows = Vec::with_capacity(keys.len());

        let frames: Vec<Frame> = frames(reader, self.intervals.as_deref());
        for frame in frames.iter().rev() {
            if remaining == 0 {
                break;
            }
            let Some(index) = reader.bitmap_index(frame.partition, self.column) else {
                continue;
            };
            for i in lo..hi {
                if found[i] {
                    continue;
                }
                let hit = index
                    .cursor(keys[i], frame.rows.start, frame.rows.end, true)
                    .find(|&row| passes(self.filter.as_ref(), reader, row));
                if let Some(row) = hit {
                    found[i] = true;
                    remaining -= 1;
                    rows.push(row);
                }
            }
            while lo < hi && found[lo] {
                lo += 1;
            }
            while hi > lo && found[hi - 1] {
                hi -= 1;
            }
        }

        debug!(keys = keys.len(), resolved = rows.len(), "latest by index");
        rows.sort_unstable();
        rows
    }
}

impl RecordCursorFactory for LatestByIndexedRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        Ok(Box::new(RowListCursor {
            rows: None,
            next: 0,
            record: TableRecord {
                reader: self.reader.as_ref(),
                row: 0,
            },
            collect: Box::new(move || self.collect()),
        }))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "LatestByIndexed"
    }
}

/// Latest row per value of a column without an index.
pub struct LatestByValueRecordCursorFactory {
    reader: Rc<dyn TableReader>,
    metadata: CursorMetadata,
    column: usize,
    intervals: Option<Vec<Interval>>,
    /// Only this value is looked for; the scan stops at its first match.
    value: Option<Value>,
    filter: Option<FunctionRef>,
}

impl LatestByValueRecordCursorFactory {
    pub fn new(
        reader: Rc<dyn TableReader>,
        column: usize,
        intervals: Option<Vec<Interval>>,
        value: Option<Value>,
        filter: Option<FunctionRef>,
    ) -> Self {
        let metadata = CursorMetadata::from_metadata(reader.schema());
        Self {
            reader,
            metadata,
            column,
            intervals,
            value,
            filter,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match (&self.value, value) {
            (None, _) => true,
            // symbols read back as strings, so compare text forms
            (Some(Value::Str(want)), v) => !v.is_null() && v.to_string() == *want,
            (Some(want), v) => want == v,
        }
    }

    fn collect(&self) -> Vec<RowId> {
        let reader = self.reader.as_ref();
        let mut seen: HashSet<Value> = HashSet::new();
        let mut rows = Vec::new();
        'frames: for frame in frames(reader, self.intervals.as_deref()).iter().rev() {
            for row in frame.rows.clone().rev() {
                let key = reader.value(self.column, row);
                if !self.matches(&key) || seen.contains(&key) {
                    continue;
                }
                if !passes(self.filter.as_ref(), reader, row) {
                    continue;
                }
                seen.insert(key);
                rows.push(row);
                if self.value.is_some() {
                    break 'frames;
                }
            }
        }
        rows.sort_unstable();
        rows
    }
}

impl RecordCursorFactory for LatestByValueRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        Ok(Box::new(RowListCursor {
            rows: None,
            next: 0,
            record: TableRecord {
                reader: self.reader.as_ref(),
                row: 0,
            },
            collect: Box::new(move || self.collect()),
        }))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "LatestByValue"
    }
}

#[cfg(test)]
mod tests {
    use super::super::table::test_support::*;
    use super::*;
    use crate::cursor::collect_rows;
    use crate::function::{Constant, FunctionRef, RecordColumn};
    use alloc::vec;
    use strata_core::DataType;

    fn prices(factory: &dyn RecordCursorFactory) -> Vec<f64> {
        collect_rows(factory)
            .unwrap()
            .into_iter()
            .map(|r| r[1].to_f64().unwrap())
            .collect()
    }

    /// `price < limit`
    #[derive(Debug)]
    struct Below(f64);

    impl crate::function::Function for Below {
        fn data_type(&self) -> DataType {
            DataType::Boolean
        }

        fn eval(&self, record: &dyn Record) -> Value {
            let price = RecordColumn::new(1, DataType::Double).eval(record);
            Value::Boolean(price.to_f64().map_or(false, |p| p < self.0))
        }
    }

    #[test]
    fn test_indexed_all_keys() {
        let factory = LatestByIndexedRecordCursorFactory::new(quotes(), 0, None, None, None);
        // A: 5, C: 6, B: 7
        assert_eq!(prices(&factory), [5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_indexed_given_keys_and_filter() {
        let keys = Some(vec![Some("A".to_string()), Some("B".to_string())]);
        let filter: Option<FunctionRef> = Some(Box::new(Below(5.0)));
        let factory = LatestByIndexedRecordCursorFactory::new(quotes(), 0, None, keys, filter);
        assert_eq!(prices(&factory), [3.0, 4.0]);
    }

    #[test]
    fn test_indexed_intervals() {
        let iv = Some(vec![Interval::new(0, DAY - 1)]);
        let factory = LatestByIndexedRecordCursorFactory::new(quotes(), 0, iv, None, None);
        assert_eq!(prices(&factory), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_value_scan() {
        let factory = LatestByValueRecordCursorFactory::new(quotes(), 0, None, None, None);
        assert_eq!(prices(&factory), [5.0, 6.0, 7.0]);

        let one = LatestByValueRecordCursorFactory::new(quotes(), 0, None, Some(Value::from("C")), None);
        assert_eq!(prices(&one), [6.0]);

        let filter: Option<FunctionRef> = Some(Constant::new(Value::Boolean(false), DataType::Boolean).boxed());
        let none = LatestByValueRecordCursorFactory::new(quotes(), 0, None, None, filter);
        assert!(prices(&none).is_empty());
    }

    #[test]
    fn test_rewind_reuses_rows() {
        let factory = LatestByIndexedRecordCursorFactory::new(quotes(), 0, None, None, None);
        let mut cursor = factory.cursor().unwrap();
        let mut n = 0;
        while cursor.has_next().unwrap() {
            n += 1;
        }
        cursor.to_top();
        while cursor.has_next().unwrap() {
            n += 1;
        }
        assert_eq!(n, 6);
    }
}
