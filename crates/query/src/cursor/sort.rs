//! `order by`.
//!
//! Every base record is inserted once into a tree keyed by its sort key and
//! arrival order. When the base supports random access the tree holds row
//! ids and the sorted cursor re-positions the base on each of them in turn.
//! Otherwise the tree holds copies of the records.

use super::{materialize, CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Reverse;
use strata_core::{Error, Result, RowId, Value};
use tracing::trace;

/// One sort key column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Asc(Value),
    Desc(Reverse<Value>),
}

type TreeKey = (Vec<KeyPart>, u64);

enum Entry {
    Row(RowId),
    Copy(Vec<Value>),
}

/// Orders the base records by `keys`. Equal keys keep their base order.
pub struct SortedRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    keys: Vec<SortKey>,
    capacity: usize,
}

impl SortedRecordCursorFactory {
    pub fn new(base: Box<dyn RecordCursorFactory>, keys: Vec<SortKey>, capacity: usize) -> Self {
        Self { base, keys, capacity }
    }

    fn key_of(&self, record: &dyn Record) -> Vec<KeyPart> {
        self.keys
            .iter()
            .map(|k| {
                let v = record.value(k.column);
                if k.descending {
                    KeyPart::Desc(Reverse(v))
                } else {
                    KeyPart::Asc(v)
                }
            })
            .collect()
    }
}

struct SortedCursor<'a> {
    base: Box<dyn RecordCursor + 'a>,
    entries: Vec<Entry>,
    next: usize,
    current: Vec<Value>,
    by_row: bool,
}

impl Record for SortedCursor<'_> {
    fn value(&self, column: usize) -> Value {
        if self.by_row {
            self.base.record().value(column)
        } else {
            self.current.value(column)
        }
    }

    fn row_id(&self) -> Option<RowId> {
        match self.entries.get(self.next.wrapping_sub(1)) {
            Some(Entry::Row(row)) => Some(*row),
            _ => None,
        }
    }
}

impl RecordCursor for SortedCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        let Some(entry) = self.entries.get(self.next) else {
            return Ok(false);
        };
        match entry {
            Entry::Row(row) => self.base.record_at(*row)?,
            Entry::Copy(values) => self.current.clone_from(values),
        }
        self.next += 1;
        Ok(true)
    }

    fn record(&self) -> &dyn Record {
        self
    }

    fn to_top(&mut self) {
        self.next = 0;
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        if self.by_row {
            self.base.record_at(row)
        } else {
            Err(Error::cursor_misuse("record_at on a sorted copy"))
        }
    }
}

impl RecordCursorFactory for SortedRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        self.base.metadata()
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let by_row = self.base.supports_random_access();
        let column_count = self.base.metadata().len();
        let mut base = self.base.cursor()?;
        let mut tree: BTreeMap<TreeKey, Entry> = BTreeMap::new();
        let mut seq = 0u64;
        while base.has_next()? {
            let record = base.record();
            let entry = match record.row_id() {
                Some(row) if by_row => Entry::Row(row),
                _ => Entry::Copy(materialize(record, column_count)),
            };
            tree.insert((self.key_of(record), seq), entry);
            seq += 1;
        }
        trace!(rows = seq, by_row, "sorted");

        let mut entries = Vec::with_capacity(self.capacity.min(tree.len()));
        entries.extend(tree.into_values());
        let by_row = by_row && entries.iter().all(|e| matches!(e, Entry::Row(_)));
        Ok(Box::new(SortedCursor {
            base,
            entries,
            next: 0,
            current: Vec::new(),
            by_row,
        }))
    }

    fn supports_random_access(&self) -> bool {
        self.base.supports_random_access()
    }

    fn name(&self) -> &'static str {
        "Sort"
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
    use crate::cursor::FilteredRecordCursorFactory;
    use crate::function::{Function, RecordColumn};
    use strata_core::DataType;

    fn pairs() -> RowsFactory {
        RowsFactory::new(
            &[("k", DataType::Int), ("v", DataType::String)],
            vec![
                vec![Value::Int(2), Value::from("a")],
                vec![Value::Null, Value::from("b")],
                vec![Value::Int(1), Value::from("c")],
                vec![Value::Int(2), Value::from("d")],
            ],
        )
    }

    fn column(factory: &dyn RecordCursorFactory, i: usize) -> Vec<Value> {
        collect_rows(factory).unwrap().into_iter().map(|r| r[i].clone()).collect()
    }

    fn sorted(descending: bool) -> SortedRecordCursorFactory {
        let key = SortKey { column: 0, descending };
        SortedRecordCursorFactory::new(Box::new(pairs()), vec![key], 16)
    }

    #[test]
    fn test_ascending_is_stable() {
        let factory = sorted(false);
        let expected: Vec<Value> = ["b", "c", "a", "d"].iter().map(|s| Value::from(*s)).collect();
        assert_eq!(column(&factory, 1), expected);
    }

    #[test]
    fn test_descending_puts_nulls_last() {
        let factory = sorted(true);
        let expected: Vec<Value> = ["a", "d", "c", "b"].iter().map(|s| Value::from(*s)).collect();
        assert_eq!(column(&factory, 1), expected);
    }

    #[test]
    fn test_multiple_keys() {
        let keys = vec![
            SortKey { column: 0, descending: true },
            SortKey { column: 1, descending: true },
        ];
        let factory = SortedRecordCursorFactory::new(Box::new(pairs()), keys, 0);
        let expected: Vec<Value> = ["d", "a", "c", "b"].iter().map(|s| Value::from(*s)).collect();
        assert_eq!(column(&factory, 1), expected);
    }

    /// A decorator without random access forces copies.
    struct Opaque(RowsFactory);

    impl RecordCursorFactory for Opaque {
        fn metadata(&self) -> &CursorMetadata {
            self.0.metadata()
        }

        fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
            self.0.cursor()
        }

        fn name(&self) -> &'static str {
            "opaque"
        }
    }

    #[derive(Debug)]
    struct NotNull;

    impl Function for NotNull {
        fn data_type(&self) -> DataType {
            DataType::Boolean
        }

        fn eval(&self, record: &dyn Record) -> Value {
            Value::Boolean(!RecordColumn::new(0, DataType::Int).eval(record).is_null())
        }
    }

    #[test]
    fn test_copies_without_random_access() {
        let base = FilteredRecordCursorFactory::new(Box::new(Opaque(pairs())), Box::new(NotNull));
        let key = SortKey { column: 0, descending: false };
        let factory = SortedRecordCursorFactory::new(Box::new(base), vec![key], 4);
        assert!(!factory.supports_random_access());
        assert_eq!(column(&factory, 0), [Value::Int(1), Value::Int(2), Value::Int(2)]);

        let mut cursor = factory.cursor().unwrap();
        assert!(cursor.has_next().unwrap());
        assert!(cursor.record_at(0).is_err());
        cursor.to_top();
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.record().value(1), Value::from("c"));
    }
}
