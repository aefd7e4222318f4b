//! Record cursor runtime.
//!
//! A [`RecordCursorFactory`] owns the long-lived state of one query stage:
//! table readers, compiled functions, sort comparators. Every call to
//! [`RecordCursorFactory::cursor`] returns a fresh pull-based
//! [`RecordCursor`] that borrows from its factory and can be rewound with
//! [`RecordCursor::to_top`]. Decorator factories wrap a base factory and
//! filter, project, sort or aggregate its records.
//!
//! - `table`: data frames of a table, full scans and symbol index lookups
//! - `latest_by`: latest row per key, with and without an index
//! - `filter`, `projection`, `limit`, `empty`: record decorators
//! - `sort`: tree-ordered row index over a base cursor
//! - `group_by`: keyed aggregation and time sampling
//! - `analytic`: window functions
//! - `join`: hash, cross and as-of joins

use crate::model::interval::format_timestamp;
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write;
use strata_core::schema::RecordMetadata;
use strata_core::{DataType, Error, Result, RowId, Value};

mod analytic;
mod empty;
mod filter;
mod group_by;
mod join;
mod latest_by;
mod limit;
mod projection;
mod sort;
mod table;

pub use analytic::{AnalyticColumn, AnalyticKind, AnalyticOutput, AnalyticRecordCursorFactory};
pub use empty::EmptyTableRecordCursorFactory;
pub use filter::FilteredRecordCursorFactory;
pub use group_by::{GroupByRecordCursorFactory, GroupColumn, SampleByRecordCursorFactory, Sampler};
pub use join::{JoinKind, JoinRecordCursorFactory};
pub use latest_by::{LatestByIndexedRecordCursorFactory, LatestByValueRecordCursorFactory};
pub use limit::LimitRecordCursorFactory;
pub use projection::{SelectedRecordCursorFactory, VirtualRecordCursorFactory};
pub use sort::{SortKey, SortedRecordCursorFactory};
pub use table::{DataFrameRecordCursorFactory, RowSource};

/// Positional access to one row.
pub trait Record {
    /// Value of the column at `column`.
    fn value(&self, column: usize) -> Value;

    /// Physical row id, when the record comes from a table.
    fn row_id(&self) -> Option<RowId> {
        None
    }
}

impl Record for [Value] {
    fn value(&self, column: usize) -> Value {
        self.get(column).cloned().unwrap_or(Value::Null)
    }
}

impl Record for Vec<Value> {
    fn value(&self, column: usize) -> Value {
        self.as_slice().value(column)
    }
}

/// A record without columns, used to evaluate constant expressions.
pub struct EmptyRecord;

impl Record for EmptyRecord {
    fn value(&self, _column: usize) -> Value {
        Value::Null
    }
}

/// Restartable forward-only sequence of records.
pub trait RecordCursor {
    /// Advances to the next record. Returns false once exhausted, and keeps
    /// returning false until [`RecordCursor::to_top`].
    fn has_next(&mut self) -> Result<bool>;

    /// The current record. Only meaningful after `has_next` returned true.
    fn record(&self) -> &dyn Record;

    /// Rewinds to before the first record.
    fn to_top(&mut self);

    /// Positions the current record on a row id previously read from this
    /// cursor. Cursors without random access fail.
    fn record_at(&mut self, _row: RowId) -> Result<()> {
        Err(Error::unsupported("record_at"))
    }
}

/// Creates cursors over one query stage.
pub trait RecordCursorFactory {
    /// Columns of the produced records.
    fn metadata(&self) -> &CursorMetadata;

    /// Opens a cursor.
    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>>;

    /// Whether cursors support [`RecordCursor::record_at`].
    fn supports_random_access(&self) -> bool {
        false
    }

    /// Short name used in plans and logs.
    fn name(&self) -> &'static str;

    /// Factories this one reads from.
    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        Vec::new()
    }
}

/// Names and types of the columns a cursor produces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CursorMetadata {
    columns: Vec<(String, DataType)>,
    timestamp_index: Option<usize>,
}

impl CursorMetadata {
    /// Creates metadata without columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the columns of `metadata`.
    pub fn from_metadata(metadata: &dyn RecordMetadata) -> Self {
        let columns = (0..metadata.column_count())
            .map(|i| (metadata.column_name(i).to_string(), metadata.column_type(i)))
            .collect();
        Self {
            columns,
            timestamp_index: metadata.timestamp_index(),
        }
    }

    /// Appends a column.
    pub fn add(&mut self, name: impl Into<String>, data_type: DataType) {
        self.columns.push((name.into(), data_type));
    }

    /// Sets the designated timestamp column.
    pub fn set_timestamp_index(&mut self, index: Option<usize>) {
        self.timestamp_index = index;
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns whether there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Resolves a column reference.
    ///
    /// An exact name wins. An unqualified name also matches a single
    /// `alias.name` column, as produced by joins; several such matches are
    /// ambiguous. A qualified name falls back to its unqualified part.
    pub fn resolve(&self, token: &str, position: usize) -> Result<usize> {
        if let Some(i) = self.column_index_quiet(token) {
            return Ok(i);
        }
        match token.rfind('.') {
            None => {
                let mut found = None;
                for (i, (name, _)) in self.columns.iter().enumerate() {
                    let matches = name
                        .rfind('.')
                        .is_some_and(|dot| name[dot + 1..].eq_ignore_ascii_case(token));
                    if matches {
                        if found.is_some() {
                            return Err(Error::ambiguous_column(position));
                        }
                        found = Some(i);
                    }
                }
                found.ok_or_else(|| Error::invalid_column(position, token))
            }
            Some(dot) => self
                .column_index_quiet(&token[dot + 1..])
                .ok_or_else(|| Error::invalid_column(position, token)),
        }
    }
}

impl RecordMetadata for CursorMetadata {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_type(&self, index: usize) -> DataType {
        self.columns[index].1
    }

    fn column_name(&self, index: usize) -> &str {
        &self.columns[index].0
    }

    fn column_index_quiet(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    fn timestamp_index(&self) -> Option<usize> {
        self.timestamp_index
    }
}

/// Copies the current record of a cursor into an owned row.
pub(crate) fn materialize(record: &dyn Record, column_count: usize) -> Vec<Value> {
    (0..column_count).map(|i| record.value(i)).collect()
}

/// Reads every record produced by `factory`.
pub fn collect_rows(factory: &dyn RecordCursorFactory) -> Result<Vec<Vec<Value>>> {
    let count = factory.metadata().len();
    let mut cursor = factory.cursor()?;
    let mut rows = Vec::new();
    while cursor.has_next()? {
        rows.push(materialize(cursor.record(), count));
    }
    Ok(rows)
}

/// Renders the output of `factory` as tab separated text with a header.
///
/// Timestamps print in ISO format, nulls as empty cells.
pub fn print(factory: &dyn RecordCursorFactory) -> Result<String> {
    let metadata = factory.metadata();
    let mut out = String::new();
    out.push_str(&metadata.names().collect::<Vec<_>>().join("\t"));
    out.push('\n');

    let mut cursor = factory.cursor()?;
    while cursor.has_next()? {
        let record = cursor.record();
        for i in 0..metadata.len() {
            if i > 0 {
                out.push('\t');
            }
            match record.value(i) {
                Value::Null => {}
                Value::Timestamp(ts) => out.push_str(&format_timestamp(ts)),
                Value::Double(d) if d.is_nan() => out.push_str("NaN"),
                v => {
                    let _ = write!(out, "{}", v);
                }
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Renders the factory tree, one factory per line, children indented.
pub fn plan(factory: &dyn RecordCursorFactory) -> String {
    let mut out = String::new();
    plan_into(factory, 0, &mut out);
    out
}

fn plan_into(factory: &dyn RecordCursorFactory, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(factory.name());
    out.push('\n');
    for child in factory.children() {
        plan_into(child, depth + 1, out);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use alloc::vec;

    /// In-memory rows exposed as a factory, for testing decorators.
    pub struct RowsFactory {
        pub metadata: CursorMetadata,
        pub rows: Vec<Vec<Value>>,
    }

    impl RowsFactory {
        pub fn new(columns: &[(&str, DataType)], rows: Vec<Vec<Value>>) -> Self {
            let mut metadata = CursorMetadata::new();
            for (name, data_type) in columns {
                metadata.add(*name, *data_type);
            }
            Self { metadata, rows }
        }

        pub fn ints(name: &str, values: &[i32]) -> Self {
            Self::new(
                &[(name, DataType::Int)],
                values.iter().map(|&v| vec![Value::Int(v)]).collect(),
            )
        }
    }

    struct RowsCursor<'a> {
        rows: &'a [Vec<Value>],
        next: usize,
    }

    impl Record for RowsCursor<'_> {
        fn value(&self, column: usize) -> Value {
            self.rows[self.next - 1].value(column)
        }

        fn row_id(&self) -> Option<RowId> {
            Some((self.next - 1) as RowId)
        }
    }

    impl RecordCursor for RowsCursor<'_> {
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
            self.next = row as usize + 1;
            Ok(())
        }
    }

    impl RecordCursorFactory for RowsFactory {
        fn metadata(&self) -> &CursorMetadata {
            &self.metadata
        }

        fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
            Ok(Box::new(RowsCursor {
                rows: &self.rows,
                next: 0,
            }))
        }

        fn supports_random_access(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "rows"
        }
    }

    pub fn ints(factory: &dyn RecordCursorFactory) -> Vec<i32> {
        collect_rows(factory)
            .unwrap()
            .into_iter()
            .map(|r| r[0].as_int().unwrap())
            .collect()
    }
}
