//! Table access: data frames, full scans and symbol index lookups.
//!
//! A data frame is the row range of one partition, narrowed to the
//! designated timestamp intervals of the query. Frames are computed when a
//! cursor opens and are visited in partition order.

use super::{CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::model::interval::Interval;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::{self, Vec};
use core::ops::Range;
use strata_core::reader::{to_index_key, TableReader, VALUE_IS_NULL, VALUE_NOT_FOUND};
use strata_core::schema::RecordMetadata;
use strata_core::{Result, RowId, Value};
use tracing::trace;

/// Row range of one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Frame {
    pub partition: usize,
    pub rows: Range<RowId>,
}

/// Splits the table into frames restricted to `intervals`.
///
/// Rows within a partition are ordered by the designated timestamp, so the
/// bounds of every interval are found by binary search.
pub(crate) fn frames(reader: &dyn TableReader, intervals: Option<&[Interval]>) -> Vec<Frame> {
    let mut out = Vec::new();
    let ts_index = reader.schema().timestamp_index();
    for partition in 0..reader.partition_count() {
        let rows = reader.partition_rows(partition);
        if rows.is_empty() {
            continue;
        }
        match (intervals, ts_index) {
            (Some(intervals), Some(ts)) => {
                for iv in intervals {
                    let lo = lower_bound(reader, ts, rows.clone(), iv.lo);
                    let hi = upper_bound(reader, ts, rows.clone(), iv.hi);
                    if lo < hi {
                        out.push(Frame {
                            partition,
                            rows: lo..hi,
                        });
                    }
                }
            }
            _ => out.push(Frame { partition, rows }),
        }
    }
    out
}

fn timestamp_at(reader: &dyn TableReader, column: usize, row: RowId) -> i64 {
    match reader.value(column, row) {
        Value::Timestamp(ts) => ts,
        _ => i64::MIN,
    }
}

/// First row with a timestamp of at least `ts`.
fn lower_bound(reader: &dyn TableReader, column: usize, rows: Range<RowId>, ts: i64) -> RowId {
    let (mut lo, mut hi) = (rows.start, rows.end);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if timestamp_at(reader, column, mid) < ts {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// First row with a timestamp above `ts`.
fn upper_bound(reader: &dyn TableReader, column: usize, rows: Range<RowId>, ts: i64) -> RowId {
    let (mut lo, mut hi) = (rows.start, rows.end);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if timestamp_at(reader, column, mid) <= ts {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Index keys of `values` in the dictionary of `column`. Values the table
/// has never seen are dropped.
pub(crate) fn index_keys(reader: &dyn TableReader, column: usize, values: &[Option<String>]) -> Vec<i32> {
    let Some(symbols) = reader.symbol_table(column) else {
        return Vec::new();
    };
    values
        .iter()
        .filter_map(|v| {
            let key = match v {
                None => VALUE_IS_NULL,
                Some(s) => symbols.key_of(s),
            };
            (key != VALUE_NOT_FOUND).then(|| to_index_key(key))
        })
        .collect()
}

/// Current row of a table cursor.
pub(crate) struct TableRecord<'a> {
    pub reader: &'a dyn TableReader,
    pub row: RowId,
}

impl Record for TableRecord<'_> {
    fn value(&self, column: usize) -> Value {
        self.reader.value(column, self.row)
    }

    fn row_id(&self) -> Option<RowId> {
        Some(self.row)
    }
}

/// How rows are picked within a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowSource {
    /// Every row.
    All,
    /// Rows whose indexed `column` holds one of `keys`. `None` is null.
    SymbolIndex {
        column: usize,
        keys: Vec<Option<String>>,
    },
}

/// Reads rows of one table, optionally restricted to timestamp intervals
/// and to symbol index keys.
pub struct DataFrameRecordCursorFactory {
    reader: Rc<dyn TableReader>,
    metadata: CursorMetadata,
    intervals: Option<Vec<Interval>>,
    source: RowSource,
    index_keys: Vec<i32>,
}

impl DataFrameRecordCursorFactory {
    pub fn new(reader: Rc<dyn TableReader>, intervals: Option<Vec<Interval>>, source: RowSource) -> Self {
        let metadata = CursorMetadata::from_metadata(reader.schema());
        let index_keys = match &source {
            RowSource::All => Vec::new(),
            RowSource::SymbolIndex { column, keys } => index_keys(reader.as_ref(), *column, keys),
        };
        Self {
            reader,
            metadata,
            intervals,
            source,
            index_keys,
        }
    }

    pub fn source(&self) -> &RowSource {
        &self.source
    }
}

enum FrameRows {
    Range(Range<RowId>),
    Listed(vec::IntoIter<RowId>),
}

impl Iterator for FrameRows {
    type Item = RowId;

    fn next(&mut self) -> Option<RowId> {
        match self {
            FrameRows::Range(r) => r.next(),
            FrameRows::Listed(rows) => rows.next(),
        }
    }
}

struct DataFrameCursor<'a> {
    factory: &'a DataFrameRecordCursorFactory,
    frames: Vec<Frame>,
    next_frame: usize,
    rows: FrameRows,
    record: TableRecord<'a>,
}

impl DataFrameCursor<'_> {
    fn open_frame(&self, frame: &Frame) -> FrameRows {
        match &self.factory.source {
            RowSource::All => FrameRows::Range(frame.rows.clone()),
            RowSource::SymbolIndex { column, .. } => {
                let Some(index) = self.factory.reader.bitmap_index(frame.partition, *column) else {
                    return FrameRows::Listed(Vec::new().into_iter());
                };
                let mut rows: Vec<RowId> = Vec::new();
                for &key in &self.factory.index_keys {
                    rows.extend(index.cursor(key, frame.rows.start, frame.rows.end, false));
                }
                if self.factory.index_keys.len() > 1 {
                    rows.sort_unstable();
                }
                FrameRows::Listed(rows.into_iter())
            }
        }
    }
}

impl RecordCursor for DataFrameCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        loop {
            if let Some(row) = self.rows.next() {
                self.record.row = row;
                return Ok(true);
            }
            if self.next_frame >= self.frames.len() {
                return Ok(false);
            }
            let frame = self.frames[self.next_frame].clone();
            self.next_frame += 1;
            self.rows = self.open_frame(&frame);
        }
    }

    fn record(&self) -> &dyn Record {
        &self.record
    }

    fn to_top(&mut self) {
        self.next_frame = 0;
        self.rows = FrameRows::Range(0..0);
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        self.record.row = row;
        Ok(())
    }
}

impl RecordCursorFactory for DataFrameRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let frames = frames(self.reader.as_ref(), self.intervals.as_deref());
        trace!(table = self.reader.schema().name(), frames = frames.len(), "open data frames");
        Ok(Box::new(DataFrameCursor {
            factory: self,
            frames,
            next_frame: 0,
            rows: FrameRows::Range(0..0),
            record: TableRecord {
                reader: self.reader.as_ref(),
                row: 0,
            },
        }))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        match self.source {
            RowSource::All => "DataFrame",
            RowSource::SymbolIndex { .. } => "SymbolIndex",
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use alloc::rc::Rc;
    use alloc::vec;
    use strata_core::reader::{Catalog, TableReader};
    use strata_core::schema::{PartitionBy, TableSchemaBuilder};
    use strata_core::{DataType, Value};
    use strata_storage::MemoryEngine;

    pub(crate) const DAY: i64 = 86_400_000_000;

    /// `quotes(sym SYMBOL indexed, price DOUBLE, ts TIMESTAMP)` partitioned
    /// by day, one row every 6 hours for two days over symbols A, B, C.
    pub(crate) fn quotes() -> Rc<dyn TableReader> {
        let mut engine = MemoryEngine::new();
        let schema = TableSchemaBuilder::new("quotes")
            .unwrap()
            .add_indexed("sym", DataType::Symbol, 4)
            .unwrap()
            .add_column("price", DataType::Double)
            .unwrap()
            .add_column("ts", DataType::Timestamp)
            .unwrap()
            .timestamp("ts")
            .partition_by(PartitionBy::Day)
            .build()
            .unwrap();
        engine.create_table(schema).unwrap();
        let symbols = ["A", "B", "C", "A", "B", "A", "C", "B"];
        for (i, sym) in symbols.iter().enumerate() {
            let ts = i as i64 * DAY / 4;
            engine
                .append(
                    "quotes",
                    vec![Value::from(*sym), Value::Double(i as f64), Value::Timestamp(ts)],
                )
                .unwrap();
        }
        engine.table("quotes").unwrap()
    }
}
