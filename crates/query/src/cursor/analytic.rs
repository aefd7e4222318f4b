//! Window functions: `f(...) over (partition by ... order by ...)`.
//!
//! The base is materialized when a cursor opens. Each analytic column then
//! splits the rows into partitions, orders every partition and writes one
//! value per row into its scratch buffer. Rows come out in base order.

use super::{materialize, CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::function::{AggregateFunction, AggregateKind, FunctionRef};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use hashbrown::hash_map::DefaultHashBuilder;
use indexmap::IndexMap;
use strata_core::{Result, RowId, Value};
use tracing::trace;

/// Window function kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyticKind {
    /// 1-based position within the ordered partition.
    RowNumber,
    /// Position of the first row with equal order keys.
    Rank,
    /// An aggregate over the partition. With `order by` the aggregate is
    /// cumulative up to the current row.
    Aggregate(AggregateKind),
}

impl AnalyticKind {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("row_number") {
            Some(AnalyticKind::RowNumber)
        } else if name.eq_ignore_ascii_case("rank") {
            Some(AnalyticKind::Rank)
        } else {
            AggregateKind::from_name(name).map(AnalyticKind::Aggregate)
        }
    }
}

/// One compiled window column.
pub struct AnalyticColumn {
    pub kind: AnalyticKind,
    /// Required for aggregate kinds.
    pub aggregate: Option<AggregateFunction>,
    pub partition_by: Vec<FunctionRef>,
    /// Order keys and whether each one is descending.
    pub order_by: Vec<(FunctionRef, bool)>,
}

/// Output column source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyticOutput {
    Base(usize),
    Analytic(usize),
}

/// Growable per-column value buffer.
///
/// Capacity doubles when exhausted: a new buffer is allocated, the old
/// content is moved over and the old buffer is released. The buffer is
/// owned by the cursor and freed with it.
struct ScratchBuffer {
    values: Vec<Value>,
}

impl ScratchBuffer {
    const INITIAL_CAPACITY: usize = 16;

    fn new() -> Self {
        Self {
            values: Vec::with_capacity(Self::INITIAL_CAPACITY),
        }
    }

    fn put(&mut self, index: usize, value: Value) {
        if index >= self.values.capacity() {
            let mut capacity = self.values.capacity().max(Self::INITIAL_CAPACITY);
            while capacity <= index {
                capacity *= 2;
            }
            let mut grown = Vec::with_capacity(capacity);
            grown.append(&mut self.values);
            self.values = grown;
        }
        if index >= self.values.len() {
            self.values.resize(index + 1, Value::Null);
        }
        self.values[index] = value;
    }

    fn get(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or(Value::Null)
    }
}

/// Adds window columns to the base records.
pub struct AnalyticRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    metadata: CursorMetadata,
    columns: Vec<AnalyticColumn>,
    outputs: Vec<AnalyticOutput>,
}

impl AnalyticRecordCursorFactory {
    pub fn new(
        base: Box<dyn RecordCursorFactory>,
        metadata: CursorMetadata,
        columns: Vec<AnalyticColumn>,
        outputs: Vec<AnalyticOutput>,
    ) -> Self {
        Self {
            base,
            metadata,
            columns,
            outputs,
        }
    }
}

fn compare_keys(a: &[Value], b: &[Value], descending: &[bool]) -> Ordering {
    for ((x, y), &desc) in a.iter().zip(b).zip(descending) {
        let ord = if desc { y.cmp(x) } else { x.cmp(y) };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compute(column: &AnalyticColumn, rows: &[Vec<Value>], out: &mut ScratchBuffer) {
    let mut partitions: IndexMap<Vec<Value>, Vec<usize>, DefaultHashBuilder> = IndexMap::default();
    for (i, row) in rows.iter().enumerate() {
        let key: Vec<Value> = column.partition_by.iter().map(|f| f.eval(row)).collect();
        partitions.entry(key).or_default().push(i);
    }

    let descending: Vec<bool> = column.order_by.iter().map(|(_, d)| *d).collect();
    let order_key = |i: usize| -> Vec<Value> { column.order_by.iter().map(|(f, _)| f.eval(&rows[i])).collect() };

    for (_, members) in partitions {
        let mut ordered: Vec<(Vec<Value>, usize)> = members.into_iter().map(|i| (order_key(i), i)).collect();
        ordered.sort_by(|a, b| compare_keys(&a.0, &b.0, &descending));

        match column.kind {
            AnalyticKind::RowNumber => {
                for (n, (_, i)) in ordered.iter().enumerate() {
                    out.put(*i, Value::Long(n as i64 + 1));
                }
            }
            AnalyticKind::Rank => {
                let mut rank = 1;
                for (n, (key, i)) in ordered.iter().enumerate() {
                    if n > 0 && compare_keys(&ordered[n - 1].0, key, &descending) != Ordering::Equal {
                        rank = n as i64 + 1;
                    }
                    out.put(*i, Value::Long(rank));
                }
            }
            AnalyticKind::Aggregate(_) => {
                let Some(aggregate) = &column.aggregate else {
                    continue;
                };
                let mut acc = aggregate.accumulator();
                if column.order_by.is_empty() {
                    for (_, i) in &ordered {
                        aggregate.update(&mut acc, &rows[*i]);
                    }
                    let total = acc.result();
                    for (_, i) in &ordered {
                        out.put(*i, total.clone());
                    }
                } else {
                    for (_, i) in &ordered {
                        aggregate.update(&mut acc, &rows[*i]);
                        out.put(*i, acc.result());
                    }
                }
            }
        }
    }
}

struct AnalyticCursor<'a> {
    rows: Vec<Vec<Value>>,
    buffers: Vec<ScratchBuffer>,
    outputs: &'a [AnalyticOutput],
    next: usize,
}

impl Record for AnalyticCursor<'_> {
    fn value(&self, column: usize) -> Value {
        let Some(row) = self.next.checked_sub(1) else {
            return Value::Null;
        };
        match self.outputs.get(column) {
            Some(AnalyticOutput::Base(c)) => self.rows[row].value(*c),
            Some(AnalyticOutput::Analytic(a)) => self.buffers[*a].get(row),
            None => Value::Null,
        }
    }

    fn row_id(&self) -> Option<RowId> {
        self.next.checked_sub(1).map(|i| i as RowId)
    }
}

impl RecordCursor for AnalyticCursor<'_> {
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
        self.next = (row as usize + 1).min(self.rows.len());
        Ok(())
    }
}

impl RecordCursorFactory for AnalyticRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let count = self.base.metadata().len();
        let mut base = self.base.cursor()?;
        let mut rows = Vec::new();
        while base.has_next()? {
            rows.push(materialize(base.record(), count));
        }
        let buffers = self
            .columns
            .iter()
            .map(|column| {
                let mut buffer = ScratchBuffer::new();
                compute(column, &rows, &mut buffer);
                buffer
            })
            .collect();
        trace!(rows = rows.len(), columns = self.columns.len(), "analytic");
        Ok(Box::new(AnalyticCursor {
            rows,
            buffers,
            outputs: &self.outputs,
            next: 0,
        }))
    }

    fn supports_random_access(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Analytic"
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
    use crate::function::RecordColumn;
    use strata_core::DataType;

    fn base() -> Box<dyn RecordCursorFactory> {
        let row = |k: &str, v: i32| vec![Value::from(k), Value::Int(v)];
        Box::new(RowsFactory::new(
            &[("k", DataType::String), ("v", DataType::Int)],
            vec![row("a", 3), row("b", 1), row("a", 1), row("a", 3)],
        ))
    }

    fn key() -> Vec<FunctionRef> {
        vec![Box::new(RecordColumn::new(0, DataType::String))]
    }

    fn by_value(descending: bool) -> Vec<(FunctionRef, bool)> {
        vec![(Box::new(RecordColumn::new(1, DataType::Int)) as FunctionRef, descending)]
    }

    fn run(column: AnalyticColumn) -> Vec<Value> {
        let mut metadata = CursorMetadata::new();
        metadata.add("x", DataType::Long);
        let factory = AnalyticRecordCursorFactory::new(base(), metadata, vec![column], vec![AnalyticOutput::Analytic(0)]);
        collect_rows(&factory).unwrap().into_iter().map(|mut r| r.remove(0)).collect()
    }

    #[test]
    fn test_row_number_and_rank() {
        let numbers = run(AnalyticColumn {
            kind: AnalyticKind::RowNumber,
            aggregate: None,
            partition_by: key(),
            order_by: by_value(false),
        });
        assert_eq!(numbers, [Value::Long(2), Value::Long(1), Value::Long(1), Value::Long(3)]);

        let ranks = run(AnalyticColumn {
            kind: AnalyticKind::Rank,
            aggregate: None,
            partition_by: key(),
            order_by: by_value(false),
        });
        assert_eq!(ranks, [Value::Long(2), Value::Long(1), Value::Long(1), Value::Long(2)]);
    }

    #[test]
    fn test_partition_aggregate() {
        let arg: FunctionRef = Box::new(RecordColumn::new(1, DataType::Int));
        let sum = run(AnalyticColumn {
            kind: AnalyticKind::Aggregate(AggregateKind::Sum),
            aggregate: Some(AggregateFunction::new(AggregateKind::Sum, Some(arg), 0).unwrap()),
            partition_by: key(),
            order_by: Vec::new(),
        });
        assert_eq!(sum, [Value::Long(7), Value::Long(1), Value::Long(7), Value::Long(7)]);
    }

    #[test]
    fn test_running_aggregate() {
        let arg: FunctionRef = Box::new(RecordColumn::new(1, DataType::Int));
        let running = run(AnalyticColumn {
            kind: AnalyticKind::Aggregate(AggregateKind::Sum),
            aggregate: Some(AggregateFunction::new(AggregateKind::Sum, Some(arg), 0).unwrap()),
            partition_by: Vec::new(),
            order_by: by_value(true),
        });
        // ordered 3, 3, 1, 1 with ties in base order
        assert_eq!(running, [Value::Long(3), Value::Long(7), Value::Long(8), Value::Long(6)]);
    }

    #[test]
    fn test_names() {
        assert_eq!(AnalyticKind::from_name("ROW_NUMBER"), Some(AnalyticKind::RowNumber));
        assert_eq!(
            AnalyticKind::from_name("max"),
            Some(AnalyticKind::Aggregate(AggregateKind::Max))
        );
        assert_eq!(AnalyticKind::from_name("round"), None);
    }

    #[test]
    fn test_scratch_buffer_doubles() {
        let mut buffer = ScratchBuffer::new();
        buffer.put(40, Value::Int(1));
        assert!(buffer.values.capacity() >= 64);
        assert_eq!(buffer.get(40), Value::Int(1));
        assert!(buffer.get(3).is_null());
    }
}
