//! Column storage for one table.
//!
//! Rows are appended in designated-timestamp order and routed into
//! partitions by calendar floor. Every indexed or SYMBOL column owns a value
//! dictionary; indexed columns additionally keep one bitmap index per
//! partition keyed by `to_index_key(symbol_key)`.

use crate::bitmap::BitmapIndex;
use crate::partition::partition_floor;
use crate::symbol::SymbolMap;
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::ops::Range;
use hashbrown::HashMap;
use strata_core::reader::{to_index_key, BitmapIndexReader, RowCursor, SymbolTable, TableReader};
use strata_core::schema::{RecordMetadata, TableSchema};
use strata_core::{DataType, Error, Result, RowId, Value};

/// Contiguous row range sharing one partition floor.
#[derive(Clone, Debug)]
struct Partition {
    floor: i64,
    rows: Range<RowId>,
    indexes: HashMap<usize, BitmapIndex>,
}

/// In-memory columnar table.
#[derive(Clone, Debug)]
pub struct ColumnTable {
    schema: TableSchema,
    columns: Vec<Vec<Value>>,
    symbols: HashMap<usize, SymbolMap>,
    partitions: Vec<Partition>,
    max_timestamp: i64,
}

impl ColumnTable {
    /// Creates an empty table for `schema`.
    pub fn new(schema: TableSchema) -> Self {
        let mut symbols = HashMap::new();
        for col in schema.columns() {
            if col.is_indexed() || col.data_type() == DataType::Symbol {
                symbols.insert(col.index(), SymbolMap::new());
            }
        }
        let columns = schema.columns().iter().map(|_| Vec::new()).collect();
        Self {
            schema,
            columns,
            symbols,
            partitions: Vec::new(),
            max_timestamp: i64::MIN,
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns the number of stored rows.
    pub fn len(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Returns whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn rename(&mut self, name: &str) {
        self.schema = self.schema.renamed(name);
    }

    /// Appends one row and returns its id.
    pub fn append(&mut self, values: Vec<Value>) -> Result<RowId> {
        if values.len() != self.schema.column_count() {
            return Err(Error::storage(format!(
                "expected {} values, got {}",
                self.schema.column_count(),
                values.len()
            )));
        }

        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| coerce(self.schema.column_type(i), v, self.schema.column_name(i)))
            .collect::<Result<Vec<Value>>>()?;

        let floor = match self.schema.timestamp_index() {
            None => i64::MIN,
            Some(ts_index) => {
                let ts = match &values[ts_index] {
                    Value::Timestamp(ts) => *ts,
                    _ => return Err(Error::storage("designated timestamp cannot be null")),
                };
                if ts < self.max_timestamp {
                    return Err(Error::storage("Cannot insert rows out of order"));
                }
                self.max_timestamp = ts;
                partition_floor(self.schema.partition_by(), ts)?
            }
        };

        let row = self.len() as RowId;
        let open_new = match self.partitions.last() {
            None => true,
            Some(p) => p.floor != floor,
        };
        if open_new {
            self.partitions.push(Partition {
                floor,
                rows: row..row,
                indexes: HashMap::new(),
            });
        }

        for (i, value) in values.into_iter().enumerate() {
            if let Some(symbols) = self.symbols.get_mut(&i) {
                let key = match &value {
                    Value::Null => symbols.put(None),
                    Value::Str(s) => symbols.put(Some(s)),
                    other => symbols.put(Some(&other.to_string())),
                };
                if self.schema.is_indexed(i) {
                    if let Some(partition) = self.partitions.last_mut() {
                        partition
                            .indexes
                            .entry(i)
                            .or_default()
                            .add(to_index_key(key), row);
                    }
                }
            }
            self.columns[i].push(value);
        }

        if let Some(partition) = self.partitions.last_mut() {
            partition.rows.end = row + 1;
        }
        Ok(row)
    }
}

fn coerce(data_type: DataType, value: Value, column: &str) -> Result<Value> {
    let coerced = match (data_type, value) {
        (_, Value::Null) => Some(Value::null_for_type(data_type)),
        (DataType::Boolean, v @ Value::Boolean(_)) => Some(v),
        (DataType::Byte | DataType::Short | DataType::Int, v @ Value::Int(_)) => Some(v),
        (DataType::Long, Value::Int(v)) => Some(Value::Long(v as i64)),
        (DataType::Long, v @ Value::Long(_)) => Some(v),
        (DataType::Float | DataType::Double, v) => v.to_f64().map(Value::Double),
        (DataType::String | DataType::Symbol, v @ Value::Str(_)) => Some(v),
        (DataType::Date, Value::Date(v) | Value::Long(v)) => Some(Value::Date(v)),
        (DataType::Timestamp, Value::Timestamp(v) | Value::Long(v)) => Some(Value::Timestamp(v)),
        (DataType::Binary, v @ Value::Binary(_)) => Some(v),
        _ => None,
    };
    coerced.ok_or_else(|| {
        Error::storage(format!(
            "type mismatch for column {}: expected {}",
            column, data_type
        ))
    })
}

impl TableReader for ColumnTable {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn partition_rows(&self, partition: usize) -> Range<RowId> {
        self.partitions[partition].rows.clone()
    }

    fn symbol_table(&self, column: usize) -> Option<&dyn SymbolTable> {
        self.symbols.get(&column).map(|s| s as &dyn SymbolTable)
    }

    fn bitmap_index(&self, partition: usize, column: usize) -> Option<&dyn BitmapIndexReader> {
        if !self.schema.is_indexed(column) {
            return None;
        }
        Some(
            self.partitions
                .get(partition)
                .and_then(|p| p.indexes.get(&column))
                .map(|i| i as &dyn BitmapIndexReader)
                .unwrap_or(&EmptyIndex),
        )
    }

    fn value(&self, column: usize, row: RowId) -> Value {
        self.columns[column]
            .get(row as usize)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Index of a partition that never saw a value of the column.
struct EmptyIndex;

impl BitmapIndexReader for EmptyIndex {
    fn cursor(&self, _key: i32, _lo: RowId, _hi: RowId, _backward: bool) -> RowCursor {
        RowCursor::empty()
    }

    fn key_count(&self) -> usize {
        0
    }
}
