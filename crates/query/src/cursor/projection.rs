//! Column projection.
//!
//! [`SelectedRecordCursorFactory`] picks and reorders base columns without
//! copying. [`VirtualRecordCursorFactory`] evaluates one function per output
//! column and keeps the results for the current record.

use super::{CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::function::FunctionRef;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use strata_core::schema::RecordMetadata;
use strata_core::{Result, RowId, Value};

/// Reorders and drops base columns.
pub struct SelectedRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    metadata: CursorMetadata,
    columns: Vec<usize>,
}

impl SelectedRecordCursorFactory {
    /// `columns[i]` is the base column of output column `i`, named `names[i]`.
    pub fn new(base: Box<dyn RecordCursorFactory>, columns: Vec<usize>, names: Vec<String>) -> Self {
        let mut metadata = CursorMetadata::new();
        let base_ts = base.metadata().timestamp_index();
        for (name, &column) in names.into_iter().zip(&columns) {
            metadata.add(name, base.metadata().column_type(column));
        }
        metadata.set_timestamp_index(base_ts.and_then(|ts| columns.iter().position(|&c| c == ts)));
        Self {
            base,
            metadata,
            columns,
        }
    }
}

struct SelectedCursor<'a> {
    base: Box<dyn RecordCursor + 'a>,
    columns: &'a [usize],
}

impl Record for SelectedCursor<'_> {
    fn value(&self, column: usize) -> Value {
        match self.columns.get(column) {
            Some(&c) => self.base.record().value(c),
            None => Value::Null,
        }
    }

    fn row_id(&self) -> Option<RowId> {
        self.base.record().row_id()
    }
}

impl RecordCursor for SelectedCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        self.base.has_next()
    }

    fn record(&self) -> &dyn Record {
        self
    }

    fn to_top(&mut self) {
        self.base.to_top();
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        self.base.record_at(row)
    }
}

impl RecordCursorFactory for SelectedRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        Ok(Box::new(SelectedCursor {
            base: self.base.cursor()?,
            columns: &self.columns,
        }))
    }

    fn supports_random_access(&self) -> bool {
        self.base.supports_random_access()
    }

    fn name(&self) -> &'static str {
        "Selected"
    }

    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        vec![self.base.as_ref()]
    }
}

/// Computes output columns from functions over the base record.
pub struct VirtualRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    metadata: CursorMetadata,
    functions: Vec<FunctionRef>,
}

impl VirtualRecordCursorFactory {
    pub fn new(base: Box<dyn RecordCursorFactory>, metadata: CursorMetadata, functions: Vec<FunctionRef>) -> Self {
        Self {
            base,
            metadata,
            functions,
        }
    }
}

struct VirtualRecord {
    values: Vec<Value>,
    row: Option<RowId>,
}

impl Record for VirtualRecord {
    fn value(&self, column: usize) -> Value {
        self.values.value(column)
    }

    fn row_id(&self) -> Option<RowId> {
        self.row
    }
}

struct VirtualCursor<'a> {
    base: Box<dyn RecordCursor + 'a>,
    functions: &'a [FunctionRef],
    record: VirtualRecord,
}

impl VirtualCursor<'_> {
    fn compute(&mut self) {
        let base = self.base.record();
        self.record.values.clear();
        self.record
            .values
            .extend(self.functions.iter().map(|f| f.eval(base)));
        self.record.row = base.row_id();
    }
}

impl RecordCursor for VirtualCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        if self.base.has_next()? {
            self.compute();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn record(&self) -> &dyn Record {
        &self.record
    }

    fn to_top(&mut self) {
        self.base.to_top();
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        self.base.record_at(row)?;
        self.compute();
        Ok(())
    }
}

impl RecordCursorFactory for VirtualRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        Ok(Box::new(VirtualCursor {
            base: self.base.cursor()?,
            functions: &self.functions,
            record: VirtualRecord {
                values: Vec::with_capacity(self.functions.len()),
                row: None,
            },
        }))
    }

    fn supports_random_access(&self) -> bool {
        self.base.supports_random_access()
    }

    fn name(&self) -> &'static str {
        "VirtualColumns"
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
    use crate::function::{Constant, Function, RecordColumn};
    use alloc::string::ToString;
    use strata_core::DataType;

    fn base() -> Box<dyn RecordCursorFactory> {
        Box::new(RowsFactory::new(
            &[("a", DataType::Int), ("b", DataType::String)],
            vec![
                vec![Value::Int(1), Value::from("x")],
                vec![Value::Int(2), Value::from("y")],
            ],
        ))
    }

    #[test]
    fn test_selected_reorders() {
        let factory = SelectedRecordCursorFactory::new(base(), vec![1, 0], vec!["b".to_string(), "a".to_string()]);
        assert_eq!(factory.metadata().names().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(
            collect_rows(&factory).unwrap(),
            [
                vec![Value::from("x"), Value::Int(1)],
                vec![Value::from("y"), Value::Int(2)],
            ]
        );
    }

    #[derive(Debug)]
    struct Twice;

    impl Function for Twice {
        fn data_type(&self) -> DataType {
            DataType::Int
        }

        fn eval(&self, record: &dyn Record) -> Value {
            match RecordColumn::new(0, DataType::Int).eval(record) {
                Value::Int(v) => Value::Int(v * 2),
                _ => Value::Null,
            }
        }
    }

    #[test]
    fn test_virtual_columns() {
        let mut metadata = CursorMetadata::new();
        metadata.add("twice", DataType::Int);
        metadata.add("k", DataType::Long);
        let functions: Vec<FunctionRef> = vec![Box::new(Twice), Constant::new(Value::Long(7), DataType::Long).boxed()];
        let factory = VirtualRecordCursorFactory::new(base(), metadata, functions);
        assert_eq!(
            collect_rows(&factory).unwrap(),
            [vec![Value::Int(2), Value::Long(7)], vec![Value::Int(4), Value::Long(7)]]
        );

        let mut cursor = factory.cursor().unwrap();
        cursor.record_at(1).unwrap();
        assert_eq!(cursor.record().value(0), Value::Int(4));
        assert_eq!(cursor.record().row_id(), Some(1));
    }
}
