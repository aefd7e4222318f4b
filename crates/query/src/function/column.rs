//! Column reference.

use super::Function;
use crate::cursor::Record;
use strata_core::{DataType, Value};

/// Reads one column of the current record.
#[derive(Clone, Copy, Debug)]
pub struct RecordColumn {
    index: usize,
    data_type: DataType,
}

impl RecordColumn {
    pub fn new(index: usize, data_type: DataType) -> Self {
        Self { index, data_type }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Function for RecordColumn {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    fn eval(&self, record: &dyn Record) -> Value {
        record.value(self.index)
    }
}
