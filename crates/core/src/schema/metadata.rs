//! Column metadata contract shared by tables, cursors and the compiler.

use crate::types::DataType;

/// Read-only description of the columns a record source exposes.
pub trait RecordMetadata {
    /// Number of columns.
    fn column_count(&self) -> usize;

    /// Type of the column at `index`.
    fn column_type(&self, index: usize) -> DataType;

    /// Name of the column at `index`.
    fn column_name(&self, index: usize) -> &str;

    /// Position of the named column, or None when absent.
    fn column_index_quiet(&self, name: &str) -> Option<usize>;

    /// Whether the column at `index` carries a bitmap index.
    fn is_indexed(&self, _index: usize) -> bool {
        false
    }

    /// Distinct value count hint for the column at `index`.
    fn bucket_count(&self, _index: usize) -> usize {
        0
    }

    /// Position of the designated timestamp column.
    fn timestamp_index(&self) -> Option<usize> {
        None
    }
}
