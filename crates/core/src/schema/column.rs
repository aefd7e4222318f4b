//! Column definition for table schemas.

use crate::types::DataType;
use alloc::string::String;

/// Default number of bitmap index value blocks per key.
pub const DEFAULT_INDEX_BLOCK_SIZE: usize = 256;

/// A column definition in a table schema.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnMeta {
    /// Column name.
    name: String,
    /// Data type of the column.
    data_type: DataType,
    /// Whether a bitmap index is maintained for the column.
    indexed: bool,
    /// Index value block size, meaningful only when indexed.
    index_block_size: usize,
    /// Expected number of distinct values, used as a selectivity hint.
    bucket_count: usize,
    /// Column index in the table (0-based).
    index: usize,
}

impl ColumnMeta {
    /// Creates a new, unindexed column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            indexed: false,
            index_block_size: DEFAULT_INDEX_BLOCK_SIZE,
            bucket_count: 0,
            index: 0,
        }
    }

    /// Marks this column as indexed.
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    /// Sets the index value block size.
    pub fn index_block_size(mut self, size: usize) -> Self {
        self.index_block_size = size;
        self
    }

    /// Sets the distinct value count hint.
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count;
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns whether this column carries a bitmap index.
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Returns the index value block size.
    #[inline]
    pub fn get_index_block_size(&self) -> usize {
        self.index_block_size
    }

    /// Returns the distinct value count hint.
    #[inline]
    pub fn get_bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Returns the column position in the table.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl PartialEq for ColumnMeta {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_new() {
        let col = ColumnMeta::new("ts", DataType::Timestamp);
        assert_eq!(col.name(), "ts");
        assert_eq!(col.data_type(), DataType::Timestamp);
        assert!(!col.is_indexed());
        assert_eq!(col.get_index_block_size(), DEFAULT_INDEX_BLOCK_SIZE);
    }

    #[test]
    fn test_column_builder() {
        let col = ColumnMeta::new("sym", DataType::Symbol)
            .indexed(true)
            .index_block_size(128)
            .bucket_count(16);

        assert!(col.is_indexed());
        assert_eq!(col.get_index_block_size(), 128);
        assert_eq!(col.get_bucket_count(), 16);
    }
}
