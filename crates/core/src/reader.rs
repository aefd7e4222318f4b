//! Read-side contracts between the query engine and storage.
//!
//! The compiler never mutates storage. It asks a [`Catalog`] for a
//! [`TableReader`], then pulls column metadata, partition row ranges,
//! symbol tables and bitmap index cursors from it.

use crate::schema::TableSchema;
use crate::value::Value;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::ops::Range;

/// Physical row identifier, unique within one table.
pub type RowId = u64;

/// Symbol key returned when a value is not in the table.
pub const VALUE_NOT_FOUND: i32 = -2;

/// Symbol key of the null value.
pub const VALUE_IS_NULL: i32 = -1;

/// Maps a symbol key to its bitmap index key. Null lands on key 0.
#[inline]
pub fn to_index_key(symbol_key: i32) -> i32 {
    symbol_key + 1
}

/// Dictionary of the distinct values of one indexed column.
pub trait SymbolTable {
    /// Key of `value`, or [`VALUE_NOT_FOUND`].
    fn key_of(&self, value: &str) -> i32;

    /// Value of `key`, or None for null and unknown keys.
    fn value_of(&self, key: i32) -> Option<&str>;

    /// Number of distinct non-null values.
    fn len(&self) -> usize;

    /// Returns whether the table holds no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row ids of one index key within a row range, forward or backward.
#[derive(Clone, Debug, Default)]
pub struct RowCursor {
    rows: Vec<RowId>,
    pos: usize,
    backward: bool,
}

impl RowCursor {
    /// Creates a cursor over ascending row ids.
    pub fn new(rows: Vec<RowId>, backward: bool) -> Self {
        Self {
            rows,
            pos: 0,
            backward,
        }
    }

    /// Returns the empty cursor.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Iterator for RowCursor {
    type Item = RowId;

    fn next(&mut self) -> Option<RowId> {
        if self.pos >= self.rows.len() {
            return None;
        }
        let i = if self.backward {
            self.rows.len() - 1 - self.pos
        } else {
            self.pos
        };
        self.pos += 1;
        Some(self.rows[i])
    }
}

/// Bitmap index of one column within one partition.
pub trait BitmapIndexReader {
    /// Rows carrying `key` with ids in `[lo, hi)`.
    fn cursor(&self, key: i32, lo: RowId, hi: RowId, backward: bool) -> RowCursor;

    /// Number of keys the index knows about.
    fn key_count(&self) -> usize;
}

/// Read access to one table.
pub trait TableReader {
    /// Table schema.
    fn schema(&self) -> &TableSchema;

    /// Number of partitions.
    fn partition_count(&self) -> usize;

    /// Row id range of a partition.
    fn partition_rows(&self, partition: usize) -> Range<RowId>;

    /// Dictionary of an indexed or symbol column.
    fn symbol_table(&self, column: usize) -> Option<&dyn SymbolTable>;

    /// Bitmap index of an indexed column within a partition.
    fn bitmap_index(&self, partition: usize, column: usize) -> Option<&dyn BitmapIndexReader>;

    /// Cell value.
    fn value(&self, column: usize, row: RowId) -> Value;

    /// Total rows across partitions.
    fn row_count(&self) -> u64 {
        (0..self.partition_count())
            .map(|p| {
                let r = self.partition_rows(p);
                r.end - r.start
            })
            .sum()
    }
}

/// Table lookup by name.
pub trait Catalog {
    /// Returns the named table, ignoring case.
    fn table(&self, name: &str) -> Option<Rc<dyn TableReader>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_row_cursor_forward() {
        let rows: Vec<RowId> = RowCursor::new(vec![1, 4, 9], false).collect();
        assert_eq!(rows, vec![1, 4, 9]);
    }

    #[test]
    fn test_row_cursor_backward() {
        let rows: Vec<RowId> = RowCursor::new(vec![1, 4, 9], true).collect();
        assert_eq!(rows, vec![9, 4, 1]);
    }

    #[test]
    fn test_index_key() {
        assert_eq!(to_index_key(VALUE_IS_NULL), 0);
        assert_eq!(to_index_key(0), 1);
        assert_eq!(RowCursor::empty().next(), None);
    }
}
