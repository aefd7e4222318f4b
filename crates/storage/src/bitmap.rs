//! Per-partition bitmap indexes.
//!
//! Each key owns an ascending list of row ids. Rows are appended in id order,
//! so lists stay sorted without re-sorting and range lookups binary search
//! both ends.

use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::reader::{BitmapIndexReader, RowCursor};
use strata_core::RowId;

/// Key to row id lists for one column in one partition.
#[derive(Clone, Debug, Default)]
pub struct BitmapIndex {
    keys: HashMap<i32, Vec<RowId>>,
}

impl BitmapIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `row` under `key`. Rows must arrive in ascending order.
    pub fn add(&mut self, key: i32, row: RowId) {
        self.keys.entry(key).or_default().push(row);
    }

    /// Number of rows indexed under `key`.
    pub fn count(&self, key: i32) -> usize {
        self.keys.get(&key).map(|v| v.len()).unwrap_or(0)
    }
}

impl BitmapIndexReader for BitmapIndex {
    fn cursor(&self, key: i32, lo: RowId, hi: RowId, backward: bool) -> RowCursor {
        match self.keys.get(&key) {
            None => RowCursor::empty(),
            Some(rows) => {
                let start = rows.partition_point(|&r| r < lo);
                let end = rows.partition_point(|&r| r < hi);
                if start >= end {
                    RowCursor::empty()
                } else {
                    RowCursor::new(rows[start..end].to_vec(), backward)
                }
            }
        }
    }

    fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn sample() -> BitmapIndex {
        let mut index = BitmapIndex::new();
        for row in 0..10u64 {
            index.add((row % 3) as i32, row);
        }
        index
    }

    #[test]
    fn test_forward_cursor() {
        let rows: Vec<RowId> = sample().cursor(1, 0, 10, false).collect();
        assert_eq!(rows, vec![1, 4, 7]);
    }

    #[test]
    fn test_backward_cursor_in_range() {
        let rows: Vec<RowId> = sample().cursor(0, 2, 9, true).collect();
        assert_eq!(rows, vec![6, 3]);
    }

    #[test]
    fn test_missing_key() {
        let index = sample();
        assert_eq!(index.cursor(7, 0, 10, false).next(), None);
        assert_eq!(index.count(2), 3);
        assert_eq!(index.key_count(), 3);
    }
}
