//! `limit lo` and `limit lo, hi`.

use super::{CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use strata_core::{Result, RowId};

/// Restricts the base records to a window.
///
/// `limit n` keeps the first `n` records, or the last `-n` when negative.
/// `limit lo, hi` keeps records `lo` (inclusive) to `hi` (exclusive);
/// negative bounds count from the end.
pub struct LimitRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    lo: i64,
    hi: Option<i64>,
}

impl LimitRecordCursorFactory {
    pub fn new(base: Box<dyn RecordCursorFactory>, lo: i64, hi: Option<i64>) -> Self {
        Self { base, lo, hi }
    }

    fn needs_count(&self) -> bool {
        self.lo < 0 || self.hi.is_some_and(|hi| hi < 0)
    }

    /// Window of record ordinals given the total count, when known.
    fn window(&self, total: Option<i64>) -> (i64, i64) {
        let from_end = |v: i64| total.map_or(0, |t| (t + v).max(0));
        match self.hi {
            None if self.lo < 0 => (from_end(self.lo), i64::MAX),
            None => (0, self.lo),
            Some(hi) => {
                let lo = if self.lo < 0 { from_end(self.lo) } else { self.lo };
                let hi = if hi < 0 { from_end(hi) } else { hi };
                (lo, hi)
            }
        }
    }
}

struct LimitCursor<'a> {
    base: Box<dyn RecordCursor + 'a>,
    lo: i64,
    hi: i64,
    position: i64,
}

impl RecordCursor for LimitCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        while self.position < self.lo {
            if !self.base.has_next()? {
                return Ok(false);
            }
            self.position += 1;
        }
        if self.position >= self.hi || !self.base.has_next()? {
            return Ok(false);
        }
        self.position += 1;
        Ok(true)
    }

    fn record(&self) -> &dyn Record {
        self.base.record()
    }

    fn to_top(&mut self) {
        self.base.to_top();
        self.position = 0;
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        self.base.record_at(row)
    }
}

impl RecordCursorFactory for LimitRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        self.base.metadata()
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        let mut base = self.base.cursor()?;
        let total = if self.needs_count() {
            let mut n = 0;
            while base.has_next()? {
                n += 1;
            }
            base.to_top();
            Some(n)
        } else {
            None
        };
        let (lo, hi) = self.window(total);
        Ok(Box::new(LimitCursor {
            base,
            lo,
            hi,
            position: 0,
        }))
    }

    fn supports_random_access(&self) -> bool {
        self.base.supports_random_access()
    }

    fn name(&self) -> &'static str {
        "Limit"
    }

    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        vec![self.base.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::test_support::*;

    fn limit(lo: i64, hi: Option<i64>) -> Vec<i32> {
        let base = RowsFactory::ints("x", &[1, 2, 3, 4, 5]);
        ints(&LimitRecordCursorFactory::new(Box::new(base), lo, hi))
    }

    #[test]
    fn test_first_and_last() {
        assert_eq!(limit(2, None), [1, 2]);
        assert_eq!(limit(-2, None), [4, 5]);
        assert_eq!(limit(10, None), [1, 2, 3, 4, 5]);
        assert_eq!(limit(-10, None), [1, 2, 3, 4, 5]);
        assert!(limit(0, None).is_empty());
    }

    #[test]
    fn test_ranges() {
        assert_eq!(limit(1, Some(3)), [2, 3]);
        assert_eq!(limit(-3, Some(-1)), [3, 4]);
        assert!(limit(3, Some(1)).is_empty());
    }

    #[test]
    fn test_rewind() {
        let base = RowsFactory::ints("x", &[1, 2, 3]);
        let factory = LimitRecordCursorFactory::new(Box::new(base), -1, None);
        let mut cursor = factory.cursor().unwrap();
        assert!(cursor.has_next().unwrap());
        assert!(!cursor.has_next().unwrap());
        cursor.to_top();
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.record().value(0), strata_core::Value::Int(3));
    }
}
