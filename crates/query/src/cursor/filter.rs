//! Row filtering.

use super::{CursorMetadata, Record, RecordCursor, RecordCursorFactory};
use crate::function::FunctionRef;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use strata_core::{Result, RowId};

/// Passes through the base records for which the filter is true.
pub struct FilteredRecordCursorFactory {
    base: Box<dyn RecordCursorFactory>,
    filter: FunctionRef,
}

impl FilteredRecordCursorFactory {
    pub fn new(base: Box<dyn RecordCursorFactory>, filter: FunctionRef) -> Self {
        Self { base, filter }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Scanning,
    Exhausted,
}

struct FilteredCursor<'a> {
    base: Box<dyn RecordCursor + 'a>,
    filter: &'a FunctionRef,
    state: State,
}

impl RecordCursor for FilteredCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        if self.state == State::Exhausted {
            return Ok(false);
        }
        while self.base.has_next()? {
            if self.filter.get_bool(self.base.record()) {
                return Ok(true);
            }
        }
        self.state = State::Exhausted;
        Ok(false)
    }

    fn record(&self) -> &dyn Record {
        self.base.record()
    }

    fn to_top(&mut self) {
        self.base.to_top();
        self.state = State::Scanning;
    }

    fn record_at(&mut self, row: RowId) -> Result<()> {
        self.base.record_at(row)
    }
}

impl RecordCursorFactory for FilteredRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        self.base.metadata()
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        Ok(Box::new(FilteredCursor {
            base: self.base.cursor()?,
            filter: &self.filter,
            state: State::Scanning,
        }))
    }

    fn supports_random_access(&self) -> bool {
        self.base.supports_random_access()
    }

    fn name(&self) -> &'static str {
        "Filter"
    }

    fn children(&self) -> Vec<&dyn RecordCursorFactory> {
        vec![self.base.as_ref()]
    }
}
