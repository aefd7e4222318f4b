use super::{CursorMetadata, EmptyRecord, Record, RecordCursor, RecordCursorFactory};
use alloc::boxed::Box;
use strata_core::Result;

/// Produces no records. Used when a filter is statically false.
pub struct EmptyTableRecordCursorFactory {
    metadata: CursorMetadata,
}

impl EmptyTableRecordCursorFactory {
    pub fn new(metadata: CursorMetadata) -> Self {
        Self { metadata }
    }
}

struct EmptyCursor;

impl RecordCursor for EmptyCursor {
    fn has_next(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn record(&self) -> &dyn Record {
        &EmptyRecord
    }

    fn to_top(&mut self) {}
}

impl RecordCursorFactory for EmptyTableRecordCursorFactory {
    fn metadata(&self) -> &CursorMetadata {
        &self.metadata
    }

    fn cursor(&self) -> Result<Box<dyn RecordCursor + '_>> {
        Ok(Box::new(EmptyCursor))
    }

    fn name(&self) -> &'static str {
        "Empty"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::collect_rows;
    use strata_core::DataType;

    #[test]
    fn test_empty_keeps_metadata() {
        let mut metadata = CursorMetadata::new();
        metadata.add("x", DataType::Int);
        let factory = EmptyTableRecordCursorFactory::new(metadata);
        assert!(collect_rows(&factory).unwrap().is_empty());
        assert_eq!(factory.metadata().len(), 1);
    }
}
