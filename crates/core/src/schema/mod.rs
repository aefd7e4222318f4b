//! Schema definitions: columns, tables and the metadata contract.

mod column;
mod metadata;
mod table;

pub use column::{ColumnMeta, DEFAULT_INDEX_BLOCK_SIZE};
pub use metadata::RecordMetadata;
pub use table::{PartitionBy, TableSchema, TableSchemaBuilder};
