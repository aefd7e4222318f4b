//! Strata Storage - in-memory column store for the Strata SQL engine.
//!
//! This crate implements the read contracts of `strata_core::reader`:
//!
//! - `MemoryEngine`: Table registry with create, drop and rename, usable as a `Catalog`
//! - `ColumnTable`: Append-only columnar table partitioned by designated timestamp
//! - `SymbolMap`: Value dictionary backing SYMBOL and indexed columns
//! - `BitmapIndex`: Per-partition key to row id lists
//!
//! # Example
//!
//! ```rust
//! use strata_core::reader::{Catalog, TableReader};
//! use strata_core::schema::{PartitionBy, TableSchemaBuilder};
//! use strata_core::{DataType, Value};
//! use strata_storage::MemoryEngine;
//!
//! let mut engine = MemoryEngine::new();
//! let schema = TableSchemaBuilder::new("quotes")
//!     .unwrap()
//!     .add_indexed("sym", DataType::Symbol, 16)
//!     .unwrap()
//!     .add_column("ts", DataType::Timestamp)
//!     .unwrap()
//!     .timestamp("ts")
//!     .partition_by(PartitionBy::Day)
//!     .build()
//!     .unwrap();
//! engine.create_table(schema).unwrap();
//! engine.append("quotes", vec!["A".into(), Value::Timestamp(0)]).unwrap();
//!
//! assert_eq!(engine.table("quotes").unwrap().row_count(), 1);
//! ```

#![no_std]

extern crate alloc;

pub mod bitmap;
pub mod column_store;
pub mod engine;
pub mod partition;
pub mod symbol;

pub use bitmap::BitmapIndex;
pub use column_store::ColumnTable;
pub use engine::MemoryEngine;
pub use symbol::SymbolMap;
