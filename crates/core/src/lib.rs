//! Strata Core - shared types for the Strata SQL engine.
//!
//! This crate provides the foundational types used by storage and the query
//! compiler:
//!
//! - `DataType`: Column types (BOOLEAN through BINARY, including SYMBOL and TIMESTAMP)
//! - `Value`: Runtime values produced by records and functions
//! - `schema`: Column and table definitions plus the `RecordMetadata` contract
//! - `reader`: Storage-facing contracts (`TableReader`, `SymbolTable`, `BitmapIndexReader`, `Catalog`)
//! - `Error`: Positioned compile-time and execution-time errors
//! - `pattern_match`: Compiled `like` and regex patterns
//!
//! # Example
//!
//! ```rust
//! use strata_core::DataType;
//! use strata_core::schema::{PartitionBy, RecordMetadata, TableSchemaBuilder};
//!
//! let table = TableSchemaBuilder::new("trades")
//!     .unwrap()
//!     .add_indexed("sym", DataType::Symbol, 8)
//!     .unwrap()
//!     .add_column("price", DataType::Double)
//!     .unwrap()
//!     .add_column("ts", DataType::Timestamp)
//!     .unwrap()
//!     .timestamp("ts")
//!     .partition_by(PartitionBy::Day)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(table.timestamp_index(), Some(2));
//! assert!(table.is_indexed(0));
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod pattern_match;
pub mod reader;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use reader::RowId;
pub use types::DataType;
pub use value::Value;
