//! Query models produced by the parser and rewritten by the optimizer.
//!
//! - `query`: `QueryModel` and the arena that owns every model of a compilation
//! - `join_context`: equality edges between join members
//! - `interval`: sorted, coalesced timestamp interval lists
//! - `intrinsic`: index and interval summary of a WHERE clause
//! - `ddl`: `CREATE TABLE` and `RENAME TABLE` statements
//! - `sink`: text rendering of a model tree

use alloc::string::String;

mod ddl;
mod intrinsic;
pub mod interval;
mod join_context;
mod query;
mod sink;

pub use ddl::{ColumnCastModel, CreateTableColumn, CreateTableModel, RenameTableModel};
pub use intrinsic::{IntrinsicModel, IntrinsicValue};
pub use join_context::JoinContext;
pub use query::{
    AnalyticSpec, JoinType, ModelArena, ModelId, QueryColumn, QueryModel, SelectModelType,
    SortOrder, SUB_QUERY_ALIAS_PREFIX,
};
pub use sink::to_sink;

/// Insertion-ordered map keyed by name.
pub type OrderedMap<V> = indexmap::IndexMap<String, V, hashbrown::hash_map::DefaultHashBuilder>;
