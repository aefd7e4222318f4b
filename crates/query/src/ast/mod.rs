//! Expression syntax trees.

mod node;
pub mod operator;

pub use node::{
    column_name, column_prefix, describe, parse_number, set_arguments, ExprArena, ExprNode,
    NodeId, NodeKind,
};
pub use operator::{Operator, OperatorKind};
