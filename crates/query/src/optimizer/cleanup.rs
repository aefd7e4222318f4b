//! Final touches applied after filters reached their tables.

use super::{OptimizerContext, OptimizerPass};
use crate::ast::{column_name, NodeId, NodeKind};
use crate::model::{ModelId, SelectModelType};
use alloc::borrow::ToOwned;
use alloc::vec::Vec;
use strata_core::Result;

/// Strips table qualifiers from the WHERE clauses of join members.
///
/// Member filters are localized to a single table, so `b.x > 1` inside
/// member `b` is evaluated as `x > 1`.
pub struct ColumnPrefixEraser;

impl OptimizerPass for ColumnPrefixEraser {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        erase_prefixes(cx, model);
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "column_prefix_eraser"
    }
}

fn erase_prefixes(cx: &mut OptimizerContext<'_>, model: ModelId) {
    let joins = cx.models[model].join_models.clone();
    for jm in joins {
        if let Some(filter) = cx.models[jm].where_clause {
            let rewritten = if cx.exprs[filter].kind == NodeKind::Literal {
                unqualify(cx, filter)
            } else {
                for id in cx.exprs.post_order(filter) {
                    unqualify_arguments(cx, id);
                }
                filter
            };
            cx.models[jm].where_clause = Some(rewritten);
        }
        if let Some(nested) = cx.models[jm].nested {
            erase_prefixes(cx, nested);
        }
    }
}

fn unqualify_arguments(cx: &mut OptimizerContext<'_>, id: NodeId) {
    if !matches!(cx.exprs[id].kind, NodeKind::Function | NodeKind::Operation) {
        return;
    }
    let args: Vec<NodeId> = cx.exprs.arguments(id);
    for (i, arg) in args.into_iter().enumerate() {
        let replacement = unqualify(cx, arg);
        if replacement != arg {
            cx.exprs.replace_argument(id, i, replacement);
        }
    }
}

/// Returns an unqualified copy of a dotted literal, or `node` itself.
fn unqualify(cx: &mut OptimizerContext<'_>, node: NodeId) -> NodeId {
    let n = &cx.exprs[node];
    if n.kind != NodeKind::Literal || !n.token.contains('.') {
        return node;
    }
    let (name, position) = (column_name(&n.token).to_owned(), n.position);
    cx.exprs.literal(name, position)
}

/// Moves the timestamp of an anonymous sub-query wrapper up to the model
/// selecting from it, where sampling and latest-by look for it.
pub struct TimestampPromotion;

impl OptimizerPass for TimestampPromotion {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        promote_timestamp(cx, model);
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "timestamp_promotion"
    }
}

fn promote_timestamp(cx: &mut OptimizerContext<'_>, model: ModelId) {
    let Some(nested) = cx.models[model].nested else {
        return;
    };
    promote_timestamp(cx, nested);

    let n = &cx.models[nested];
    if n.select_model_type == SelectModelType::None && n.table_name.is_none() {
        if let Some(timestamp) = cx.models[nested].timestamp.take() {
            cx.models[model].timestamp = Some(timestamp);
        }
    }
}
