//! Order-by resolution, elimination and order tracking.

use super::{create_column_alias, OptimizerContext, OptimizerPass};
use crate::ast::{NodeId, NodeKind};
use crate::function::is_aggregate;
use crate::model::{ModelId, QueryColumn, SelectModelType};
use alloc::string::String;
use strata_core::Result;

/// Moves `order by` from the base model up to the select layers.
///
/// Columns the select list does not expose are threaded up through the
/// layers and hidden again behind a wrapping `select-choose`. Behind a
/// group-by layer such columns cannot be threaded, so ordering stops at
/// the first of them.
pub struct OrderByRewrite;

impl OptimizerPass for OrderByRewrite {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        rewrite_order_by(cx, model)
    }

    fn name(&self) -> &'static str {
        "order_by_rewrite"
    }
}

fn rewrite_order_by(cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
    let mut result = model;
    let mut base = model;
    let mut base_parent = model;
    let mut wrapper: Option<ModelId> = None;
    let column_count = cx.models[model].columns.len();
    let mut group_by = false;

    while !cx.models[base].columns.is_empty() {
        let Some(nested) = cx.models[base].nested else {
            return Ok(model);
        };
        base_parent = base;
        base = nested;
        group_by = group_by || cx.models[base_parent].select_model_type == SelectModelType::GroupBy;
    }

    // the limit bounds the rows of the outermost layer, after sorting
    if base != model && cx.models[model].limit_lo.is_none() {
        let (lo, hi) = (cx.models[base].limit_lo, cx.models[base].limit_hi);
        cx.models[base].set_limit(None, None);
        cx.models[model].set_limit(lo, hi);
    }

    let order_by = cx.models[base].order_by.clone();
    let directions = cx.models[base].order_by_direction.clone();
    if !order_by.is_empty() {
        let mut ascend = true;
        for (i, &node) in order_by.iter().enumerate() {
            let (column, position) = {
                let n = &cx.exprs[node];
                (n.token.clone(), n.position)
            };
            let dot = column.find('.');

            if dot.is_some() || !cx.models[model].column_name_type.contains_key(&column) {
                cx.table_index_for_column(base, &column, position)?;

                if ascend && base != model {
                    let aliases = &cx.models[base_parent].column_to_alias;
                    let found: Option<String> = aliases
                        .get(&column)
                        .or_else(|| dot.and_then(|d| aliases.get(&column[d + 1..])))
                        .cloned();

                    if let Some(alias) = found {
                        cx.exprs[node].token = alias;
                    } else if group_by {
                        ascend = false;
                    } else {
                        if cx.models[base_parent].select_model_type != SelectModelType::Choose {
                            let synthetic = cx.models.alloc();
                            cx.models[synthetic].select_model_type = SelectModelType::Choose;
                            let columns = cx.models[base_parent].columns.clone();
                            for c in columns {
                                cx.models[synthetic].add_column(c, cx.exprs);
                            }
                            cx.models[synthetic].nested = Some(base);
                            cx.models[base_parent].nested = Some(synthetic);
                            base_parent = synthetic;
                        }

                        let alias = create_column_alias(&cx.models[base_parent].column_name_type, &column);
                        let literal = cx.exprs.literal(column.clone(), position);
                        cx.models[base_parent].add_column(QueryColumn::new(alias.clone(), literal), cx.exprs);

                        let mut m = model;
                        while m != base_parent {
                            let reference = cx.exprs.literal(alias.clone(), position);
                            cx.models[m].add_column(QueryColumn::new(alias.clone(), reference), cx.exprs);
                            match cx.models[m].nested {
                                Some(nested) => m = nested,
                                None => break,
                            }
                        }

                        cx.exprs[node].token = alias;

                        if wrapper.is_none() {
                            let w = cx.models.alloc();
                            cx.models[w].select_model_type = SelectModelType::Choose;
                            for j in 0..column_count {
                                let alias = cx.models[model].columns[j].alias.clone();
                                let reference = cx.exprs.literal(alias.clone(), 0);
                                cx.models[w].add_column(QueryColumn::new(alias, reference), cx.exprs);
                            }
                            cx.models[w].nested = Some(model);
                            wrapper = Some(w);
                            result = w;
                        }
                    }
                }
            }

            if ascend && base != model {
                cx.models[model].add_order_by(node, directions[i]);
            }
        }

        if base != model {
            cx.models[base].clear_order_by();
        }
    }

    if let Some(nested) = cx.models[base].nested {
        let rewritten = rewrite_order_by(cx, nested)?;
        if rewritten != nested {
            cx.models[base].nested = Some(rewritten);
        }
    }

    let joins = cx.models[base].join_models.clone();
    for &jm in joins.iter().skip(1) {
        rewrite_order_by(cx, jm)?;
    }

    Ok(result)
}

/// Whether a model's parent observes the order of its rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OrderByState {
    Unknown,
    Required,
    Invariant,
}

/// Drops `order by` clauses of sub-queries whose parent cannot observe
/// their order.
///
/// Aggregation discards order unless it samples by time. A parent that
/// sorts makes the order of its inputs irrelevant.
pub struct OrderByOptimization;

impl OptimizerPass for OrderByOptimization {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        optimize_order_by(cx, model, OrderByState::Unknown);
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "order_by_optimization"
    }
}

fn optimize_order_by(cx: &mut OptimizerContext<'_>, model: ModelId, state: OrderByState) {
    let sub_query_state = match state {
        OrderByState::Unknown => {
            let shared: &OptimizerContext<'_> = cx;
            let m = &shared.models[model];
            if m.sample_by.is_none() && m.columns.iter().any(|c| has_aggregates(shared, c.ast)) {
                OrderByState::Invariant
            } else {
                OrderByState::Required
            }
        }
        OrderByState::Required => {
            if cx.models[model].order_by.is_empty() {
                OrderByState::Required
            } else {
                OrderByState::Invariant
            }
        }
        OrderByState::Invariant => {
            // a limit observes the order it cuts
            if cx.models[model].limit_lo.is_none() {
                cx.models[model].clear_order_by();
            }
            if cx.models[model].sample_by.is_some() {
                OrderByState::Required
            } else {
                OrderByState::Invariant
            }
        }
    };

    let joins = cx.models[model].join_models.clone();
    for jm in joins {
        if let Some(nested) = cx.models[jm].nested {
            optimize_order_by(cx, nested, sub_query_state);
        }
    }
}

/// Returns whether `node` calls an aggregate outside of a literal subtree.
fn has_aggregates(cx: &OptimizerContext<'_>, node: NodeId) -> bool {
    let n = &cx.exprs[node];
    match n.kind {
        NodeKind::Literal => false,
        NodeKind::Function if is_aggregate(&n.token) => true,
        _ => cx
            .exprs
            .arguments(node)
            .into_iter()
            .any(|arg| has_aggregates(cx, arg)),
    }
}

/// Records, per model, the columns its output is known to be ordered by.
///
/// A model with `order by` is ordered by those columns. A select layer
/// without one inherits the order of its nested model through the
/// columns it passes along unchanged.
pub struct OrderHash;

impl OptimizerPass for OrderHash {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        create_order_hash(cx, model);
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "order_hash"
    }
}

fn create_order_hash(cx: &mut OptimizerContext<'_>, model: ModelId) {
    cx.models[model].order_hash.clear();

    if !cx.models[model].order_by.is_empty() {
        let m = &mut cx.models[model];
        for (&node, &direction) in m.order_by.iter().zip(m.order_by_direction.iter()) {
            m.order_hash.insert(cx.exprs.token(node).into(), direction);
        }
        return;
    }

    let Some(nested) = cx.models[model].nested else {
        return;
    };
    if cx.models[model].columns.is_empty() {
        return;
    }

    create_order_hash(cx, nested);
    let inherited = cx.models[nested].order_hash.clone();
    if inherited.is_empty() {
        return;
    }
    let m = &mut cx.models[model];
    for column in &m.columns {
        let node = &cx.exprs[column.ast];
        if node.kind != NodeKind::Literal {
            continue;
        }
        if let Some(&direction) = inherited.get(&node.token) {
            m.order_hash.insert(column.alias.clone(), direction);
        }
    }
}
