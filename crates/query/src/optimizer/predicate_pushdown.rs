//! Predicate pushdown optimization pass.
//!
//! Moves each conjunct of a WHERE clause into the sub-query of the join
//! member it references. Column aliases are translated to the sub-query's
//! own column expressions on the way down, so `(select a x from t) where
//! x = 10` becomes `select a x from (t where a = 10)`.
//!
//! A conjunct that references a computed column of the sub-query stays
//! where it is.

use super::{LiteralRefs, OptimizerContext, OptimizerPass};
use crate::ast::{column_name, NodeId, NodeKind};
use crate::model::ModelId;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{Error, Result};

/// Predicate pushdown optimization.
pub struct PredicatePushdown;

impl OptimizerPass for PredicatePushdown {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        self.pushdown(cx, model)?;
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "predicate_pushdown"
    }
}

impl PredicatePushdown {
    fn pushdown(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<()> {
        cx.models[model].parsed_where.clear();
        let nodes = match cx.models[model].where_clause.take() {
            Some(filter) => cx.exprs.conjuncts(filter),
            None => Vec::new(),
        };

        for node in nodes {
            let mut refs = LiteralRefs::default();
            cx.collect_literals(model, Some(node), &mut refs)?;

            let Some(&index) = refs.indexes.first() else {
                cx.add_where_node(model, node);
                continue;
            };

            let parent = cx.models.join_model(model, index);
            let Some(nested) = cx.models[parent].nested else {
                cx.add_where_node(parent, node);
                continue;
            };

            if cx.models[nested].limit_lo.is_none() && self.references_only_columns(cx, nested, node)? {
                self.rewrite_aliases(cx, nested, node);
                cx.add_where_node(nested, node);
            } else {
                cx.add_where_node(parent, node);
            }
        }

        if let Some(nested) = cx.models[model].nested {
            self.pushdown(cx, nested)?;
        }
        let joins = cx.models[model].join_models.clone();
        for jm in joins {
            if jm != model {
                self.pushdown(cx, jm)?;
            }
        }
        Ok(())
    }

    /// Returns false when a literal of `node` names a computed column of
    /// `nested`. Unknown names fail.
    fn references_only_columns(
        &self,
        cx: &OptimizerContext<'_>,
        nested: ModelId,
        node: NodeId,
    ) -> Result<bool> {
        let names = &cx.models[nested].column_name_type;
        for id in cx.exprs.post_order(node) {
            let n = &cx.exprs[id];
            if n.kind != NodeKind::Literal {
                continue;
            }
            match names.get(column_name(&n.token)) {
                None => return Err(Error::invalid_column(n.position, &n.token)),
                Some(NodeKind::Literal) => {}
                Some(_) => return Ok(false),
            }
        }
        Ok(true)
    }

    fn rewrite_aliases(&self, cx: &mut OptimizerContext<'_>, nested: ModelId, node: NodeId) {
        let renames: Vec<(NodeId, String)> = cx
            .exprs
            .post_order(node)
            .into_iter()
            .filter_map(|id| {
                let n = &cx.exprs[id];
                if n.kind != NodeKind::Literal {
                    return None;
                }
                let column = cx.models[nested]
                    .alias_to_column
                    .get(column_name(&n.token))?;
                (*column != n.token).then(|| (id, column.clone()))
            })
            .collect();
        for (id, column) in renames {
            cx.exprs[id].token = column;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use strata_storage::MemoryEngine;

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "tab", "a INT, b INT, c INT", None);
        engine
    }

    #[test]
    fn test_alias_is_translated() {
        assert_eq!(
            optimize(&engine(), "select x from (select a x, b from tab) where x = 10"),
            "select-choose x from ((select-choose a x, b from (tab where a = 10)) _xQdbA1)"
        );
    }

    #[test]
    fn test_computed_column_blocks_pushdown() {
        assert_eq!(
            optimize(&engine(), "select y from (select a + b y from tab) where y > 10"),
            "select-choose y from ((select-virtual a + b y from (tab)) _xQdbA1 where y > 10)"
        );
    }

    #[test]
    fn test_filter_reaches_innermost_table() {
        assert_eq!(
            optimize(
                &engine(),
                "select a from (select a, b from (select a, b, c from tab)) where b = 5 and a > 1"
            ),
            "select-choose a from ((select-choose a, b from ((select-choose a, b, c from \
             (tab where b = 5 and a > 1)) _xQdbA3)) _xQdbA1)"
        );
    }

    #[test]
    fn test_unknown_column_fails() {
        let (position, message) = error(&engine(), "select a from (select a from tab) where b = 1");
        assert_eq!(message, "Invalid column: b");
        assert_eq!(position, 40);
    }
}
