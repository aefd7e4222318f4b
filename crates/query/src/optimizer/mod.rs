//! Query model optimizer.
//!
//! The optimizer rewrites the model tree produced by the parser into the
//! layered form the code generator consumes. Every pass works on the shared
//! [`OptimizerContext`], which owns mutable access to the expression and
//! model arenas of one compilation.

mod cleanup;
mod columns;
pub mod intrinsic;
mod join_reorder;
mod not_simplification;
mod order_by;
mod pass;
mod predicate_pushdown;
mod select_rewrite;

pub use cleanup::{ColumnPrefixEraser, TimestampPromotion};
pub use columns::{JoinColumns, TableColumns};
pub use intrinsic::QueryFilterAnalyser;
pub use join_reorder::JoinReorder;
pub use not_simplification::NotSimplification;
pub use order_by::{OrderByOptimization, OrderByRewrite, OrderHash};
pub use pass::OptimizerPass;
pub use predicate_pushdown::PredicatePushdown;
pub use select_rewrite::SelectRewrite;

use crate::ast::{column_name, ExprArena, NodeId, NodeKind};
use crate::config::CompilerConfig;
use crate::model::{ModelArena, ModelId, OrderedMap, SUB_QUERY_ALIAS_PREFIX};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use strata_core::reader::Catalog;
use strata_core::{Error, Result};
use tracing::debug;

/// Mutable state shared by the passes of one optimization run.
pub struct OptimizerContext<'a> {
    pub exprs: &'a mut ExprArena,
    pub models: &'a mut ModelArena,
    pub catalog: &'a dyn Catalog,
    pub config: &'a CompilerConfig,
    alias_count: usize,
}

impl<'a> OptimizerContext<'a> {
    /// Creates a context over the arenas of one compilation.
    pub fn new(
        exprs: &'a mut ExprArena,
        models: &'a mut ModelArena,
        catalog: &'a dyn Catalog,
        config: &'a CompilerConfig,
    ) -> Self {
        Self {
            exprs,
            models,
            catalog,
            config,
            alias_count: 0,
        }
    }

    /// Returns the name of `model`, assigning a generated alias when it has none.
    pub(crate) fn model_alias(&mut self, model: ModelId) -> String {
        if let Some(name) = self.models[model].name(self.exprs) {
            return name.to_string();
        }
        let alias = format!("{}{}", SUB_QUERY_ALIAS_PREFIX, self.alias_count);
        self.alias_count += 1;
        let node = self.exprs.literal(alias.clone(), 0);
        self.models[model].alias = Some(node);
        alias
    }

    /// Resolves which join member of `model` provides `column`.
    ///
    /// Unqualified names must match exactly one member. Qualified names are
    /// resolved through the member alias.
    pub(crate) fn table_index_for_column(
        &self,
        model: ModelId,
        column: &str,
        position: usize,
    ) -> Result<usize> {
        let parent = &self.models[model];
        match column.find('.') {
            None => {
                let mut index = None;
                for (i, &jm) in parent.join_models.iter().enumerate() {
                    if !self.models[jm].column_name_type.contains_key(column) {
                        continue;
                    }
                    if index.is_some() {
                        return Err(Error::ambiguous_column(position));
                    }
                    index = Some(i);
                }
                index.ok_or_else(|| Error::invalid_column(position, column))
            }
            Some(dot) => {
                let index = parent
                    .alias_index(&column[..dot])
                    .ok_or_else(|| Error::invalid_table(position))?;
                let jm = parent.join_models[index];
                if !self.models[jm]
                    .column_name_type
                    .contains_key(&column[dot + 1..])
                {
                    return Err(Error::invalid_column(position, column));
                }
                Ok(index)
            }
        }
    }

    /// Attaches a filter to `model`, or to its nested model when `model`
    /// selects columns.
    pub(crate) fn add_where_node(&mut self, model: ModelId, node: NodeId) {
        let target = if self.models[model].columns.is_empty() {
            Some(model)
        } else {
            self.models[model].nested
        };
        if let Some(target) = target {
            let existing = self.models[target].where_clause;
            let combined = self.exprs.concat_and(existing, node);
            self.models[target].where_clause = Some(combined);
        }
    }

    /// Attaches a filter to join member `index` of `parent`.
    pub(crate) fn add_join_where(&mut self, parent: ModelId, index: usize, node: NodeId) {
        let jm = self.models.join_model(parent, index);
        self.add_where_node(jm, node);
    }

    /// Collects the join members referenced by the literals of `node`.
    pub(crate) fn collect_literals(
        &self,
        model: ModelId,
        node: Option<NodeId>,
        refs: &mut LiteralRefs,
    ) -> Result<()> {
        let Some(node) = node else {
            return Ok(());
        };
        for id in self.exprs.post_order(node) {
            let n = &self.exprs[id];
            match n.kind {
                NodeKind::Literal => {
                    refs.indexes
                        .push(self.table_index_for_column(model, &n.token, n.position)?);
                    refs.names.push(column_name(&n.token).to_string());
                }
                NodeKind::Constant if is_null_constant(&n.token) => refs.null_count += 1,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Join member references found in an expression.
#[derive(Clone, Debug, Default)]
pub(crate) struct LiteralRefs {
    pub indexes: Vec<usize>,
    pub names: Vec<String>,
    pub null_count: usize,
}

fn is_null_constant(token: &str) -> bool {
    token == "null" || token == "NaN"
}

/// Returns `base` when it is not taken in `names`, else `base1`, `base2`, ...
pub(crate) fn create_column_alias<V>(names: &OrderedMap<V>, token: &str) -> String {
    let base = column_name(token);
    if !names.contains_key(base) {
        return base.to_string();
    }
    let mut sequence = 1;
    loop {
        let alias = format!("{}{}", base, sequence);
        if !names.contains_key(&alias) {
            return alias;
        }
        sequence += 1;
    }
}

/// Runs optimization passes over a parsed query model.
pub struct SqlOptimizer {
    passes: Vec<Box<dyn OptimizerPass>>,
}

impl Default for SqlOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlOptimizer {
    /// Creates an optimizer with the default passes.
    ///
    /// The default passes are applied in this order:
    /// 1. TableColumns - Look up table columns and designated timestamps
    /// 2. JoinColumns - Expand `join ... on (col)` into equality criteria
    /// 3. NotSimplification - Push `not` down into comparisons
    /// 4. SelectRewrite - Split select lists into choose, virtual, group-by and analytic layers
    /// 5. OrderByRewrite - Resolve order-by columns, hiding ones the select list lacks
    /// 6. OrderByOptimization - Drop order-by clauses whose order cannot be observed
    /// 7. OrderHash - Record the columns each layer is ordered by
    /// 8. JoinReorder - Build join contexts, order tables and place filters
    /// 9. PredicatePushdown - Move filters into sub-queries
    /// 10. ColumnPrefixEraser - Strip table qualifiers from localized filters
    /// 11. TimestampPromotion - Move timestamps out of anonymous sub-queries
    pub fn new() -> Self {
        Self {
            passes: alloc::vec![
                Box::new(TableColumns),
                Box::new(JoinColumns),
                Box::new(NotSimplification),
                Box::new(SelectRewrite),
                Box::new(OrderByRewrite),
                Box::new(OrderByOptimization),
                Box::new(OrderHash),
                Box::new(JoinReorder),
                Box::new(PredicatePushdown),
                Box::new(ColumnPrefixEraser),
                Box::new(TimestampPromotion),
            ],
        }
    }

    /// Creates an optimizer with custom passes.
    pub fn with_passes(passes: Vec<Box<dyn OptimizerPass>>) -> Self {
        Self { passes }
    }

    /// Optimizes the model tree rooted at `model` and returns the new root.
    pub fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        self.optimize_expression_models(cx, model)?;
        let mut model = model;
        for pass in &self.passes {
            model = pass.optimize(cx, model)?;
            debug!(pass = pass.name(), model = model.index(), "optimizer pass applied");
        }
        Ok(model)
    }

    /// Optimizes sub-queries used as expression operands, such as `x in (select ...)`.
    fn optimize_expression_models(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<()> {
        let mut roots: Vec<NodeId> = cx.models[model].columns.iter().map(|c| c.ast).collect();
        roots.extend(cx.models[model].where_clause);
        roots.extend(cx.models[model].join_criteria);

        let mut lambdas = Vec::new();
        for root in roots {
            lambdas.extend(
                cx.exprs
                    .post_order(root)
                    .into_iter()
                    .filter(|&n| cx.exprs[n].kind == NodeKind::Lambda),
            );
        }
        for lambda in lambdas {
            if let Some(query) = cx.exprs[lambda].query {
                let optimized = self.optimize(cx, query)?;
                cx.exprs[lambda].query = Some(optimized);
            }
        }

        if let Some(nested) = cx.models[model].nested {
            self.optimize_expression_models(cx, nested)?;
        }
        let joins = cx.models[model].join_models.clone();
        for &jm in joins.iter().skip(1) {
            self.optimize_expression_models(cx, jm)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use strata_storage::MemoryEngine;

    #[test]
    fn test_create_column_alias() {
        let mut names: OrderedMap<NodeKind> = OrderedMap::default();
        assert_eq!(create_column_alias(&names, "t.x"), "x");
        names.insert("x".into(), NodeKind::Literal);
        names.insert("x1".into(), NodeKind::Literal);
        assert_eq!(create_column_alias(&names, "x"), "x2");
    }

    #[test]
    fn test_default_pipeline() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "t", "a INT, b INT, c INT", None);
        assert_eq!(
            optimize(&engine, "select a,b,c from t"),
            "select-choose a, b, c from (t)"
        );
    }

    #[test]
    fn test_sub_query_in_where_is_optimized() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "x", "a INT, b INT", None);
        create_table(&mut engine, "y", "b INT", None);
        assert_eq!(
            optimize(&engine, "select a from x where b in (select b from y)"),
            "select-choose a from (x where b in (select-choose b from (y)))"
        );
    }

    #[test]
    fn test_custom_passes() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "t", "a INT", None);
        let optimizer = SqlOptimizer::with_passes(alloc::vec![Box::new(TableColumns)]);
        assert_eq!(
            run(&engine, &optimizer, "select a from t").unwrap(),
            "select-choose a from (t)"
        );
    }
}
