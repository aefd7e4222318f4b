//! Select clause layering.
//!
//! A flat select list is split into up to five stacked models, evaluated
//! inner to outer:
//!
//! - translating (`select-choose`): picks and renames base columns
//! - inner (`select-virtual`): scalar expressions over translated columns
//! - analytic (`select-analytic`): window functions
//! - group-by (`select-group-by`): aggregate calls
//! - outer (`select-virtual`): arithmetic over aggregate results
//!
//! Layers that end up unused are not linked in. The translating layer is
//! elided when another layer is in use and it renames nothing.

use super::{create_column_alias, OptimizerContext, OptimizerPass};
use crate::ast::{NodeId, NodeKind};
use crate::function::is_aggregate;
use crate::model::{ModelId, QueryColumn, SelectModelType};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use strata_core::{Error, Result};
use tracing::debug;

/// Rewrites every select list into layered models.
pub struct SelectRewrite;

impl OptimizerPass for SelectRewrite {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        rewrite_select_clause(cx, model, true)
    }

    fn name(&self) -> &'static str {
        "select_rewrite"
    }
}

/// The candidate layers of one select list.
#[derive(Clone, Copy)]
struct Layers {
    translating: ModelId,
    inner: ModelId,
    group_by: ModelId,
    analytic: ModelId,
    outer: ModelId,
}

impl Layers {
    fn alloc(cx: &mut OptimizerContext<'_>) -> Self {
        let mut layer = |kind: SelectModelType| {
            let id = cx.models.alloc();
            cx.models[id].select_model_type = kind;
            id
        };
        Self {
            group_by: layer(SelectModelType::GroupBy),
            outer: layer(SelectModelType::Virtual),
            inner: layer(SelectModelType::Virtual),
            analytic: layer(SelectModelType::Analytic),
            translating: layer(SelectModelType::Choose),
        }
    }
}

/// `flat_parent` tells whether the model owning `model` selects no columns.
fn rewrite_select_clause(cx: &mut OptimizerContext<'_>, model: ModelId, flat_parent: bool) -> Result<ModelId> {
    let joins = cx.models[model].join_models.clone();
    for (i, &m) in joins.iter().enumerate() {
        let flat = cx.models[m].columns.is_empty();
        if let Some(nested) = cx.models[m].nested {
            let rewritten = rewrite_select_clause(cx, nested, flat)?;
            if rewritten != nested {
                cx.models[m].nested = Some(rewritten);
                cx.models.copy_columns(m, rewritten);
            }
        }

        if flat {
            if let Some(sample_by) = cx.models[m].sample_by.filter(|_| flat_parent) {
                return Err(Error::parse(
                    cx.exprs[sample_by].position,
                    "'sample by' must be used with 'select' clause, which contains aggerate expression(s)",
                ));
            }
        } else {
            let layered = rewrite_layers(cx, m)?;
            cx.models[model].join_models[i] = layered;
        }
    }
    Ok(cx.models[model].join_models[0])
}

fn rewrite_layers(cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
    let Some(base) = cx.models[model].nested else {
        return Err(Error::parse(0, "sub-query expected"));
    };
    let layers = Layers::alloc(cx);
    let has_joins = cx.models[base].join_models.len() > 1;
    let mut use_inner = false;
    let mut use_analytic = false;
    let mut use_group_by = false;
    let mut use_outer = false;

    let sample_by = cx.models[model]
        .sample_by
        .take()
        .or_else(|| cx.models[base].sample_by.take());
    if let Some(sample_by) = sample_by {
        let Some(timestamp) = cx.models[base].timestamp else {
            return Err(Error::parse(
                cx.exprs[sample_by].position,
                "TIMESTAMP column is required but not provided",
            ));
        };
        let group_by = &mut cx.models[layers.group_by];
        group_by.sample_by = Some(sample_by);
        group_by.timestamp = Some(timestamp);
        cx.models[base].timestamp = None;

        let name = cx.exprs.token(timestamp).to_string();
        create_select_column(cx, &layers, &name, timestamp, Some(base))?;
    }

    let columns = cx.models[model].columns.clone();
    for qc in columns {
        let (kind, token, position) = {
            let node = &cx.exprs[qc.ast];
            (node.kind, node.token.clone(), node.position)
        };

        if qc.analytic.is_some() && kind != NodeKind::Function {
            return Err(Error::parse(position, "Analytic function expected"));
        }

        if kind == NodeKind::Literal {
            if token.ends_with('*') {
                create_wildcard_columns(cx, &layers, qc.ast, base, has_joins)?;
            } else {
                create_select_column(cx, &layers, &qc.alias, qc.ast, Some(base))?;
            }
            continue;
        }

        if kind == NodeKind::Function {
            if qc.analytic.is_some() {
                cx.models[layers.analytic].add_column(qc.clone(), cx.exprs);
                emit_literals(cx, qc.ast, layers.translating, Some(layers.inner), base)?;
                use_analytic = true;
                continue;
            }
            if is_aggregate(&token) {
                cx.models[layers.group_by].add_column(qc.clone(), cx.exprs);
                add_alias_column(cx, &[layers.outer], &qc.alias);
                emit_literals(cx, qc.ast, layers.translating, Some(layers.inner), base)?;
                use_group_by = true;
                continue;
            }
        }

        let before = cx.models[layers.group_by].columns.len();
        emit_aggregates(cx, qc.ast, layers.group_by);
        let after = cx.models[layers.group_by].columns.len();
        if before < after {
            cx.models[layers.outer].add_column(qc.clone(), cx.exprs);
            for j in before..after {
                let ast = cx.models[layers.group_by].columns[j].ast;
                emit_literals(cx, ast, layers.translating, Some(layers.inner), base)?;
            }
            use_group_by = true;
            use_outer = true;
        } else {
            cx.models[layers.inner].add_column(qc.clone(), cx.exprs);
            use_inner = true;
            emit_literals(cx, qc.ast, layers.translating, None, base)?;
            add_alias_column(cx, &[layers.group_by, layers.analytic, layers.outer], &qc.alias);
        }
    }

    if use_analytic && use_group_by {
        return Err(Error::constraint(
            0,
            "Analytic function is not allowed in context of aggregation. Use sub-query.",
        ));
    }

    let redundant = (use_inner || use_group_by || use_analytic)
        && cx.models[layers.translating]
            .columns
            .iter()
            .all(|c| cx.exprs.token(c.ast) == c.alias);

    let mut root = if redundant {
        debug!("translating layer elided");
        base
    } else {
        cx.models[layers.translating].nested = Some(base);
        layers.translating
    };

    if use_inner {
        cx.models[layers.inner].nested = Some(root);
        root = layers.inner;
    }

    if use_analytic {
        cx.models[layers.analytic].nested = Some(root);
        root = layers.analytic;
    } else if use_group_by {
        cx.models[layers.group_by].nested = Some(root);
        root = layers.group_by;
        if use_outer {
            cx.models[layers.outer].nested = Some(root);
            root = layers.outer;
        }
    }

    if !use_group_by {
        if let Some(sample_by) = cx.models[layers.group_by].sample_by {
            return Err(Error::parse(
                cx.exprs[sample_by].position,
                "at least one aggregation function must be present in 'select' clause",
            ));
        }
    }

    Ok(root)
}

/// Adds `ast` to the translating layer under an alias derived from `name`
/// and references that alias from every other layer.
fn create_select_column(
    cx: &mut OptimizerContext<'_>,
    layers: &Layers,
    name: &str,
    ast: NodeId,
    validating: Option<ModelId>,
) -> Result<()> {
    let alias = create_column_alias(&cx.models[layers.translating].column_name_type, name);
    if let Some(validating) = validating {
        let (token, position) = {
            let node = &cx.exprs[ast];
            (node.token.clone(), node.position)
        };
        cx.table_index_for_column(validating, &token, position)?;
    }
    cx.models[layers.translating].add_column(QueryColumn::new(alias.clone(), ast), cx.exprs);
    add_alias_column(
        cx,
        &[layers.inner, layers.group_by, layers.analytic, layers.outer],
        &alias,
    );
    Ok(())
}

/// Expands `*` or `t.*` into one select column per source column.
fn create_wildcard_columns(
    cx: &mut OptimizerContext<'_>,
    layers: &Layers,
    wildcard: NodeId,
    base: ModelId,
    has_joins: bool,
) -> Result<()> {
    let (token, position) = {
        let node = &cx.exprs[wildcard];
        (node.token.clone(), node.position)
    };
    let sources: Vec<ModelId> = match token.find('.') {
        Some(dot) => {
            let index = cx.models[base]
                .alias_index(&token[..dot])
                .ok_or_else(|| Error::parse(position, "invalid table alias"))?;
            alloc::vec![cx.models[base].join_models[index]]
        }
        None => cx.models[base].join_models.clone(),
    };

    for source in sources {
        let prefix: String = cx.models[source].name(cx.exprs).unwrap_or_default().to_string();
        let names: Vec<String> = cx.models[source].column_name_type.keys().cloned().collect();
        for name in names {
            let column = if has_joins {
                format!("{}.{}", prefix, name)
            } else {
                name.clone()
            };
            let literal = cx.exprs.literal(column, position);
            create_select_column(cx, layers, &name, literal, None)?;
        }
    }
    Ok(())
}

/// Adds a pass-through column named `alias` to each of `targets`.
fn add_alias_column(cx: &mut OptimizerContext<'_>, targets: &[ModelId], alias: &str) {
    let literal = cx.exprs.literal(alias, 0);
    for &target in targets {
        cx.models[target].add_column(QueryColumn::new(alias, literal), cx.exprs);
    }
}

/// Replaces every column reference below `node` with the alias the
/// translating layer gives it, adding unseen columns to that layer.
fn emit_literals(
    cx: &mut OptimizerContext<'_>,
    node: NodeId,
    translating: ModelId,
    inner: Option<ModelId>,
    validating: ModelId,
) -> Result<()> {
    let args = cx.exprs.arguments(node);
    let mut replaced = alloc::vec![false; args.len()];
    for (i, &arg) in args.iter().enumerate().rev() {
        if let Some(literal) = replace_literal(cx, arg, translating, inner, validating)? {
            cx.exprs.replace_argument(node, i, literal);
            replaced[i] = true;
        }
    }
    for (i, &arg) in args.iter().enumerate() {
        if !replaced[i] {
            emit_literals(cx, arg, translating, inner, validating)?;
        }
    }
    Ok(())
}

fn replace_literal(
    cx: &mut OptimizerContext<'_>,
    node: NodeId,
    translating: ModelId,
    inner: Option<ModelId>,
    validating: ModelId,
) -> Result<Option<NodeId>> {
    let (token, position) = {
        let n = &cx.exprs[node];
        if n.kind != NodeKind::Literal || n.token == "*" {
            return Ok(None);
        }
        (n.token.clone(), n.position)
    };

    if let Some(alias) = cx.models[translating].column_to_alias.get(&token).cloned() {
        return Ok(Some(cx.exprs.literal(alias, position)));
    }

    let alias = create_column_alias(&cx.models[translating].column_name_type, &token);
    cx.table_index_for_column(validating, &token, position)?;
    let column = QueryColumn::new(alias.clone(), node);
    cx.models[translating].add_column(column.clone(), cx.exprs);
    if let Some(inner) = inner {
        cx.models[inner].add_column(column, cx.exprs);
    }
    Ok(Some(cx.exprs.literal(alias, position)))
}

/// Moves aggregate calls below `node` into `group_by`, leaving alias
/// references behind.
fn emit_aggregates(cx: &mut OptimizerContext<'_>, node: NodeId, group_by: ModelId) {
    let args = cx.exprs.arguments(node);
    let mut replaced = alloc::vec![false; args.len()];
    for (i, &arg) in args.iter().enumerate().rev() {
        let (kind, token, position) = {
            let n = &cx.exprs[arg];
            (n.kind, n.token.clone(), n.position)
        };
        if kind == NodeKind::Function && is_aggregate(&token) {
            let alias = create_column_alias(&cx.models[group_by].column_name_type, &token);
            cx.models[group_by].add_column(QueryColumn::new(alias.clone(), arg), cx.exprs);
            let literal = cx.exprs.literal(alias, position);
            cx.exprs.replace_argument(node, i, literal);
            replaced[i] = true;
        }
    }
    for (i, &arg) in args.iter().enumerate() {
        if !replaced[i] {
            emit_aggregates(cx, arg, group_by);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{JoinColumns, SqlOptimizer, TableColumns};
    use super::*;
    use alloc::boxed::Box;
    use strata_storage::MemoryEngine;

    fn rewrite(engine: &MemoryEngine, sql: &str) -> Result<String> {
        let optimizer = SqlOptimizer::with_passes(alloc::vec![
            Box::new(TableColumns),
            Box::new(JoinColumns),
            Box::new(SelectRewrite)
        ]);
        run(engine, &optimizer, sql)
    }

    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "t", "a INT, b INT, c INT, z INT", None);
        create_table(&mut engine, "zyzy", "a INT, b INT, c INT, z INT", None);
        create_table(&mut engine, "tab1", "x INT, z INT", None);
        create_table(&mut engine, "xyz", "a INT, b INT, c INT, d INT, ts TIMESTAMP", None);
        create_table(&mut engine, "tab", "x INT, y DOUBLE, t TIMESTAMP, timestamp TIMESTAMP", Some("timestamp"));
        engine
    }

    #[test]
    fn test_plain_columns_choose() {
        assert_eq!(
            rewrite(&engine(), "select a,b,c from t").unwrap(),
            "select-choose a, b, c from (t)"
        );
    }

    #[test]
    fn test_arithmetic_goes_virtual() {
        assert_eq!(
            rewrite(&engine(), "select a+b*c x from t").unwrap(),
            "select-virtual a + b * c x from (t)"
        );
    }

    #[test]
    fn test_aggregate_arithmetic_gets_outer_layer() {
        assert_eq!(
            rewrite(&engine(), "select a+b*c x, sum(z)+25 ohoh from zyzy").unwrap(),
            "select-virtual x, sum + 25 ohoh from (select-group-by x, sum(z) sum from \
             (select-virtual a + b * c x, z from (zyzy)))"
        );
    }

    #[test]
    fn test_generated_operator_aliases() {
        assert_eq!(
            rewrite(&engine(), "select x+z, x-z, x*z, x/z, x%z, x^z from tab1").unwrap(),
            "select-virtual x + z column, x - z column1, x * z column2, x / z column3, \
             x % z column4, x ^ z column5 from (tab1)"
        );
    }

    #[test]
    fn test_analytic_columns() {
        assert_eq!(
            rewrite(
                &engine(),
                "select a,b, f(c) my over (partition by b order by ts), d(c) over() from xyz"
            )
            .unwrap(),
            "select-analytic a, b, f(c) my over (partition by b order by ts), d(c) d over () from (xyz)"
        );
    }

    #[test]
    fn test_sample_by_with_designated_timestamp() {
        assert_eq!(
            rewrite(&engine(), "select x,avg(y) from tab sample by 2m").unwrap(),
            "select-group-by timestamp, x, avg(y) avg from (tab) timestamp (timestamp) sample by 2m"
        );
    }

    #[test]
    fn test_sample_by_with_explicit_timestamp() {
        assert_eq!(
            rewrite(&engine(), "select x,avg(y) from tab timestamp(t) sample by 2m").unwrap(),
            "select-group-by t, x, avg(y) avg from (tab) timestamp (t) sample by 2m"
        );
    }

    #[test]
    fn test_sample_by_errors() {
        let mut engine = engine();
        create_table(&mut engine, "nots", "x INT, y DOUBLE", None);
        let err = rewrite(&engine, "select x,avg(y) from nots sample by 2m").unwrap_err();
        assert_eq!(err.message(), "TIMESTAMP column is required but not provided");
        assert_eq!(err.position(), Some(36));

        let err = rewrite(&engine, "select x,y from tab sample by 2m").unwrap_err();
        assert_eq!(
            err.message(),
            "at least one aggregation function must be present in 'select' clause"
        );
    }

    #[test]
    fn test_analytic_and_aggregate_conflict() {
        let err = rewrite(&engine(), "select sum(a), f(b) over () from t").unwrap_err();
        assert_eq!(
            err.message(),
            "Analytic function is not allowed in context of aggregation. Use sub-query."
        );
    }

    #[test]
    fn test_wildcard_alias_must_exist() {
        let err = rewrite(&engine(), "select q.* from t").unwrap_err();
        assert_eq!(err.message(), "invalid table alias");
        assert_eq!(err.position(), Some(7));
    }

    #[test]
    fn test_unknown_column() {
        let err = rewrite(&engine(), "select a, nope from t").unwrap_err();
        assert_eq!(err.message(), "Invalid column: nope");
        assert_eq!(err.position(), Some(10));
    }
}
