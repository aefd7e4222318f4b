//! Column enumeration and join-column expansion.

use super::{create_column_alias, OptimizerContext, OptimizerPass};
use crate::model::ModelId;
use alloc::format;
use alloc::string::ToString;
use strata_core::schema::RecordMetadata;
use strata_core::{DataType, Error, Result};

/// Looks up the columns of every table the query reads.
///
/// Table models get one field per table column and, when the query did not
/// name one, the table's designated timestamp. A sub-query exposes the
/// columns of its nested model.
pub struct TableColumns;

impl OptimizerPass for TableColumns {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        enumerate(cx, model)?;
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "table_columns"
    }
}

fn enumerate(cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<()> {
    if let Some(table) = cx.models[model].table_name {
        let (name, position) = {
            let node = &cx.exprs[table];
            (node.token.clone(), node.position)
        };
        let reader = cx
            .catalog
            .table(&name)
            .ok_or_else(|| Error::parse(position, "table does not exist"))?;
        let schema = reader.schema();

        for i in 0..schema.column_count() {
            let alias = create_column_alias(&cx.models[model].column_name_type, schema.column_name(i));
            cx.models[model].add_field(&alias);
        }

        match cx.models[model].timestamp {
            None => {
                if let Some(ts) = schema.timestamp_index() {
                    let node = cx.exprs.literal(schema.column_name(ts), 0);
                    cx.models[model].timestamp = Some(node);
                }
            }
            Some(ts) => {
                let node = &cx.exprs[ts];
                match schema.column_index_quiet(&node.token) {
                    None => return Err(Error::invalid_column(node.position, &node.token)),
                    Some(i) if schema.column_type(i) != DataType::Timestamp => {
                        return Err(Error::parse(node.position, "not a TIMESTAMP"));
                    }
                    Some(_) => {}
                }
            }
        }
    } else if let Some(nested) = cx.models[model].nested {
        enumerate(cx, nested)?;
        cx.models.copy_columns(model, nested);
    }

    let joins = cx.models[model].join_models.clone();
    for &jm in joins.iter().skip(1) {
        enumerate(cx, jm)?;
    }
    Ok(())
}

/// Names every join member and expands `join t on (x, y)` into
/// `a.x = t.x and a.y = t.y`.
///
/// Members without an alias or table name get a generated `_xQdbA<n>`
/// alias. Two members under the same name fail with `Duplicate alias`.
pub struct JoinColumns;

impl OptimizerPass for JoinColumns {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        resolve(cx, model)?;
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "join_columns"
    }
}

fn resolve(cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<()> {
    let model_alias = cx.model_alias(model);
    collect_alias(cx, model, 0, model)?;

    let joins = cx.models[model].join_models.clone();
    for (i, &jm) in joins.iter().enumerate().skip(1) {
        let columns = cx.models[jm].join_columns.clone();
        if !columns.is_empty() {
            let jm_alias = cx.model_alias(jm);
            let mut criteria = cx.models[jm].join_criteria;
            for column in columns {
                let (token, position) = {
                    let node = &cx.exprs[column];
                    (node.token.clone(), node.position)
                };
                let lhs = cx.exprs.literal(format!("{}.{}", model_alias, token), position);
                let rhs = cx.exprs.literal(format!("{}.{}", jm_alias, token), position);
                let eq = cx.exprs.operation("=", lhs, rhs, position);
                criteria = Some(cx.exprs.concat_and(criteria, eq));
            }
            cx.models[jm].join_criteria = criteria;
        }
        resolve(cx, jm)?;
        collect_alias(cx, model, i, jm)?;
    }

    if let Some(nested) = cx.models[model].nested {
        resolve(cx, nested)?;
    }
    Ok(())
}

fn collect_alias(cx: &mut OptimizerContext<'_>, parent: ModelId, index: usize, model: ModelId) -> Result<()> {
    let Some(node) = cx.models[model].alias.or(cx.models[model].table_name) else {
        return Ok(());
    };
    let (alias, position) = {
        let node = &cx.exprs[node];
        (node.token.to_string(), node.position)
    };
    let aliases = &mut cx.models[parent].alias_indexes;
    if aliases.contains_key(&alias) {
        return Err(Error::duplicate_alias(position));
    }
    aliases.insert(alias, index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::SqlOptimizer;
    use super::*;
    use crate::ast::ExprArena;
    use crate::config::CompilerConfig;
    use crate::model::ModelArena;
    use crate::parser::{SqlParser, Statement};
    use alloc::boxed::Box;
    use alloc::string::String;
    use strata_storage::MemoryEngine;

    fn columns_only(engine: &MemoryEngine, sql: &str) -> Result<String> {
        let optimizer = SqlOptimizer::with_passes(alloc::vec![
            Box::new(TableColumns),
            Box::new(JoinColumns)
        ]);
        run(engine, &optimizer, sql)
    }

    #[test]
    fn test_missing_table() {
        let engine = MemoryEngine::new();
        let err = columns_only(&engine, "select a from nope").unwrap_err();
        assert_eq!(err.position(), Some(14));
        assert_eq!(err.message(), "table does not exist");
    }

    #[test]
    fn test_designated_timestamp_is_adopted() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "tab", "x INT, ts TIMESTAMP", Some("ts"));
        let optimizer = SqlOptimizer::with_passes(alloc::vec![Box::new(TableColumns)]);
        assert_eq!(
            run(&engine, &optimizer, "select x from tab").unwrap(),
            "select-choose x from (tab timestamp (ts))"
        );
    }

    #[test]
    fn test_explicit_timestamp_is_validated() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "tab", "x INT, y INT, ts TIMESTAMP", None);
        let err = columns_only(&engine, "select x from tab timestamp(y)").unwrap_err();
        assert_eq!(err.message(), "not a TIMESTAMP");
        assert_eq!(err.position(), Some(28));

        let err = columns_only(&engine, "select x from tab timestamp(z)").unwrap_err();
        assert_eq!(err.message(), "Invalid column: z");
    }

    #[test]
    fn test_join_columns_expand_to_criteria() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "a", "x INT, y INT", None);
        create_table(&mut engine, "b", "x INT, y INT", None);

        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let Statement::Query(root) = SqlParser::new("select a.x from a join b on (x, y)", &mut exprs, &mut models)
            .parse()
            .unwrap()
        else {
            panic!("query expected");
        };
        let config = CompilerConfig::default();
        let mut cx = OptimizerContext::new(&mut exprs, &mut models, &engine, &config);
        TableColumns.optimize(&mut cx, root).unwrap();
        JoinColumns.optimize(&mut cx, root).unwrap();

        let from = models[root].nested.unwrap();
        let b = models[from].join_models[1];
        let criteria = models[b].join_criteria.unwrap();
        assert_eq!(exprs.to_infix(criteria), "a.x = b.x and a.y = b.y");
        assert_eq!(models[from].alias_index("b"), Some(1));
    }

    #[test]
    fn test_duplicate_join_alias() {
        let mut engine = MemoryEngine::new();
        create_table(&mut engine, "a", "x INT", None);
        create_table(&mut engine, "b", "x INT", None);
        let err = columns_only(&engine, "select * from a z join b z on z.x = z.x").unwrap_err();
        assert_eq!(err.message(), "Duplicate alias");
        assert_eq!(err.position(), Some(25));
    }
}
