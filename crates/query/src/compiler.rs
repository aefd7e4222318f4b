//! Statement compilation entry point.
//!
//! [`SqlCompiler`] owns the expression and model arenas of one caller. Every
//! call clears them, parses the statement, optimizes query models and
//! generates the cursor factory. DDL statements are applied to a
//! [`MemoryEngine`].
//!
//! A compiler is not shared between threads; independent compilations use
//! independent compilers.

use crate::ast::ExprArena;
use crate::codegen::CodeGenerator;
use crate::config::CompilerConfig;
use crate::context::SqlExecutionContext;
use crate::cursor::{collect_rows, RecordCursorFactory};
use crate::function::FunctionRegistry;
use crate::model::{to_sink, CreateTableModel, ModelArena, ModelId};
use crate::optimizer::{OptimizerContext, SqlOptimizer};
use crate::parser::{SqlParser, Statement};
use alloc::boxed::Box;
use alloc::string::String;
use strata_core::reader::Catalog;
use strata_core::schema::RecordMetadata;
use strata_core::{Error, Result};
use strata_storage::MemoryEngine;
use tracing::debug;

/// Outcome of [`SqlCompiler::execute`].
pub enum CompiledStatement {
    /// A query, ready to open cursors.
    Select(Box<dyn RecordCursorFactory>),
    /// A table was created; `rows` were copied from the source query.
    CreateTable { name: String, rows: usize },
    /// A table was renamed.
    RenameTable { from: String, to: String },
}

/// Parses, optimizes and generates SQL statements.
pub struct SqlCompiler {
    ctx: SqlExecutionContext,
    registry: FunctionRegistry,
    optimizer: SqlOptimizer,
    exprs: ExprArena,
    models: ModelArena,
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl SqlCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            ctx: SqlExecutionContext::new(config),
            registry: FunctionRegistry::builtin(),
            optimizer: SqlOptimizer::new(),
            exprs: ExprArena::new(),
            models: ModelArena::new(),
        }
    }

    /// Replaces the function registry.
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the optimizer passes.
    pub fn with_optimizer(mut self, optimizer: SqlOptimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn context(&self) -> &SqlExecutionContext {
        &self.ctx
    }

    fn parse(&mut self, sql: &str) -> Result<Statement> {
        self.exprs.clear();
        self.models.clear();
        SqlParser::new(sql, &mut self.exprs, &mut self.models)
            .with_index_block_size(self.ctx.config().index_value_block_size)
            .parse()
    }

    fn optimize(&mut self, catalog: &dyn Catalog, model: ModelId) -> Result<ModelId> {
        let config = self.ctx.config().clone();
        let mut cx = OptimizerContext::new(&mut self.exprs, &mut self.models, catalog, &config);
        self.optimizer.optimize(&mut cx, model)
    }

    fn generate(&mut self, catalog: &dyn Catalog, model: ModelId) -> Result<Box<dyn RecordCursorFactory>> {
        let model = self.optimize(catalog, model)?;
        CodeGenerator::new(&mut self.exprs, &self.models, catalog, &self.registry, &self.ctx).generate(model)
    }

    /// Renders the optimized model of a query, as in
    /// `select-choose a from (t where a > 1)`.
    pub fn explain(&mut self, catalog: &dyn Catalog, sql: &str) -> Result<String> {
        let Statement::Query(model) = self.parse(sql)? else {
            return Err(Error::unsupported("only queries can be explained"));
        };
        let model = self.optimize(catalog, model)?;
        Ok(to_sink(&self.models, &self.exprs, model))
    }

    /// Compiles a query into a cursor factory.
    pub fn compile(&mut self, catalog: &dyn Catalog, sql: &str) -> Result<Box<dyn RecordCursorFactory>> {
        match self.parse(sql)? {
            Statement::Query(model) => {
                let factory = self.generate(catalog, model)?;
                debug!(factory = factory.name(), "query compiled");
                Ok(factory)
            }
            _ => Err(Error::unsupported("statement is not a query")),
        }
    }

    /// Compiles any statement and applies DDL to `engine`.
    pub fn execute(&mut self, engine: &mut MemoryEngine, sql: &str) -> Result<CompiledStatement> {
        match self.parse(sql)? {
            Statement::Query(model) => Ok(CompiledStatement::Select(self.generate(&*engine, model)?)),
            Statement::CreateTable(create) => self.create_table(engine, &create),
            Statement::RenameTable(rename) => {
                engine.rename_table(&rename.from, &rename.to)?;
                Ok(CompiledStatement::RenameTable {
                    from: rename.from,
                    to: rename.to,
                })
            }
        }
    }

    fn create_table(&mut self, engine: &mut MemoryEngine, create: &CreateTableModel) -> Result<CompiledStatement> {
        if engine.has_table(&create.name) {
            return Err(Error::parse(create.name_position, "table already exists"));
        }
        let source = match create.query {
            Some(query) => Some(self.generate(&*engine, query)?),
            None => None,
        };
        let schema = create.to_schema(source.as_ref().map(|f| f.metadata() as &dyn RecordMetadata))?;
        engine.create_table(schema)?;

        let mut rows = 0;
        if let Some(source) = source {
            for row in collect_rows(source.as_ref())? {
                engine.append(&create.name, row)?;
                rows += 1;
            }
        }
        debug!(table = create.name.as_str(), rows, "table created");
        Ok(CompiledStatement::CreateTable {
            name: create.name.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{plan, print};
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use strata_core::Value;

    fn select(compiler: &mut SqlCompiler, engine: &mut MemoryEngine, sql: &str) -> Vec<Vec<Value>> {
        match compiler.execute(engine, sql).unwrap() {
            CompiledStatement::Select(factory) => collect_rows(factory.as_ref()).unwrap(),
            _ => panic!("not a query: {}", sql),
        }
    }

    fn populated() -> (SqlCompiler, MemoryEngine) {
        let mut compiler = SqlCompiler::default();
        let mut engine = MemoryEngine::new();
        compiler
            .execute(
                &mut engine,
                "create table tab (x INT, s SYMBOL index, ts TIMESTAMP) timestamp(ts) partition by DAY",
            )
            .unwrap();
        for (i, s) in ["a", "b", "a"].iter().enumerate() {
            let row = vec![Value::Int(i as i32), Value::from(*s), Value::Timestamp(i as i64)];
            engine.append("tab", row).unwrap();
        }
        (compiler, engine)
    }

    #[test]
    fn test_create_and_query() {
        let (mut compiler, mut engine) = populated();
        let rows = select(&mut compiler, &mut engine, "select x from tab where s = 'a'");
        assert_eq!(rows, [vec![Value::Int(0)], vec![Value::Int(2)]]);
    }

    #[test]
    fn test_create_table_as_select() {
        let (mut compiler, mut engine) = populated();
        let created = compiler
            .execute(&mut engine, "create table copy as (select x, ts from tab where x > 0) timestamp(ts)")
            .unwrap();
        match created {
            CompiledStatement::CreateTable { name, rows } => {
                assert_eq!(name, "copy");
                assert_eq!(rows, 2);
            }
            _ => panic!("expected create table"),
        }
        let rows = select(&mut compiler, &mut engine, "select x from copy");
        assert_eq!(rows, [vec![Value::Int(1)], vec![Value::Int(2)]]);
    }

    #[test]
    fn test_rename_table() {
        let (mut compiler, mut engine) = populated();
        compiler.execute(&mut engine, "rename table tab to tab2").unwrap();
        assert!(engine.has_table("tab2"));
        assert!(compiler.compile(&engine, "select x from tab").is_err());
        assert_eq!(select(&mut compiler, &mut engine, "select x from tab2").len(), 3);
    }

    #[test]
    fn test_duplicate_table() {
        let (mut compiler, mut engine) = populated();
        let err = compiler
            .execute(&mut engine, "create table tab (y INT)")
            .err()
            .unwrap();
        assert_eq!(err.position(), Some(13));
    }

    #[test]
    fn test_explain_and_plan() {
        let (mut compiler, engine) = populated();
        let model = compiler.explain(&engine, "select x from tab where x > 1").unwrap();
        assert!(model.starts_with("select-choose x from (tab"), "{}", model);
        assert!(model.contains("where x > 1"), "{}", model);
        let factory = compiler.compile(&engine, "select x from tab where s = 'b'").unwrap();
        assert!(plan(factory.as_ref()).contains("SymbolIndex"));
        assert_eq!(print(factory.as_ref()).unwrap(), "x\n1\n".to_string());
    }

    #[test]
    fn test_ddl_is_not_a_query() {
        let (mut compiler, engine) = populated();
        assert!(compiler.compile(&engine, "rename table tab to t").is_err());
        assert!(compiler.explain(&engine, "create table q (a INT)").is_err());
    }
}
