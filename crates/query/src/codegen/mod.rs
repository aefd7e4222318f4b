//! Turns optimized query models into record cursor factories.
//!
//! Generation walks a model tree bottom-up. A table model becomes a data
//! frame scan narrowed by the intervals and index keys its WHERE clause
//! implies, or a latest-by scan, with the residual filter on top. Join
//! parents chain their members in execution order. Every select layer then
//! adds its projection, aggregation or window stage, followed by `order by`
//! and `limit`.
//!
//! Sub-queries used as filter operands, as in `sym in (select ...)`, run
//! once while their filter is generated; the filter sees their first column
//! as a list of values.

use crate::ast::{column_name, ExprArena, NodeId, NodeKind};
use crate::context::SqlExecutionContext;
use crate::cursor::{
    collect_rows, AnalyticColumn, AnalyticKind, AnalyticOutput, AnalyticRecordCursorFactory, CursorMetadata,
    DataFrameRecordCursorFactory, EmptyRecord, EmptyTableRecordCursorFactory, FilteredRecordCursorFactory,
    GroupByRecordCursorFactory, GroupColumn, JoinKind, JoinRecordCursorFactory, LatestByIndexedRecordCursorFactory,
    LatestByValueRecordCursorFactory, LimitRecordCursorFactory, RecordCursorFactory, RowSource,
    SampleByRecordCursorFactory, Sampler, SelectedRecordCursorFactory, SortKey, SortedRecordCursorFactory,
    VirtualRecordCursorFactory,
};
use crate::function::{
    is_aggregate, AggregateFunction, Constant, FunctionCompiler, FunctionRef, FunctionRegistry, LambdaValues,
};
use crate::model::{
    IntrinsicModel, IntrinsicValue, JoinType, ModelArena, ModelId, QueryModel, SelectModelType, SortOrder,
};
use crate::optimizer::QueryFilterAnalyser;
use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use strata_core::reader::{Catalog, TableReader};
use strata_core::schema::RecordMetadata;
use strata_core::{DataType, Error, Result, Value};
use tracing::{debug, trace};

type FactoryRef = Box<dyn RecordCursorFactory>;

/// Builds the cursor factory of an optimized model tree.
pub struct CodeGenerator<'a> {
    exprs: &'a mut ExprArena,
    models: &'a ModelArena,
    catalog: &'a dyn Catalog,
    registry: &'a FunctionRegistry,
    ctx: &'a SqlExecutionContext,
    analyser: QueryFilterAnalyser,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        exprs: &'a mut ExprArena,
        models: &'a ModelArena,
        catalog: &'a dyn Catalog,
        registry: &'a FunctionRegistry,
        ctx: &'a SqlExecutionContext,
    ) -> Self {
        Self {
            exprs,
            models,
            catalog,
            registry,
            ctx,
            analyser: QueryFilterAnalyser::new(),
        }
    }

    /// Generates the factory of `id` and everything below it.
    pub fn generate(&mut self, id: ModelId) -> Result<FactoryRef> {
        let models = self.models;
        let model = &models[id];

        let mut factory = if model.ordered_join_models.len() > 1 {
            self.join(id)?
        } else {
            self.source(id)?
        };
        // non-deterministic constant filters such as `rnd_int() > 5` stay row filters
        if let Some(w) = model.const_where {
            factory = self.filtered(factory, w)?;
        }
        factory = self.select(model, factory)?;
        factory = self.order_by(model, factory)?;
        factory = self.limit(model, factory)?;
        debug!(model = id.index(), factory = factory.name(), "generated");
        Ok(factory)
    }

    /// Rows of a table or of a nested query, filtered by the model's WHERE clause.
    fn source(&mut self, id: ModelId) -> Result<FactoryRef> {
        let models = self.models;
        let model = &models[id];
        if model.table_name.is_some() {
            return self.table(id);
        }
        let Some(nested) = model.nested else {
            return Err(Error::unsupported("query without a table or a sub-query"));
        };
        let base = self.generate(nested)?;
        match model.where_clause {
            Some(w) => self.filtered(base, w),
            None => Ok(base),
        }
    }

    /// Runs the sub-queries below `node` and keeps the first column of each.
    fn lambdas(&mut self, node: NodeId) -> Result<LambdaValues> {
        let mut values = LambdaValues::default();
        let lambdas: Vec<(NodeId, ModelId)> = self
            .exprs
            .post_order(node)
            .into_iter()
            .filter(|&n| self.exprs[n].kind == NodeKind::Lambda)
            .filter_map(|n| self.exprs[n].query.map(|q| (n, q)))
            .collect();
        for (lambda, query) in lambdas {
            let factory = self.generate(query)?;
            let column: Vec<Value> = collect_rows(factory.as_ref())?
                .into_iter()
                .map(|mut row| if row.is_empty() { Value::Null } else { row.swap_remove(0) })
                .collect();
            trace!(rows = column.len(), "sub-query executed");
            values.insert(lambda, column);
        }
        Ok(values)
    }

    fn compile(&mut self, node: NodeId, metadata: &CursorMetadata) -> Result<FunctionRef> {
        let lambdas = self.lambdas(node)?;
        FunctionCompiler::new(self.registry, self.ctx)
            .with_lambda_values(&lambdas)
            .compile(self.exprs, node, metadata)
    }

    fn compile_aggregate(&mut self, node: NodeId, metadata: &CursorMetadata) -> Result<AggregateFunction> {
        let lambdas = self.lambdas(node)?;
        FunctionCompiler::new(self.registry, self.ctx)
            .with_lambda_values(&lambdas)
            .compile_aggregate(self.exprs, node, metadata)
    }

    /// Wraps `base` in a filter. Constant filters resolve here.
    fn filtered(&mut self, base: FactoryRef, node: NodeId) -> Result<FactoryRef> {
        let metadata = base.metadata().clone();
        match self.filter_function(node, &metadata)? {
            Compiled::True => Ok(base),
            Compiled::False => Ok(Box::new(EmptyTableRecordCursorFactory::new(metadata))),
            Compiled::Function(f) => Ok(Box::new(FilteredRecordCursorFactory::new(base, f))),
        }
    }

    fn filter_function(&mut self, node: NodeId, metadata: &CursorMetadata) -> Result<Compiled> {
        let filter = self.compile(node, metadata)?;
        if filter.data_type() != DataType::Boolean {
            return Err(Error::parse(
                self.exprs[node].position,
                "boolean expression expected",
            ));
        }
        if filter.is_constant() {
            let pass = filter.get_bool(&EmptyRecord);
            return Ok(if pass { Compiled::True } else { Compiled::False });
        }
        Ok(Compiled::Function(filter))
    }

    fn table(&mut self, id: ModelId) -> Result<FactoryRef> {
        let models = self.models;
        let model = &models[id];
        let Some(table_node) = model.table_name else {
            return Err(Error::unsupported("not a table model"));
        };
        let (table_name, position) = {
            let n = &self.exprs[table_node];
            (n.token.clone(), n.position)
        };
        let reader = self
            .catalog
            .table(&table_name)
            .ok_or_else(|| Error::invalid_table(position))?;
        let metadata = CursorMetadata::from_metadata(reader.schema());
        let designated = metadata.timestamp_index();

        let latest = match model.latest_by {
            Some(node) => {
                let n = &self.exprs[node];
                Some(metadata.resolve(&n.token, n.position)?)
            }
            None => None,
        };
        let latest_name = latest.map(|i| metadata.column_name(i).to_string());

        let mut intrinsic = match model.where_clause {
            Some(w) => {
                // intervals apply to the designated timestamp only
                let timestamp = match model.timestamp {
                    Some(ts) => {
                        let n = &self.exprs[ts];
                        let index = metadata.resolve(&n.token, n.position)?;
                        designated.filter(|&d| d == index)
                    }
                    None => designated,
                };
                self.analyser.extract(
                    self.exprs,
                    model,
                    w,
                    reader.schema(),
                    latest_name.as_deref(),
                    timestamp,
                )?
            }
            None => IntrinsicModel::new(),
        };
        trace!(
            table = table_name.as_str(),
            key = ?intrinsic.key_column,
            keys = intrinsic.key_values.len(),
            intervals = ?intrinsic.intervals.as_ref().map(Vec::len),
            "intrinsic model"
        );

        if intrinsic.intrinsic_value == IntrinsicValue::False {
            return Ok(Box::new(EmptyTableRecordCursorFactory::new(metadata)));
        }

        if intrinsic.key_values_is_lambda {
            if let Some(lambda) = intrinsic.key_values_lambda {
                intrinsic.key_values = self.lambda_keys(lambda)?;
            }
        }

        let filter = intrinsic.filter;

        if let Some(latest) = latest {
            return self.latest_by(reader, metadata, latest, intrinsic, filter);
        }

        let filter = match filter {
            Some(f) => match self.filter_function(f, &metadata)? {
                Compiled::True => None,
                Compiled::False => return Ok(Box::new(EmptyTableRecordCursorFactory::new(metadata))),
                Compiled::Function(f) => Some(f),
            },
            None => None,
        };

        let source = match intrinsic.key_column.as_deref() {
            Some(key) => {
                let column = metadata.resolve(key, position)?;
                RowSource::SymbolIndex {
                    column,
                    keys: intrinsic.key_values,
                }
            }
            None => RowSource::All,
        };
        debug!(table = table_name.as_str(), source = ?source, "data frame");
        let frame: FactoryRef = Box::new(DataFrameRecordCursorFactory::new(reader, intrinsic.intervals, source));
        Ok(match filter {
            Some(f) => Box::new(FilteredRecordCursorFactory::new(frame, f)),
            None => frame,
        })
    }

    fn latest_by(
        &mut self,
        reader: Rc<dyn TableReader>,
        metadata: CursorMetadata,
        column: usize,
        intrinsic: IntrinsicModel,
        filter: Option<NodeId>,
    ) -> Result<FactoryRef> {
        if reader.schema().is_indexed(column) {
            let keys = match intrinsic.key_column.as_deref() {
                Some(key) if key.eq_ignore_ascii_case(metadata.column_name(column)) => Some(intrinsic.key_values),
                _ => None,
            };
            let filter = self.residual(filter, &metadata)?;
            let Some(filter) = filter else {
                return Ok(Box::new(EmptyTableRecordCursorFactory::new(metadata)));
            };
            return Ok(Box::new(LatestByIndexedRecordCursorFactory::new(
                reader,
                column,
                intrinsic.intervals,
                keys,
                filter,
            )));
        }

        let name = metadata.column_name(column).to_string();
        let (value, filter) = match filter {
            Some(f) => self.latest_value(f, &name),
            None => (None, None),
        };
        let filter = self.residual(filter, &metadata)?;
        let Some(filter) = filter else {
            return Ok(Box::new(EmptyTableRecordCursorFactory::new(metadata)));
        };
        Ok(Box::new(LatestByValueRecordCursorFactory::new(
            reader,
            column,
            intrinsic.intervals,
            value,
            filter,
        )))
    }

    /// Compiles an optional residual filter. The outer None means no row can pass.
    fn residual(&mut self, filter: Option<NodeId>, metadata: &CursorMetadata) -> Result<Option<Option<FunctionRef>>> {
        match filter {
            None => Ok(Some(None)),
            Some(f) => match self.filter_function(f, metadata)? {
                Compiled::True => Ok(Some(None)),
                Compiled::False => Ok(None),
                Compiled::Function(f) => Ok(Some(Some(f))),
            },
        }
    }

    /// Splits `column = constant` off a residual filter.
    fn latest_value(&mut self, filter: NodeId, column: &str) -> (Option<Value>, Option<NodeId>) {
        let conjuncts = self.exprs.conjuncts(filter);
        for (i, &c) in conjuncts.iter().enumerate() {
            let n = &self.exprs[c];
            if n.kind != NodeKind::Operation || n.param_count != 2 || !n.is("=") {
                continue;
            }
            let (Some(lhs), Some(rhs)) = (n.lhs, n.rhs) else {
                continue;
            };
            let (literal, constant) = match (self.exprs[lhs].kind, self.exprs[rhs].kind) {
                (NodeKind::Literal, NodeKind::Constant) => (lhs, rhs),
                (NodeKind::Constant, NodeKind::Literal) => (rhs, lhs),
                _ => continue,
            };
            if !column_name(self.exprs.token(literal)).eq_ignore_ascii_case(column) {
                continue;
            }
            let value = match Constant::parse(self.exprs.token(constant), self.exprs[constant].position) {
                Ok(c) if !c.value().is_null() => c.value().clone(),
                _ => continue,
            };
            let mut rest = None;
            for (k, &other) in conjuncts.iter().enumerate() {
                if k != i {
                    rest = Some(self.exprs.concat_and(rest, other));
                }
            }
            return (Some(value), rest);
        }
        (None, Some(filter))
    }

    fn lambda_keys(&mut self, lambda: NodeId) -> Result<Vec<Option<String>>> {
        let Some(query) = self.exprs[lambda].query else {
            return Ok(Vec::new());
        };
        let factory = self.generate(query)?;
        let mut keys: Vec<Option<String>> = Vec::new();
        for row in collect_rows(factory.as_ref())? {
            let key = match row.into_iter().next() {
                None | Some(Value::Null) => None,
                Some(v) => Some(v.to_string()),
            };
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn member_name(&self, id: ModelId) -> String {
        self.models[id].name(self.exprs).unwrap_or_default().to_string()
    }

    fn join(&mut self, id: ModelId) -> Result<FactoryRef> {
        let models = self.models;
        let model = &models[id];
        let ordered = &model.ordered_join_models;

        let first = model.join_models[ordered[0]];
        let mut factory = self.source(first)?;
        let mut metadata = prefixed(&CursorMetadata::new(), factory.metadata(), &self.member_name(first));
        metadata.set_timestamp_index(factory.metadata().timestamp_index());

        for &index in &ordered[1..] {
            let member_id = model.join_models[index];
            let member = &models[member_id];
            let position = member.table_name.or(member.alias).map_or(0, |n| self.exprs[n].position);
            let slave = self.source(member_id)?;
            let slave_name = self.member_name(member_id);

            let mut master_keys = Vec::new();
            let mut slave_keys = Vec::new();
            if let Some(jc) = &member.context {
                for k in 0..jc.a_names.len() {
                    slave_keys.push(slave.metadata().resolve(&jc.a_names[k], position)?);
                    let parent = self.member_name(model.join_models[jc.b_indexes[k]]);
                    master_keys.push(metadata.resolve(&format!("{}.{}", parent, jc.b_names[k]), position)?);
                }
            }

            let kind = match member.join_type {
                JoinType::Inner if master_keys.is_empty() => JoinKind::Cross,
                JoinType::Inner => JoinKind::Inner,
                JoinType::Outer => JoinKind::Outer,
                JoinType::Cross => JoinKind::Cross,
                JoinType::Asof => {
                    let master_ts = metadata
                        .timestamp_index()
                        .ok_or_else(|| Error::parse(position, "left side of time series join has no timestamp"))?;
                    let slave_ts = slave
                        .metadata()
                        .timestamp_index()
                        .ok_or_else(|| Error::parse(position, "right side of time series join has no timestamp"))?;
                    JoinKind::AsOf { master_ts, slave_ts }
                }
            };

            let mut joined = prefixed(&metadata, slave.metadata(), &slave_name);
            joined.set_timestamp_index(metadata.timestamp_index());
            let filter = match member.post_join_where {
                Some(w) => match self.filter_function(w, &joined)? {
                    Compiled::True => None,
                    Compiled::False if matches!(kind, JoinKind::Inner | JoinKind::Cross) => {
                        return Ok(Box::new(EmptyTableRecordCursorFactory::new(joined)));
                    }
                    Compiled::False => Some(Constant::new(Value::Boolean(false), DataType::Boolean).boxed()),
                    Compiled::Function(f) => Some(f),
                },
                None => None,
            };
            debug!(
                member = slave_name.as_str(),
                kind = ?kind,
                keys = master_keys.len(),
                "join"
            );
            factory = Box::new(JoinRecordCursorFactory::new(
                factory,
                slave,
                kind,
                master_keys,
                slave_keys,
                joined.clone(),
                filter,
            ));
            metadata = joined;
        }

        match model.post_join_where {
            Some(w) => self.filtered(factory, w),
            None => Ok(factory),
        }
    }

    fn select(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        match model.select_model_type {
            SelectModelType::None => Ok(base),
            SelectModelType::Choose => self.choose(model, base),
            SelectModelType::Virtual => self.virtual_columns(model, base),
            SelectModelType::GroupBy => self.group_by(model, base),
            SelectModelType::Analytic => self.analytic(model, base),
        }
    }

    fn choose(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        let mut columns = Vec::with_capacity(model.columns.len());
        let mut names = Vec::with_capacity(model.columns.len());
        for column in &model.columns {
            let n = &self.exprs[column.ast];
            if n.kind != NodeKind::Literal {
                return self.virtual_columns(model, base);
            }
            columns.push(base.metadata().resolve(&n.token, n.position)?);
            names.push(column.alias.clone());
        }
        let identity = columns.iter().enumerate().all(|(i, &c)| i == c)
            && columns.len() == base.metadata().len()
            && names.iter().zip(base.metadata().names()).all(|(a, b)| a == b);
        if identity {
            return Ok(base);
        }
        Ok(Box::new(SelectedRecordCursorFactory::new(base, columns, names)))
    }

    fn virtual_columns(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        let base_metadata = base.metadata().clone();
        let base_ts = base_metadata.timestamp_index();
        let mut metadata = CursorMetadata::new();
        let mut functions = Vec::with_capacity(model.columns.len());
        for (i, column) in model.columns.iter().enumerate() {
            let n = &self.exprs[column.ast];
            if n.kind == NodeKind::Literal && base_ts.is_some() {
                let index = base_metadata.resolve(&n.token, n.position)?;
                if Some(index) == base_ts {
                    metadata.set_timestamp_index(Some(i));
                }
            }
            let function = self.compile(column.ast, &base_metadata)?;
            metadata.add(column.alias.clone(), function.data_type());
            functions.push(function);
        }
        Ok(Box::new(VirtualRecordCursorFactory::new(base, metadata, functions)))
    }

    fn group_by(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        let base_metadata = base.metadata().clone();
        let sampling = match model.sample_by {
            Some(node) => {
                let n = &self.exprs[node];
                let sampler = Sampler::parse(&n.token, n.position)?;
                let timestamp = match model.timestamp {
                    Some(ts) => {
                        let t = &self.exprs[ts];
                        base_metadata.resolve(&t.token, t.position)?
                    }
                    None => base_metadata
                        .timestamp_index()
                        .ok_or_else(|| Error::parse(n.position, "base query does not provide dedicated TIMESTAMP column"))?,
                };
                Some((sampler, timestamp))
            }
            None => None,
        };

        let mut metadata = CursorMetadata::new();
        let mut keys = Vec::new();
        let mut aggregates = Vec::new();
        let mut columns = Vec::with_capacity(model.columns.len());
        for (i, column) in model.columns.iter().enumerate() {
            let n = &self.exprs[column.ast];
            if n.kind == NodeKind::Function && is_aggregate(&n.token) {
                let aggregate = self.compile_aggregate(column.ast, &base_metadata)?;
                metadata.add(column.alias.clone(), aggregate.data_type());
                columns.push(GroupColumn::Aggregate(aggregates.len()));
                aggregates.push(aggregate);
                continue;
            }
            if let Some((_, timestamp)) = sampling {
                if n.kind == NodeKind::Literal && base_metadata.resolve(&n.token, n.position)? == timestamp {
                    metadata.add(column.alias.clone(), DataType::Timestamp);
                    metadata.set_timestamp_index(Some(i));
                    columns.push(GroupColumn::Timestamp);
                    continue;
                }
            }
            let key = self.compile(column.ast, &base_metadata)?;
            metadata.add(column.alias.clone(), key.data_type());
            columns.push(GroupColumn::Key(keys.len()));
            keys.push(key);
        }

        Ok(match sampling {
            Some((sampler, timestamp)) => Box::new(SampleByRecordCursorFactory::new(
                base, metadata, timestamp, sampler, keys, aggregates, columns,
            )),
            None => Box::new(GroupByRecordCursorFactory::new(base, metadata, keys, aggregates, columns)),
        })
    }

    fn analytic(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        let base_metadata = base.metadata().clone();
        let mut metadata = CursorMetadata::new();
        let mut analytic = Vec::new();
        let mut outputs = Vec::with_capacity(model.columns.len());
        for column in &model.columns {
            let (kind, token, position) = {
                let n = &self.exprs[column.ast];
                (n.kind, n.token.clone(), n.position)
            };
            let Some(spec) = &column.analytic else {
                if kind != NodeKind::Literal {
                    return Err(Error::unsupported("expression next to a window function"));
                }
                let index = base_metadata.resolve(&token, position)?;
                metadata.add(column.alias.clone(), base_metadata.column_type(index));
                outputs.push(AnalyticOutput::Base(index));
                continue;
            };
            let analytic_kind = AnalyticKind::from_name(&token)
                .ok_or_else(|| Error::signature(position, format!("not a window function: {}", token)))?;
            let aggregate = match analytic_kind {
                AnalyticKind::Aggregate(_) => Some(self.compile_aggregate(column.ast, &base_metadata)?),
                _ => None,
            };
            let mut partition_by = Vec::with_capacity(spec.partition_by.len());
            for &node in &spec.partition_by {
                partition_by.push(self.compile(node, &base_metadata)?);
            }
            let mut order_by = Vec::with_capacity(spec.order_by.len());
            for &(node, order) in &spec.order_by {
                order_by.push((self.compile(node, &base_metadata)?, order == SortOrder::Desc));
            }
            let data_type = aggregate.as_ref().map_or(DataType::Long, AggregateFunction::data_type);
            metadata.add(column.alias.clone(), data_type);
            outputs.push(AnalyticOutput::Analytic(analytic.len()));
            analytic.push(AnalyticColumn {
                kind: analytic_kind,
                aggregate,
                partition_by,
                order_by,
            });
        }
        Ok(Box::new(AnalyticRecordCursorFactory::new(base, metadata, analytic, outputs)))
    }

    fn order_by(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        if model.order_by.is_empty() {
            return Ok(base);
        }
        let mut keys = Vec::with_capacity(model.order_by.len());
        for (&node, &direction) in model.order_by.iter().zip(&model.order_by_direction) {
            let n = &self.exprs[node];
            keys.push(SortKey {
                column: base.metadata().resolve(&n.token, n.position)?,
                descending: direction == SortOrder::Desc,
            });
        }
        let capacity = self.ctx.config().sort_key_capacity;
        Ok(Box::new(SortedRecordCursorFactory::new(base, keys, capacity)))
    }

    fn limit(&mut self, model: &QueryModel, base: FactoryRef) -> Result<FactoryRef> {
        let Some(lo) = model.limit_lo else {
            return Ok(base);
        };
        let lo = self.integer(lo)?;
        let hi = match model.limit_hi {
            Some(hi) => Some(self.integer(hi)?),
            None => None,
        };
        Ok(Box::new(LimitRecordCursorFactory::new(base, lo, hi)))
    }

    fn integer(&mut self, node: NodeId) -> Result<i64> {
        let position = self.exprs[node].position;
        let function = self.compile(node, &CursorMetadata::new())?;
        if !function.is_constant() {
            return Err(Error::parse(position, "constant expression expected"));
        }
        function
            .eval(&EmptyRecord)
            .to_i64()
            .ok_or_else(|| Error::parse(position, "integer expected"))
    }
}

enum Compiled {
    True,
    False,
    Function(FunctionRef),
}

/// Appends the columns of `member` to a copy of `base`, named `alias.column`.
fn prefixed(base: &CursorMetadata, member: &CursorMetadata, alias: &str) -> CursorMetadata {
    let mut out = base.clone();
    for i in 0..member.len() {
        out.add(format!("{}.{}", alias, member.column_name(i)), member.column_type(i));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::plan;
    use crate::optimizer::test_support::{compile, create_table};
    use crate::optimizer::SqlOptimizer;
    use alloc::vec;
    use strata_core::schema::TableSchemaBuilder;
    use strata_storage::MemoryEngine;

    const HOUR: i64 = 3_600_000_000;

    /// `trades(sym SYMBOL indexed, price DOUBLE, qty INT, ts TIMESTAMP)` with
    /// one trade per hour, and a plain `syms(name SYMBOL, rank INT)`.
    fn engine() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        let schema = TableSchemaBuilder::new("trades")
            .unwrap()
            .add_indexed("sym", DataType::Symbol, 4)
            .unwrap()
            .add_column("price", DataType::Double)
            .unwrap()
            .add_column("qty", DataType::Int)
            .unwrap()
            .add_column("ts", DataType::Timestamp)
            .unwrap()
            .timestamp("ts")
            .build()
            .unwrap();
        engine.create_table(schema).unwrap();
        let trades = [("A", 1.0, 10), ("B", 2.0, 20), ("A", 3.0, 30), ("C", 4.0, 40), ("B", 5.0, 50)];
        for (i, (sym, price, qty)) in trades.iter().enumerate() {
            let row = vec![
                Value::from(*sym),
                Value::Double(*price),
                Value::Int(*qty),
                Value::Timestamp(i as i64 * HOUR),
            ];
            engine.append("trades", row).unwrap();
        }

        create_table(&mut engine, "syms", "name SYMBOL, rank INT", None);
        for (name, rank) in [("A", 1), ("B", 2), ("D", 4)] {
            engine.append("syms", vec![Value::from(name), Value::Int(rank)]).unwrap();
        }
        engine
    }

    fn generate(engine: &MemoryEngine, sql: &str) -> Result<FactoryRef> {
        let (mut exprs, models, model) = compile(engine, &SqlOptimizer::new(), sql)?;
        let registry = FunctionRegistry::builtin();
        let ctx = SqlExecutionContext::default();
        CodeGenerator::new(&mut exprs, &models, engine, &registry, &ctx).generate(model)
    }

    fn rows(sql: &str) -> Vec<Vec<Value>> {
        let engine = engine();
        let factory = generate(&engine, sql).unwrap();
        collect_rows(factory.as_ref()).unwrap()
    }

    fn doubles(sql: &str) -> Vec<f64> {
        rows(sql).into_iter().map(|r| r[0].to_f64().unwrap()).collect()
    }

    fn longs(sql: &str, column: usize) -> Vec<i64> {
        rows(sql).into_iter().map(|r| r[column].to_i64().unwrap()).collect()
    }

    #[test]
    fn test_index_lookup() {
        let engine = engine();
        let factory = generate(&engine, "select price from trades where sym = 'A' and price > 1").unwrap();
        assert!(plan(factory.as_ref()).contains("Filter"));
        assert_eq!(doubles("select price from trades where sym = 'A'"), [1.0, 3.0]);
        assert_eq!(doubles("select price from trades where sym = 'A' and price > 1"), [3.0]);
    }

    #[test]
    fn test_constant_filters() {
        let engine = engine();
        let factory = generate(&engine, "select price from trades where 1 = 2").unwrap();
        assert!(plan(factory.as_ref()).contains("Empty"));
        let factory = generate(&engine, "select price from trades where ts in ('1970-01-02', '1970-01-01')").unwrap();
        assert!(plan(factory.as_ref()).contains("Empty"));
        assert!(rows("select price from trades where price > 10").is_empty());
        assert_eq!(doubles("select price from trades where 1 = 1").len(), 5);
    }

    #[test]
    fn test_latest_by() {
        let latest = rows("select sym, price from trades latest by sym");
        let pairs: Vec<(String, f64)> = latest
            .into_iter()
            .map(|r| (r[0].to_string(), r[1].to_f64().unwrap()))
            .collect();
        assert_eq!(
            pairs,
            [("A".to_string(), 3.0), ("C".to_string(), 4.0), ("B".to_string(), 5.0)]
        );
    }

    #[test]
    fn test_latest_by_key_uses_index() {
        let engine = engine();
        let factory = generate(&engine, "select sym, price from trades latest by sym where sym = 'B'").unwrap();
        assert!(plan(factory.as_ref()).contains("LatestByIndexed"));
        let latest = collect_rows(factory.as_ref()).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0][0].to_string(), "B");
        assert_eq!(latest[0][1], Value::Double(5.0));

        let factory = generate(&engine, "select name from syms latest by name where name = 'B'").unwrap();
        assert!(plan(factory.as_ref()).contains("LatestByValue"));
        let latest = collect_rows(factory.as_ref()).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0][0].to_string(), "B");
    }

    #[test]
    fn test_sub_query_keys() {
        assert_eq!(
            doubles("select price from trades where sym in (select name from syms)"),
            [1.0, 2.0, 3.0, 5.0]
        );
    }

    #[test]
    fn test_group_by() {
        let groups = rows("select sym, sum(qty) from trades");
        let sums: Vec<(String, i64)> = groups
            .into_iter()
            .map(|r| (r[0].to_string(), r[1].to_i64().unwrap()))
            .collect();
        assert_eq!(
            sums,
            [("A".to_string(), 40), ("B".to_string(), 70), ("C".to_string(), 40)]
        );
    }

    #[test]
    fn test_sample_by() {
        let sampled = rows("select sum(qty) from trades sample by 2h");
        assert_eq!(sampled.len(), 3);
        assert_eq!(sampled[1][0], Value::Timestamp(2 * HOUR));
        assert_eq!(longs("select sum(qty) from trades sample by 2h", 1), [30, 70, 50]);
    }

    #[test]
    fn test_order_by_and_limit() {
        assert_eq!(doubles("select price from trades order by price desc limit 2"), [5.0, 4.0]);
        assert_eq!(doubles("select price from trades limit -2"), [4.0, 5.0]);
        assert_eq!(doubles("select price from trades limit 1,3"), [2.0, 3.0]);
    }

    #[test]
    fn test_virtual_columns() {
        assert_eq!(longs("select qty * 2 q from trades where sym = 'C'", 0), [80]);
    }

    #[test]
    fn test_join() {
        let joined = rows("select t.qty, s.rank from trades t join syms s on t.sym = s.name");
        let mut pairs: Vec<(i64, i64)> = joined
            .into_iter()
            .map(|r| (r[0].to_i64().unwrap(), r[1].to_i64().unwrap()))
            .collect();
        pairs.sort();
        assert_eq!(pairs, [(10, 1), (20, 2), (30, 1), (50, 2)]);
    }

    #[test]
    fn test_analytic() {
        assert_eq!(
            longs("select price, row_number() rn over (order by price desc) from trades", 1),
            [5, 4, 3, 2, 1]
        );
    }

    #[test]
    fn test_prefixed_metadata() {
        let mut member = CursorMetadata::new();
        member.add("x", DataType::Int);
        let out = prefixed(&CursorMetadata::new(), &member, "t");
        assert_eq!(out.names().collect::<Vec<_>>(), ["t.x"]);
        assert_eq!(out.resolve("x", 0).unwrap(), 0);
    }
}
