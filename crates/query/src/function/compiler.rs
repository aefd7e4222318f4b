//! Expression to function tree compilation.
//!
//! Column references resolve against the metadata of the cursor the
//! expression reads from. Calls resolve through the [`FunctionRegistry`];
//! a deterministic call whose arguments are all constant is evaluated once
//! and replaced by its value.
//!
//! `in` and `case` are compiled here rather than through the registry since
//! they take any number of arguments of related types.

use super::constants::is_null_constant;
use super::registry::widening_rank;
use super::{
    is_aggregate, AggregateFunction, AggregateKind, ArgInfo, Constant, Function, FunctionRef,
    FunctionRegistry, RecordColumn,
};
use crate::ast::{ExprArena, NodeId, NodeKind};
use crate::context::SqlExecutionContext;
use crate::cursor::{CursorMetadata, EmptyRecord, Record};
use crate::model::interval::{parse_interval_ex, parse_timestamp, Interval};
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use strata_core::schema::RecordMetadata;
use strata_core::{DataType, Error, Result, Value};
use tracing::trace;

/// Values of sub-queries executed ahead of compilation, keyed by the
/// lambda node they replace.
pub type LambdaValues = HashMap<NodeId, Vec<Value>>;

/// Compiles expressions into functions.
pub struct FunctionCompiler<'a> {
    registry: &'a FunctionRegistry,
    ctx: &'a SqlExecutionContext,
    lambda_values: Option<&'a LambdaValues>,
}

impl<'a> FunctionCompiler<'a> {
    pub fn new(registry: &'a FunctionRegistry, ctx: &'a SqlExecutionContext) -> Self {
        Self {
            registry,
            ctx,
            lambda_values: None,
        }
    }

    /// Supplies the values of pre-executed sub-queries.
    pub fn with_lambda_values(mut self, values: &'a LambdaValues) -> Self {
        self.lambda_values = Some(values);
        self
    }

    /// Compiles the scalar expression rooted at `node`.
    pub fn compile(&self, exprs: &ExprArena, node: NodeId, metadata: &CursorMetadata) -> Result<FunctionRef> {
        let n = &exprs[node];
        match n.kind {
            NodeKind::Literal => {
                if n.token == "*" {
                    return Err(Error::parse(n.position, "'*' is not an expression"));
                }
                let index = metadata.resolve(&n.token, n.position)?;
                Ok(Box::new(RecordColumn::new(index, metadata.column_type(index))))
            }
            NodeKind::Constant => Ok(Constant::parse(&n.token, n.position)?.boxed()),
            NodeKind::Lambda => Err(Error::signature(
                n.position,
                "sub-query is only supported on the right of 'in'",
            )),
            NodeKind::Operation | NodeKind::SetOperation | NodeKind::Function => {
                if n.is("in") {
                    return self.compile_in(exprs, node, metadata);
                }
                if n.is("case") {
                    return self.compile_case(exprs, node, metadata);
                }
                if is_aggregate(&n.token) {
                    return Err(Error::signature(
                        n.position,
                        format!("aggregate function {} is not allowed here", n.token),
                    ));
                }
                let args = exprs
                    .arguments(node)
                    .into_iter()
                    .map(|a| self.compile(exprs, a, metadata))
                    .collect::<Result<Vec<_>>>()?;
                self.call(&n.token, args, n.position)
            }
        }
    }

    /// Compiles an aggregate call such as `sum(x)` or `count()`.
    pub fn compile_aggregate(
        &self,
        exprs: &ExprArena,
        node: NodeId,
        metadata: &CursorMetadata,
    ) -> Result<AggregateFunction> {
        let n = &exprs[node];
        let kind = AggregateKind::from_name(&n.token)
            .ok_or_else(|| Error::signature(n.position, format!("not an aggregate: {}", n.token)))?;
        let args = exprs.arguments(node);
        let arg = match args.as_slice() {
            [] => None,
            [arg] => Some(self.compile(exprs, *arg, metadata)?),
            _ => {
                return Err(Error::signature(
                    n.position,
                    format!("wrong number of arguments [found={},expected=1]", args.len()),
                ))
            }
        };
        AggregateFunction::new(kind, arg, n.position)
    }

    /// Resolves and instantiates `name` over compiled `args`.
    fn call(&self, name: &str, args: Vec<FunctionRef>, position: usize) -> Result<FunctionRef> {
        let info: Vec<ArgInfo> = args
            .iter()
            .map(|a| {
                if is_null_constant(a.as_ref()) {
                    ArgInfo::null()
                } else {
                    ArgInfo::new(a.data_type(), a.is_constant())
                }
            })
            .collect();
        let factory = self.registry.resolve(name, &info, position)?;
        let fold = factory.is_deterministic() && args.iter().all(|a| a.is_constant());
        let function = factory.new_instance(args, position, self.ctx)?;
        if fold {
            trace!(name, "folded constant call");
            return Ok(fold_constant(function.as_ref()));
        }
        Ok(function)
    }

    fn compile_in(&self, exprs: &ExprArena, node: NodeId, metadata: &CursorMetadata) -> Result<FunctionRef> {
        let position = exprs[node].position;
        let args = exprs.arguments(node);
        let (&column, values) = args
            .split_first()
            .ok_or_else(|| Error::parse(position, "too few arguments for 'in'"))?;
        if values.is_empty() {
            return Err(Error::parse(position, "too few arguments for 'in'"));
        }
        let arg = self.compile(exprs, column, metadata)?;

        if let [value] = values {
            if exprs[*value].kind == NodeKind::Lambda {
                let rows = self
                    .lambda_values
                    .and_then(|m| m.get(value))
                    .ok_or_else(|| Error::unsupported("sub-query was not executed"))?;
                return Ok(in_list(arg, rows.iter().cloned()));
            }
        }

        let mut constants = Vec::with_capacity(values.len());
        for &v in values {
            let f = self.compile(exprs, v, metadata)?;
            if !f.is_constant() {
                return Err(Error::signature(exprs[v].position, "constant expected"));
            }
            constants.push(f.eval(&EmptyRecord));
        }

        if arg.data_type() == DataType::Timestamp {
            return timestamp_in(arg, constants, position);
        }
        let f = in_list(arg, constants.into_iter());
        if f.is_constant() {
            return Ok(fold_constant(f.as_ref()));
        }
        Ok(f)
    }

    fn compile_case(&self, exprs: &ExprArena, node: NodeId, metadata: &CursorMetadata) -> Result<FunctionRef> {
        let args = exprs
            .arguments(node)
            .into_iter()
            .map(|a| Ok((a, self.compile(exprs, a, metadata)?)))
            .collect::<Result<Vec<(NodeId, FunctionRef)>>>()?;

        let mut whens = Vec::with_capacity(args.len() / 2);
        let mut otherwise = None;
        let mut iter = args.into_iter();
        while let Some((cond_node, cond)) = iter.next() {
            match iter.next() {
                Some((_, value)) => {
                    if cond.data_type() != DataType::Boolean && !is_null_constant(cond.as_ref()) {
                        return Err(Error::signature(exprs[cond_node].position, "BOOLEAN expected"));
                    }
                    whens.push((cond, value));
                }
                None => otherwise = Some(cond),
            }
        }

        let data_type = case_type(whens.iter().map(|(_, v)| v).chain(otherwise.iter()));
        let constant = whens.iter().all(|(c, v)| c.is_constant() && v.is_constant())
            && otherwise.as_ref().map_or(true, |o| o.is_constant());
        let f: FunctionRef = Box::new(CaseFunction {
            whens,
            otherwise,
            data_type,
        });
        if constant {
            return Ok(fold_constant(f.as_ref()));
        }
        Ok(f)
    }
}

fn fold_constant(f: &dyn Function) -> FunctionRef {
    Constant::new(f.eval(&EmptyRecord), f.data_type()).boxed()
}

/// Widest type among the branch values. Untyped nulls do not count.
fn case_type<'f>(values: impl Iterator<Item = &'f FunctionRef>) -> DataType {
    let widest = values
        .filter(|v| !is_null_constant(v.as_ref()))
        .map(|v| v.data_type())
        .reduce(|acc, t| match (widening_rank(acc), widening_rank(t)) {
            (Some(a), Some(b)) if b > a => t,
            _ => acc,
        });
    match widest {
        Some(DataType::Float) => DataType::Double,
        Some(DataType::Byte | DataType::Short) => DataType::Int,
        Some(t) => t,
        None => DataType::String,
    }
}

fn cast(value: Value, data_type: DataType) -> Value {
    match (data_type, value) {
        (DataType::Long, Value::Int(v)) => Value::Long(v as i64),
        (DataType::Double, v @ (Value::Int(_) | Value::Long(_))) => v.to_f64().map_or(Value::Null, Value::Double),
        (_, v) => v,
    }
}

#[derive(Debug)]
struct CaseFunction {
    whens: Vec<(FunctionRef, FunctionRef)>,
    otherwise: Option<FunctionRef>,
    data_type: DataType,
}

impl Function for CaseFunction {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn eval(&self, record: &dyn Record) -> Value {
        for (cond, value) in &self.whens {
            if cond.get_bool(record) {
                return cast(value.eval(record), self.data_type);
            }
        }
        match &self.otherwise {
            Some(f) => cast(f.eval(record), self.data_type),
            None => Value::Null,
        }
    }
}

/// `x in (v1, v2, ...)` over a hash set of values.
#[derive(Debug)]
struct InList {
    arg: FunctionRef,
    values: HashSet<Value>,
}

impl Function for InList {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn is_constant(&self) -> bool {
        self.arg.is_constant()
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        self.values.contains(&self.arg.eval(record))
    }
}

fn in_list(arg: FunctionRef, values: impl Iterator<Item = Value>) -> FunctionRef {
    Box::new(InList {
        arg,
        values: values.collect(),
    })
}

/// Timestamp membership in a list of intervals.
#[derive(Debug)]
struct InIntervals {
    arg: FunctionRef,
    intervals: Vec<Interval>,
}

impl Function for InIntervals {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        match self.arg.eval(record) {
            Value::Timestamp(ts) => self.intervals.iter().any(|iv| iv.contains(ts)),
            _ => false,
        }
    }
}

/// `ts in ('2020-01')` is an interval, `ts in ('a', 'b')` an inclusive range.
fn timestamp_in(arg: FunctionRef, values: Vec<Value>, position: usize) -> Result<FunctionRef> {
    let intervals = match values.as_slice() {
        [Value::Str(text)] => parse_interval_ex(text, position)?,
        [lo, hi] => {
            let lo = timestamp_of(lo, position)?;
            let hi = timestamp_of(hi, position)?;
            alloc::vec![Interval::new(lo, hi)]
        }
        _ => {
            let mut set = Vec::with_capacity(values.len());
            for v in &values {
                set.push(Value::Timestamp(timestamp_of(v, position)?));
            }
            return Ok(in_list(arg, set.into_iter()));
        }
    };
    Ok(Box::new(InIntervals { arg, intervals }))
}

fn timestamp_of(value: &Value, position: usize) -> Result<i64> {
    match value {
        Value::Str(text) => parse_timestamp(text, position),
        Value::Timestamp(ts) => Ok(*ts),
        v => v.to_i64().ok_or_else(|| Error::invalid_date(position)),
    }
}
