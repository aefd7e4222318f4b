//! Aggregate functions.
//!
//! An [`AggregateFunction`] evaluates its argument per record and folds it
//! into an [`Accumulator`] owned by the group. Nulls are skipped by every
//! aggregate except `count()` without arguments, which counts rows.

use super::signature::describe_call;
use super::FunctionRef;
use crate::cursor::Record;
use alloc::format;
use strata_core::{DataType, Error, Result, Value};

/// Aggregate function kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Sum,
    Count,
    Min,
    Max,
    Avg,
    First,
    Last,
}

impl AggregateKind {
    /// Resolves a function name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        const NAMES: [(&str, AggregateKind); 7] = [
            ("sum", AggregateKind::Sum),
            ("count", AggregateKind::Count),
            ("min", AggregateKind::Min),
            ("max", AggregateKind::Max),
            ("avg", AggregateKind::Avg),
            ("first", AggregateKind::First),
            ("last", AggregateKind::Last),
        ];
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, k)| *k)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Count => "count",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Avg => "avg",
            AggregateKind::First => "first",
            AggregateKind::Last => "last",
        }
    }
}

/// Returns whether `name` is an aggregate function.
pub fn is_aggregate(name: &str) -> bool {
    AggregateKind::from_name(name).is_some()
}

/// A compiled aggregate call.
#[derive(Debug)]
pub struct AggregateFunction {
    kind: AggregateKind,
    arg: Option<FunctionRef>,
    data_type: DataType,
}

impl AggregateFunction {
    /// Validates the argument and derives the result type.
    pub fn new(kind: AggregateKind, arg: Option<FunctionRef>, position: usize) -> Result<Self> {
        let arg_type = arg.as_ref().map(|a| a.data_type());
        let data_type = match (kind, arg_type) {
            (AggregateKind::Count, _) => DataType::Long,
            (_, None) => {
                return Err(Error::signature(
                    position,
                    format!("no signature match: {}()", kind.name()),
                ))
            }
            (AggregateKind::Sum, Some(t)) if t.is_numeric() => match t {
                DataType::Float | DataType::Double => DataType::Double,
                _ => DataType::Long,
            },
            (AggregateKind::Avg, Some(t)) if t.is_numeric() => DataType::Double,
            (AggregateKind::Min | AggregateKind::Max | AggregateKind::First | AggregateKind::Last, Some(t)) => {
                match t {
                    DataType::Byte | DataType::Short => DataType::Int,
                    DataType::Float => DataType::Double,
                    DataType::Symbol => DataType::String,
                    t => t,
                }
            }
            (_, Some(t)) => {
                return Err(Error::signature(
                    position,
                    format!("no signature match: {}", describe_call(kind.name(), core::iter::once(t))),
                ))
            }
        };
        Ok(Self {
            kind,
            arg,
            data_type,
        })
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Creates the per-group state.
    pub fn accumulator(&self) -> Accumulator {
        match self.kind {
            AggregateKind::Count => Accumulator::Count(0),
            AggregateKind::Sum if self.data_type == DataType::Double => Accumulator::SumDouble(None),
            AggregateKind::Sum => Accumulator::SumLong(None),
            AggregateKind::Avg => Accumulator::Avg(0.0, 0),
            AggregateKind::Min => Accumulator::Min(Value::Null),
            AggregateKind::Max => Accumulator::Max(Value::Null),
            AggregateKind::First => Accumulator::First(None),
            AggregateKind::Last => Accumulator::Last(Value::Null),
        }
    }

    /// Folds `record` into `acc`.
    pub fn update(&self, acc: &mut Accumulator, record: &dyn Record) {
        match &self.arg {
            Some(arg) => acc.update(arg.eval(record)),
            None => acc.update(Value::Boolean(true)),
        }
    }
}

/// Running state of one aggregate within one group.
#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    Count(i64),
    SumLong(Option<i64>),
    SumDouble(Option<f64>),
    Avg(f64, i64),
    Min(Value),
    Max(Value),
    First(Option<Value>),
    Last(Value),
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Double(d) => d.is_nan(),
        _ => false,
    }
}

impl Accumulator {
    pub fn update(&mut self, value: Value) {
        if let Accumulator::First(first @ None) = self {
            *first = Some(value);
            return;
        }
        if let Accumulator::Last(last) = self {
            *last = value;
            return;
        }
        if is_missing(&value) {
            return;
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::SumLong(sum) => {
                if let Some(v) = value.to_i64() {
                    *sum = Some(sum.unwrap_or(0).wrapping_add(v));
                }
            }
            Accumulator::SumDouble(sum) => {
                if let Some(v) = value.to_f64() {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            Accumulator::Avg(sum, count) => {
                if let Some(v) = value.to_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            Accumulator::Min(cur) => {
                if cur.is_null() || value < *cur {
                    *cur = value;
                }
            }
            Accumulator::Max(cur) => {
                if cur.is_null() || value > *cur {
                    *cur = value;
                }
            }
            Accumulator::First(_) | Accumulator::Last(_) => {}
        }
    }

    /// Final value of the group.
    pub fn result(&self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Long(*n),
            Accumulator::SumLong(sum) => sum.map_or(Value::Null, Value::Long),
            Accumulator::SumDouble(sum) => sum.map_or(Value::Null, Value::Double),
            Accumulator::Avg(_, 0) => Value::Null,
            Accumulator::Avg(sum, count) => Value::Double(sum / *count as f64),
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::Last(v) => v.clone(),
            Accumulator::First(v) => v.clone().unwrap_or(Value::Null),
        }
    }
}
