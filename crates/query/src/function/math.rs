//! Numeric functions.

use super::{take, BuiltinFactory, Function, FunctionRef};
use crate::context::SqlExecutionContext;
use crate::cursor::{EmptyRecord, Record};
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::{DataType, Error, Result, Value};

#[derive(Clone, Copy, Debug)]
enum Op {
    Sqrt,
    Floor,
    Ceil,
    Round,
}

#[derive(Debug)]
struct DoubleFunc {
    op: Op,
    arg: FunctionRef,
}

impl Function for DoubleFunc {
    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn eval(&self, record: &dyn Record) -> Value {
        let v = match self.arg.eval(record).to_f64() {
            Some(v) => v,
            None => return Value::Null,
        };
        Value::Double(match self.op {
            Op::Sqrt => libm::sqrt(v),
            Op::Floor => libm::floor(v),
            Op::Ceil => libm::ceil(v),
            Op::Round => libm::round(v),
        })
    }
}

/// `round(value, scale)` with a constant scale.
#[derive(Debug)]
struct RoundScaled {
    arg: FunctionRef,
    factor: f64,
}

impl Function for RoundScaled {
    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn eval(&self, record: &dyn Record) -> Value {
        match self.arg.eval(record).to_f64() {
            Some(v) => Value::Double(libm::round(v * self.factor) / self.factor),
            None => Value::Null,
        }
    }
}

#[derive(Debug)]
struct Abs(FunctionRef);

impl Function for Abs {
    fn data_type(&self) -> DataType {
        self.0.data_type()
    }

    fn eval(&self, record: &dyn Record) -> Value {
        match self.0.eval(record) {
            Value::Int(v) => Value::Int(v.wrapping_abs()),
            Value::Long(v) => Value::Long(v.wrapping_abs()),
            Value::Double(v) => Value::Double(libm::fabs(v)),
            _ => Value::Null,
        }
    }
}

#[derive(Debug)]
struct Power(FunctionRef, FunctionRef);

impl Function for Power {
    fn data_type(&self) -> DataType {
        DataType::Double
    }

    fn eval(&self, record: &dyn Record) -> Value {
        let (b, e) = (self.0.eval(record), self.1.eval(record));
        if b.is_null() || e.is_null() {
            return Value::Null;
        }
        match (b.to_f64(), e.to_f64()) {
            (Some(b), Some(e)) => Value::Double(libm::pow(b, e)),
            _ => Value::Null,
        }
    }
}

fn double_func(op: Op, args: Vec<FunctionRef>, position: usize) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(DoubleFunc { op, arg }))
}

fn round_scaled(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg, scale] = take(args, position)?;
    let scale = scale
        .eval(&EmptyRecord)
        .as_int()
        .filter(|s| (0..=15).contains(s))
        .ok_or_else(|| Error::signature(position, "scale must be between 0 and 15"))?;
    Ok(Box::new(RoundScaled {
        arg,
        factor: libm::pow(10.0, scale as f64),
    }))
}

fn abs(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(Abs(arg)))
}

fn power(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [b, e] = take(args, position)?;
    Ok(Box::new(Power(b, e)))
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    alloc::vec![
        BuiltinFactory::new("round(D)", |args, position, _| double_func(Op::Round, args, position)),
        BuiltinFactory::new("round(Di)", round_scaled),
        BuiltinFactory::new("sqrt(D)", |args, position, _| double_func(Op::Sqrt, args, position)),
        BuiltinFactory::new("floor(D)", |args, position, _| double_func(Op::Floor, args, position)),
        BuiltinFactory::new("ceil(D)", |args, position, _| double_func(Op::Ceil, args, position)),
        BuiltinFactory::new("abs(I)", abs),
        BuiltinFactory::new("abs(L)", abs),
        BuiltinFactory::new("abs(D)", abs),
        BuiltinFactory::new("power(DD)", power),
        BuiltinFactory::new("^(DD)", power),
    ]
}
