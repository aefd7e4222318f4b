//! Boolean connectives.

use super::{take, BuiltinFactory, Function, FunctionRef};
use crate::context::SqlExecutionContext;
use crate::cursor::Record;
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::{DataType, Result, Value};

#[derive(Debug)]
struct And(FunctionRef, FunctionRef);

impl Function for And {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        self.0.get_bool(record) && self.1.get_bool(record)
    }
}

#[derive(Debug)]
struct Or(FunctionRef, FunctionRef);

impl Function for Or {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        self.0.get_bool(record) || self.1.get_bool(record)
    }
}

/// Negation. Also wraps other predicates, such as `!~`.
#[derive(Debug)]
pub(crate) struct Not(pub FunctionRef);

impl Function for Not {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        !self.0.get_bool(record)
    }
}

fn and(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [l, r] = take(args, position)?;
    Ok(Box::new(And(l, r)))
}

fn or(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [l, r] = take(args, position)?;
    Ok(Box::new(Or(l, r)))
}

fn not(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(Not(arg)))
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    alloc::vec![
        BuiltinFactory::new("and(TT)", and),
        BuiltinFactory::new("or(TT)", or),
        BuiltinFactory::new("not(T)", not),
    ]
}
