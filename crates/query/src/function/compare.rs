//! Comparison operators.
//!
//! `=` and `!=` treat null as equal to null. Ordering comparisons with a null
//! operand are false.

use super::{take, BuiltinFactory, Constant, Function, FunctionRef};
use crate::context::SqlExecutionContext;
use crate::cursor::{EmptyRecord, Record};
use crate::model::interval::parse_timestamp;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::{DataType, Result, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn test(self, ord: Ordering) -> bool {
        match self {
            Cmp::Eq => ord == Ordering::Equal,
            Cmp::Ne => ord != Ordering::Equal,
            Cmp::Lt => ord == Ordering::Less,
            Cmp::Le => ord != Ordering::Greater,
            Cmp::Gt => ord == Ordering::Greater,
            Cmp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug)]
struct Compare {
    cmp: Cmp,
    lhs: FunctionRef,
    rhs: FunctionRef,
}

impl Function for Compare {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        let (l, r) = (self.lhs.eval(record), self.rhs.eval(record));
        if (l.is_null() || r.is_null()) && !matches!(self.cmp, Cmp::Eq | Cmp::Ne) {
            return false;
        }
        self.cmp.test(l.cmp(&r))
    }
}

fn build(cmp: Cmp, args: Vec<FunctionRef>, position: usize) -> Result<FunctionRef> {
    let [lhs, rhs] = take(args, position)?;
    Ok(Box::new(Compare { cmp, lhs, rhs }))
}

/// Replaces a string constant with the timestamp it spells.
fn timestamp_constant(f: FunctionRef, position: usize) -> Result<FunctionRef> {
    match f.eval(&EmptyRecord) {
        Value::Str(text) => Ok(Constant::new(
            Value::Timestamp(parse_timestamp(&text, position)?),
            DataType::Timestamp,
        )
        .boxed()),
        _ => Ok(f),
    }
}

fn build_timestamp(cmp: Cmp, args: Vec<FunctionRef>, position: usize, string_first: bool) -> Result<FunctionRef> {
    let [lhs, rhs] = take(args, position)?;
    let (lhs, rhs) = if string_first {
        (timestamp_constant(lhs, position)?, rhs)
    } else {
        (lhs, timestamp_constant(rhs, position)?)
    };
    Ok(Box::new(Compare { cmp, lhs, rhs }))
}

macro_rules! compare_factories {
    ($($name:literal => $cmp:ident;)*) => {
        [$(
            BuiltinFactory::new(concat!($name, "(DD)"), |args, position, _| build(Cmp::$cmp, args, position)),
            BuiltinFactory::new(concat!($name, "(LL)"), |args, position, _| build(Cmp::$cmp, args, position)),
            BuiltinFactory::new(concat!($name, "(SS)"), |args, position, _| build(Cmp::$cmp, args, position)),
            BuiltinFactory::new(concat!($name, "(NN)"), |args, position, _| build(Cmp::$cmp, args, position)),
            BuiltinFactory::new(concat!($name, "(MM)"), |args, position, _| build(Cmp::$cmp, args, position)),
            BuiltinFactory::new(concat!($name, "(Ns)"), |args, position, _| build_timestamp(Cmp::$cmp, args, position, false)),
            BuiltinFactory::new(concat!($name, "(sN)"), |args, position, _| build_timestamp(Cmp::$cmp, args, position, true)),
        )*]
    };
}

fn boolean_eq(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    build(Cmp::Eq, args, position)
}

fn boolean_ne(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    build(Cmp::Ne, args, position)
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    let mut out: Vec<BuiltinFactory> = compare_factories! {
        "=" => Eq;
        "!=" => Ne;
        "<" => Lt;
        "<=" => Le;
        ">" => Gt;
        ">=" => Ge;
    }
    .into_iter()
    .collect();
    out.push(BuiltinFactory::new("=(TT)", boolean_eq));
    out.push(BuiltinFactory::new("!=(TT)", boolean_ne));
    out
}

#[cfg(test)]
mod tests {
    use crate::function::compiler::test_support::*;
    use strata_core::Value;

    #[test]
    fn test_numeric() {
        let row = [Value::Int(1), Value::Int(2)];
        assert_eq!(eval("a < b", &row), Value::Boolean(true));
        assert_eq!(eval("a >= b", &row), Value::Boolean(false));
        assert_eq!(eval("a != 1.5", &row), Value::Boolean(true));
        assert_eq!(eval("b = 2.0", &row), Value::Boolean(true));
    }

    #[test]
    fn test_nulls() {
        let row = [Value::Null, Value::Int(2)];
        assert_eq!(eval("a < b", &row), Value::Boolean(false));
        assert_eq!(eval("a > b", &row), Value::Boolean(false));
        assert_eq!(eval("a = null", &row), Value::Boolean(true));
        assert_eq!(eval("b != null", &row), Value::Boolean(true));
    }

    #[test]
    fn test_strings_and_symbols() {
        let mut row = row_of(&[("s", Value::Str("abc".into())), ("k", Value::Str("abc".into()))]);
        assert_eq!(eval("s = k", &row), Value::Boolean(true));
        assert_eq!(eval("s < 'abd'", &row), Value::Boolean(true));
        row = row_of(&[("k", Value::Str("x".into()))]);
        assert_eq!(eval("k = 'x'", &row), Value::Boolean(true));
    }

    #[test]
    fn test_timestamp_string() {
        let row = row_of(&[("ts", Value::Timestamp(1_577_836_800_000_000))]);
        assert_eq!(eval("ts = '2020-01-01'", &row), Value::Boolean(true));
        assert_eq!(eval("'2019-12-31' < ts", &row), Value::Boolean(true));
        assert_eq!(eval("ts > '2020-01-01T00:00:01.000Z'", &row), Value::Boolean(false));
        let err = compile_error("ts > 'abc'");
        assert_eq!(err.message(), "Invalid date");
    }
}
