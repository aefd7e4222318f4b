//! Timestamp conversions.

use super::{take, BuiltinFactory, Function, FunctionRef};
use crate::context::SqlExecutionContext;
use crate::cursor::Record;
use crate::model::interval::{format_timestamp, try_parse_timestamp};
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::{DataType, Result, Value};

#[derive(Debug)]
struct ToTimestamp(FunctionRef);

impl Function for ToTimestamp {
    fn data_type(&self) -> DataType {
        DataType::Timestamp
    }

    fn eval(&self, record: &dyn Record) -> Value {
        match self.0.eval(record) {
            Value::Str(s) => try_parse_timestamp(&s).map_or(Value::Null, Value::Timestamp),
            v => v.to_i64().map_or(Value::Null, Value::Timestamp),
        }
    }
}

#[derive(Debug)]
struct ToChar(FunctionRef);

impl Function for ToChar {
    fn data_type(&self) -> DataType {
        DataType::String
    }

    fn eval(&self, record: &dyn Record) -> Value {
        match self.0.eval(record) {
            Value::Timestamp(micros) => Value::Str(format_timestamp(micros)),
            _ => Value::Null,
        }
    }
}

fn to_timestamp(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(ToTimestamp(arg)))
}

fn to_char(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(ToChar(arg)))
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    alloc::vec![
        BuiltinFactory::new("to_timestamp(L)", to_timestamp),
        BuiltinFactory::new("to_timestamp(S)", to_timestamp),
        BuiltinFactory::new("to_char(N)", to_char),
    ]
}

#[cfg(test)]
mod tests {
    use crate::function::compiler::test_support::*;
    use strata_core::{DataType, Value};

    #[test]
    fn test_conversions() {
        assert_eq!(result_type("to_timestamp(l)"), DataType::Timestamp);
        assert_eq!(
            eval("to_char(to_timestamp(1000000))", &[]),
            Value::Str("1970-01-01T00:00:01.000000Z".into())
        );
        assert_eq!(
            eval("to_timestamp('2020-01-01')", &[]),
            Value::Timestamp(1_577_836_800_000_000)
        );
        assert!(eval("to_timestamp('nope')", &[]).is_null());
    }
}
