//! String functions and pattern matching.

use super::logic::Not;
use super::{take, BuiltinFactory, Function, FunctionRef};
use crate::context::SqlExecutionContext;
use crate::cursor::{EmptyRecord, Record};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::pattern_match::Pattern;
use strata_core::{DataType, Error, Result, Value};

#[derive(Debug)]
struct Matches {
    arg: FunctionRef,
    pattern: Pattern,
}

impl Function for Matches {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn eval(&self, record: &dyn Record) -> Value {
        Value::Boolean(self.get_bool(record))
    }

    fn get_bool(&self, record: &dyn Record) -> bool {
        match self.arg.eval(record) {
            Value::Str(s) => self.pattern.matches(&s),
            _ => false,
        }
    }
}

fn pattern_text(f: &FunctionRef, position: usize) -> Result<String> {
    match f.eval(&EmptyRecord) {
        Value::Str(s) => Ok(s),
        _ => Err(Error::signature(position, "pattern must not be null")),
    }
}

fn like(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg, pattern] = take(args, position)?;
    let pattern = Pattern::like(&pattern_text(&pattern, position)?);
    Ok(Box::new(Matches { arg, pattern }))
}

fn regex(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg, pattern] = take(args, position)?;
    let pattern = Pattern::regex(&pattern_text(&pattern, position)?)
        .map_err(|e| Error::signature(position, e.message()))?;
    Ok(Box::new(Matches { arg, pattern }))
}

fn not_regex(args: Vec<FunctionRef>, position: usize, ctx: &SqlExecutionContext) -> Result<FunctionRef> {
    Ok(Box::new(Not(regex(args, position, ctx)?)))
}

#[derive(Clone, Copy, Debug)]
enum Unary {
    Length,
    Upper,
    Lower,
}

#[derive(Debug)]
struct StrFunc {
    kind: Unary,
    arg: FunctionRef,
}

impl Function for StrFunc {
    fn data_type(&self) -> DataType {
        match self.kind {
            Unary::Length => DataType::Int,
            _ => DataType::String,
        }
    }

    fn eval(&self, record: &dyn Record) -> Value {
        let value = self.arg.eval(record);
        let s = value.as_str();
        match (self.kind, s) {
            (Unary::Length, Some(s)) => Value::Int(s.chars().count() as i32),
            (Unary::Length, None) => Value::Int(-1),
            (Unary::Upper, Some(s)) => Value::Str(s.to_uppercase()),
            (Unary::Lower, Some(s)) => Value::Str(s.to_lowercase()),
            _ => Value::Null,
        }
    }
}

/// Concatenates the text form of every argument. Nulls are skipped.
#[derive(Debug)]
struct Concat {
    args: Vec<FunctionRef>,
}

impl Function for Concat {
    fn data_type(&self) -> DataType {
        DataType::String
    }

    fn eval(&self, record: &dyn Record) -> Value {
        let mut out = String::new();
        for arg in &self.args {
            let v = arg.eval(record);
            if !v.is_null() {
                out.push_str(&alloc::format!("{}", v));
            }
        }
        Value::Str(out)
    }
}

fn unary(kind: Unary, args: Vec<FunctionRef>, position: usize) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(StrFunc { kind, arg }))
}

fn concat(args: Vec<FunctionRef>, _: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    Ok(Box::new(Concat { args }))
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    alloc::vec![
        BuiltinFactory::new("like(Ss)", like),
        BuiltinFactory::new("~(Ss)", regex),
        BuiltinFactory::new("!~(Ss)", not_regex),
        BuiltinFactory::new("length(S)", |args, position, _| unary(Unary::Length, args, position)),
        BuiltinFactory::new("upper(S)", |args, position, _| unary(Unary::Upper, args, position)),
        BuiltinFactory::new("lower(S)", |args, position, _| unary(Unary::Lower, args, position)),
        BuiltinFactory::new("concat(V)", concat),
    ]
}

#[cfg(test)]
mod tests {
    use crate::function::compiler::test_support::*;
    use alloc::vec::Vec;
    use strata_core::Value;

    fn s(text: &str) -> Vec<Value> {
        row_of(&[("s", Value::Str(text.into()))])
    }

    #[test]
    fn test_like() {
        assert_eq!(eval("s like 'ab%'", &s("abc")), Value::Boolean(true));
        assert_eq!(eval("s like 'a_c'", &s("abc")), Value::Boolean(true));
        assert_eq!(eval("s like 'b%'", &s("abc")), Value::Boolean(false));
        assert_eq!(eval("s like 'a%'", &row_of(&[])), Value::Boolean(false));
    }

    #[test]
    fn test_regex() {
        assert_eq!(eval("s ~ '^a.c$'", &s("abc")), Value::Boolean(true));
        assert_eq!(eval("s !~ 'x'", &s("abc")), Value::Boolean(true));
        assert_eq!(eval("k ~ 'b'", &row_of(&[("k", Value::Str("abc".into()))])), Value::Boolean(true));
        assert!(compile_error("s ~ '[ab'").message().contains("unclosed"));
    }

    #[test]
    fn test_scalar() {
        assert_eq!(eval("length(s)", &s("abc")), Value::Int(3));
        assert_eq!(eval("length(s)", &row_of(&[])), Value::Int(-1));
        assert_eq!(eval("upper(s)", &s("abc")), Value::Str("ABC".into()));
        assert_eq!(eval("concat(s, '-', a)", &{
            let mut row = s("x");
            row[0] = Value::Int(7);
            row
        }), Value::Str("x-7".into()));
    }
}
