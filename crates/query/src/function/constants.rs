//! Constant functions.

use super::{Function, FunctionRef};
use crate::ast::parse_number;
use crate::cursor::Record;
use crate::lexer::unquote;
use alloc::boxed::Box;
use strata_core::{DataType, Error, Result, Value};

/// A value known at compile time.
#[derive(Clone, Debug)]
pub struct Constant {
    value: Value,
    data_type: DataType,
}

impl Constant {
    pub fn new(value: Value, data_type: DataType) -> Self {
        Self { value, data_type }
    }

    /// The untyped null. It reports STRING and converts to any type.
    pub fn null() -> Self {
        Self::new(Value::Null, DataType::String)
    }

    /// Parses a constant token: a quoted string, a number, a boolean,
    /// `null` or `NaN`.
    pub fn parse(token: &str, position: usize) -> Result<Self> {
        if token.starts_with('\'') || token.starts_with('"') {
            return Ok(Self::new(Value::Str(unquote(token).into()), DataType::String));
        }
        if token.eq_ignore_ascii_case("null") {
            return Ok(Self::null());
        }
        if token.eq_ignore_ascii_case("true") || token.eq_ignore_ascii_case("false") {
            return Ok(Self::new(
                Value::Boolean(token.eq_ignore_ascii_case("true")),
                DataType::Boolean,
            ));
        }
        if token.eq_ignore_ascii_case("nan") {
            return Ok(Self::new(Value::Double(f64::NAN), DataType::Double));
        }
        match parse_number(token) {
            Some(v @ Value::Int(_)) => Ok(Self::new(v, DataType::Int)),
            Some(v @ Value::Long(_)) => Ok(Self::new(v, DataType::Long)),
            Some(v @ Value::Double(_)) => Ok(Self::new(v, DataType::Double)),
            _ => Err(Error::invalid_literal(position, token)),
        }
    }

    pub fn boxed(self) -> FunctionRef {
        Box::new(self)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Function for Constant {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn eval(&self, _record: &dyn Record) -> Value {
        self.value.clone()
    }

    fn is_constant(&self) -> bool {
        true
    }
}

/// Returns whether `f` is the untyped null constant.
pub(crate) fn is_null_constant(f: &dyn Function) -> bool {
    f.is_constant() && f.eval(&crate::cursor::EmptyRecord).is_null()
}
