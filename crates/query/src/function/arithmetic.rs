//! Arithmetic operators over INT, LONG and DOUBLE.
//!
//! A null operand gives null. Integer division by zero gives null; INT and
//! LONG arithmetic wraps on overflow.

use super::{take, BuiltinFactory, Function, FunctionRef};
use crate::context::SqlExecutionContext;
use crate::cursor::Record;
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::{DataType, Result, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug)]
struct Arithmetic {
    op: Op,
    lhs: FunctionRef,
    rhs: FunctionRef,
    data_type: DataType,
}

impl Function for Arithmetic {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn eval(&self, record: &dyn Record) -> Value {
        let (l, r) = (self.lhs.eval(record), self.rhs.eval(record));
        if l.is_null() || r.is_null() {
            return Value::Null;
        }
        match self.data_type {
            DataType::Int => match (l.to_i64(), r.to_i64()) {
                (Some(a), Some(b)) => integral(self.op, a as i32, b as i32).map_or(Value::Null, Value::Int),
                _ => Value::Null,
            },
            DataType::Long => match (l.to_i64(), r.to_i64()) {
                (Some(a), Some(b)) => integral64(self.op, a, b).map_or(Value::Null, Value::Long),
                _ => Value::Null,
            },
            _ => match (l.to_f64(), r.to_f64()) {
                (Some(a), Some(b)) => Value::Double(floating(self.op, a, b)),
                _ => Value::Null,
            },
        }
    }
}

fn integral(op: Op, a: i32, b: i32) -> Option<i32> {
    match op {
        Op::Add => Some(a.wrapping_add(b)),
        Op::Sub => Some(a.wrapping_sub(b)),
        Op::Mul => Some(a.wrapping_mul(b)),
        Op::Div => (b != 0).then(|| a.wrapping_div(b)),
        Op::Rem => (b != 0).then(|| a.wrapping_rem(b)),
    }
}

fn integral64(op: Op, a: i64, b: i64) -> Option<i64> {
    match op {
        Op::Add => Some(a.wrapping_add(b)),
        Op::Sub => Some(a.wrapping_sub(b)),
        Op::Mul => Some(a.wrapping_mul(b)),
        Op::Div => (b != 0).then(|| a.wrapping_div(b)),
        Op::Rem => (b != 0).then(|| a.wrapping_rem(b)),
    }
}

fn floating(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        Op::Rem => libm::fmod(a, b),
    }
}

#[derive(Debug)]
struct Negate {
    arg: FunctionRef,
}

impl Function for Negate {
    fn data_type(&self) -> DataType {
        self.arg.data_type()
    }

    fn eval(&self, record: &dyn Record) -> Value {
        match self.arg.eval(record) {
            Value::Int(v) => Value::Int(v.wrapping_neg()),
            Value::Long(v) => Value::Long(v.wrapping_neg()),
            Value::Double(v) => Value::Double(-v),
            _ => Value::Null,
        }
    }
}

fn build(op: Op, data_type: DataType, args: Vec<FunctionRef>, position: usize) -> Result<FunctionRef> {
    let [lhs, rhs] = take(args, position)?;
    Ok(Box::new(Arithmetic {
        op,
        lhs,
        rhs,
        data_type,
    }))
}

fn negate(args: Vec<FunctionRef>, position: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
    let [arg] = take(args, position)?;
    Ok(Box::new(Negate { arg }))
}

macro_rules! arithmetic_factories {
    ($($sig:literal => $op:ident, $ty:ident;)*) => {
        [$(BuiltinFactory::new($sig, |args, position, _| build(Op::$op, DataType::$ty, args, position)),)*]
    };
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    let mut out: Vec<BuiltinFactory> = arithmetic_factories! {
        "+(II)" => Add, Int;
        "+(LL)" => Add, Long;
        "+(DD)" => Add, Double;
        "-(II)" => Sub, Int;
        "-(LL)" => Sub, Long;
        "-(DD)" => Sub, Double;
        "*(II)" => Mul, Int;
        "*(LL)" => Mul, Long;
        "*(DD)" => Mul, Double;
        "/(II)" => Div, Int;
        "/(LL)" => Div, Long;
        "/(DD)" => Div, Double;
        "%(II)" => Rem, Int;
        "%(LL)" => Rem, Long;
        "%(DD)" => Rem, Double;
    }
    .into_iter()
    .collect();
    out.push(BuiltinFactory::new("-(I)", negate));
    out.push(BuiltinFactory::new("-(L)", negate));
    out.push(BuiltinFactory::new("-(D)", negate));
    out
}

#[cfg(test)]
mod tests {
    use crate::function::compiler::test_support::*;
    use strata_core::{DataType, Value};

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(eval("a + b * 2", &[Value::Int(1), Value::Int(3)]), Value::Int(7));
        assert_eq!(eval("a / 2", &[Value::Int(7), Value::Int(0)]), Value::Int(3));
        assert_eq!(eval("a % b", &[Value::Int(7), Value::Int(4)]), Value::Int(3));
        assert_eq!(eval("-a", &[Value::Int(7), Value::Int(0)]), Value::Int(-7));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(eval("a / b", &[Value::Int(1), Value::Int(0)]).is_null());
        let Value::Double(d) = eval("a / 0.0", &[Value::Int(1), Value::Int(0)]) else {
            panic!("double expected");
        };
        assert!(d.is_infinite());
    }

    #[test]
    fn test_widening() {
        assert_eq!(result_type("a + 1.5"), DataType::Double);
        assert_eq!(result_type("a + 3000000000"), DataType::Long);
        assert_eq!(result_type("a - b"), DataType::Int);
        assert_eq!(eval("a * 1.5", &[Value::Int(2), Value::Int(0)]), Value::Double(3.0));
    }

    #[test]
    fn test_null_propagates() {
        assert!(eval("a + b", &[Value::Null, Value::Int(1)]).is_null());
        assert!(eval("a + null", &[Value::Int(1), Value::Int(1)]).is_null());
    }
}
