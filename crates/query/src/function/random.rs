//! Random value generators.
//!
//! Every generator draws from the context's shared stream. These functions
//! are never folded into constants.

use super::{take, BuiltinFactory, Function, FunctionRef};
use crate::context::{SharedRandom, SqlExecutionContext};
use crate::cursor::{EmptyRecord, Record};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use rand::Rng;
use strata_core::{DataType, Error, Result, Value};

#[derive(Clone, Debug)]
enum Generator {
    Int,
    IntRange(i32, i32),
    Long,
    Double,
    Boolean,
    Choice(Vec<String>),
}

#[derive(Debug)]
struct Random {
    generator: Generator,
    rnd: SharedRandom,
}

impl Function for Random {
    fn data_type(&self) -> DataType {
        match self.generator {
            Generator::Int | Generator::IntRange(..) => DataType::Int,
            Generator::Long => DataType::Long,
            Generator::Double => DataType::Double,
            Generator::Boolean => DataType::Boolean,
            Generator::Choice(_) => DataType::String,
        }
    }

    fn eval(&self, _record: &dyn Record) -> Value {
        let mut rnd = self.rnd.borrow_mut();
        match &self.generator {
            Generator::Int => Value::Int(rnd.gen()),
            Generator::IntRange(lo, hi) => Value::Int(rnd.gen_range(*lo..*hi)),
            Generator::Long => Value::Long(rnd.gen()),
            Generator::Double => Value::Double(rnd.gen()),
            Generator::Boolean => Value::Boolean(rnd.gen()),
            Generator::Choice(values) => match values.len() {
                0 => Value::Null,
                n => Value::Str(values[rnd.gen_range(0..n)].clone()),
            },
        }
    }
}

fn random(generator: Generator, ctx: &SqlExecutionContext) -> Result<FunctionRef> {
    Ok(Box::new(Random {
        generator,
        rnd: ctx.random(),
    }))
}

fn int_range(args: Vec<FunctionRef>, position: usize, ctx: &SqlExecutionContext) -> Result<FunctionRef> {
    let [lo, hi] = take(args, position)?;
    match (lo.eval(&EmptyRecord).as_int(), hi.eval(&EmptyRecord).as_int()) {
        (Some(lo), Some(hi)) if lo < hi => random(Generator::IntRange(lo, hi), ctx),
        _ => Err(Error::constraint(position, "invalid range")),
    }
}

fn choice(args: Vec<FunctionRef>, position: usize, ctx: &SqlExecutionContext) -> Result<FunctionRef> {
    let mut values = Vec::with_capacity(args.len());
    for arg in &args {
        match (arg.is_constant(), arg.eval(&EmptyRecord)) {
            (true, Value::Str(s)) => values.push(s),
            _ => return Err(Error::signature(position, "STRING constant expected")),
        }
    }
    random(Generator::Choice(values), ctx)
}

pub(crate) fn factories() -> Vec<BuiltinFactory> {
    alloc::vec![
        BuiltinFactory::random("rnd_int()", |_, _, ctx| random(Generator::Int, ctx)),
        BuiltinFactory::random("rnd_int(ii)", int_range),
        BuiltinFactory::random("rnd_long()", |_, _, ctx| random(Generator::Long, ctx)),
        BuiltinFactory::random("rnd_double()", |_, _, ctx| random(Generator::Double, ctx)),
        BuiltinFactory::random("rnd_boolean()", |_, _, ctx| random(Generator::Boolean, ctx)),
        BuiltinFactory::random("rnd_str(V)", choice),
    ]
}
