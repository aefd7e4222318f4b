//! Compiled expression functions.
//!
//! Every expression of a query compiles into a tree of [`Function`]s. A
//! function reports its result type once, at compile time, and produces a
//! [`Value`] per record.
//!
//! - `signature`: the `name(ARGS)` signature grammar
//! - `registry`: factories keyed by name and overload resolution
//! - `compiler`: AST to function tree, with constant folding
//! - `aggregate`: group-by functions and their accumulators
//! - scalar families: `constants`, `column`, `arithmetic`, `compare`,
//!   `logic`, `math`, `string`, `date`, `random`

use crate::context::SqlExecutionContext;
use crate::cursor::Record;
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::fmt;
use strata_core::{DataType, Error, Result, Value};

mod aggregate;
mod arithmetic;
mod column;
mod compare;
mod compiler;
mod constants;
mod date;
mod logic;
mod math;
mod random;
mod registry;
mod signature;
mod string;

pub use aggregate::{is_aggregate, Accumulator, AggregateFunction, AggregateKind};
pub use column::RecordColumn;
pub use compiler::{FunctionCompiler, LambdaValues};
pub use constants::Constant;
pub use registry::{ArgInfo, FunctionRegistry};
pub use signature::{ParamSpec, Signature};

/// A compiled expression.
pub trait Function: fmt::Debug {
    /// Result type.
    fn data_type(&self) -> DataType;

    /// Evaluates against `record`.
    fn eval(&self, record: &dyn Record) -> Value;

    /// Whether the result is independent of the record.
    fn is_constant(&self) -> bool {
        false
    }

    /// Evaluates a predicate. Null and non-boolean results are false.
    fn get_bool(&self, record: &dyn Record) -> bool {
        matches!(self.eval(record), Value::Boolean(true))
    }
}

/// Owned function tree.
pub type FunctionRef = Box<dyn Function>;

/// Builds functions for one signature.
pub trait FunctionFactory {
    /// Signature in the `name(ARGS)` grammar, such as `round(Di)`.
    fn signature(&self) -> &str;

    /// Creates a function over compiled arguments.
    fn new_instance(
        &self,
        args: Vec<FunctionRef>,
        position: usize,
        ctx: &SqlExecutionContext,
    ) -> Result<FunctionRef>;

    /// Deterministic functions over constant arguments are folded.
    fn is_deterministic(&self) -> bool {
        true
    }
}

/// Constructor of a built-in function.
pub(crate) type Builder = fn(Vec<FunctionRef>, usize, &SqlExecutionContext) -> Result<FunctionRef>;

/// Factory backed by a constructor function.
pub(crate) struct BuiltinFactory {
    pub signature: &'static str,
    pub builder: Builder,
    pub deterministic: bool,
}

impl BuiltinFactory {
    pub const fn new(signature: &'static str, builder: Builder) -> Self {
        Self {
            signature,
            builder,
            deterministic: true,
        }
    }

    pub const fn random(signature: &'static str, builder: Builder) -> Self {
        Self {
            signature,
            builder,
            deterministic: false,
        }
    }
}

impl FunctionFactory for BuiltinFactory {
    fn signature(&self) -> &str {
        self.signature
    }

    fn new_instance(
        &self,
        args: Vec<FunctionRef>,
        position: usize,
        ctx: &SqlExecutionContext,
    ) -> Result<FunctionRef> {
        (self.builder)(args, position, ctx)
    }

    fn is_deterministic(&self) -> bool {
        self.deterministic
    }
}

/// Takes exactly `N` arguments out of `args`.
pub(crate) fn take<const N: usize>(args: Vec<FunctionRef>, position: usize) -> Result<[FunctionRef; N]> {
    let found = args.len();
    args.try_into().map_err(|_| {
        Error::signature(
            position,
            format!("wrong number of arguments [found={},expected={}]", found, N),
        )
    })
}
