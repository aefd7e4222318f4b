//! Function factories keyed by name, with overload resolution.
//!
//! A call matches a signature when the argument count fits and every
//! argument converts to its parameter type. Each conversion has a cost:
//!
//! - the same type costs 0, so does a null argument
//! - numeric widening along BYTE, SHORT, INT, LONG, FLOAT, DOUBLE costs the
//!   number of steps taken
//! - SYMBOL to STRING costs 1
//!
//! The cheapest signature wins. Two different signatures at the same cost
//! are ambiguous unless a null argument is involved, in which case the
//! first registered one wins.

use super::signature::{describe_call, Signature};
use super::{arithmetic, compare, date, logic, math, random, string, FunctionFactory};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::{DataType, Error, Result};
use tracing::{trace, warn};

/// What the resolver knows about one compiled argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgInfo {
    pub data_type: DataType,
    pub constant: bool,
    /// The untyped null constant.
    pub null: bool,
}

impl ArgInfo {
    pub fn new(data_type: DataType, constant: bool) -> Self {
        Self {
            data_type,
            constant,
            null: false,
        }
    }

    pub fn null() -> Self {
        Self {
            data_type: DataType::String,
            constant: true,
            null: true,
        }
    }
}

struct Registered {
    signature: Signature,
    factory: Box<dyn FunctionFactory>,
}

/// Registered function factories.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Vec<Registered>>,
    count: usize,
}

pub(crate) fn widening_rank(t: DataType) -> Option<u32> {
    Some(match t {
        DataType::Byte => 0,
        DataType::Short => 1,
        DataType::Int => 2,
        DataType::Long => 3,
        DataType::Float => 4,
        DataType::Double => 5,
        _ => return None,
    })
}

/// Cost of passing `from` where `to` is expected.
fn conversion_cost(from: DataType, to: DataType) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    if from == DataType::Symbol && to == DataType::String {
        return Some(1);
    }
    match (widening_rank(from), widening_rank(to)) {
        (Some(f), Some(t)) if f <= t => Some(t - f),
        _ => None,
    }
}

fn match_cost(signature: &Signature, args: &[ArgInfo]) -> Option<u32> {
    let fixed = signature.params.len();
    if args.len() < fixed || (!signature.var_args && args.len() != fixed) {
        return None;
    }
    let mut cost = 0;
    for (param, arg) in signature.params.iter().zip(args) {
        if param.constant && !arg.constant {
            return None;
        }
        if !arg.null {
            cost += conversion_cost(arg.data_type, param.data_type)?;
        }
    }
    Some(cost)
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in function.
    pub fn builtin() -> Self {
        let families = [
            arithmetic::factories(),
            compare::factories(),
            logic::factories(),
            string::factories(),
            math::factories(),
            date::factories(),
            random::factories(),
        ];
        Self::with_factories(
            families
                .into_iter()
                .flatten()
                .map(|f| Box::new(f) as Box<dyn FunctionFactory>),
        )
    }

    /// Creates a registry from `factories`, skipping malformed signatures.
    pub fn with_factories(factories: impl IntoIterator<Item = Box<dyn FunctionFactory>>) -> Self {
        let mut registry = Self::new();
        for factory in factories {
            if let Err(e) = registry.register(factory) {
                warn!(error = %e, "skipping function factory");
            }
        }
        registry
    }

    /// Adds a factory. Fails when its signature is malformed.
    pub fn register(&mut self, factory: Box<dyn FunctionFactory>) -> Result<()> {
        let signature = Signature::parse(factory.signature())?;
        self.functions
            .entry(signature.name.clone())
            .or_default()
            .push(Registered { signature, factory });
        self.count += 1;
        Ok(())
    }

    /// Number of registered factories.
    pub fn function_count(&self) -> usize {
        self.count
    }

    /// Returns whether any signature uses `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name.to_ascii_lowercase().as_str())
    }

    /// Picks the factory for a call of `name` over `args`.
    pub fn resolve(&self, name: &str, args: &[ArgInfo], position: usize) -> Result<&dyn FunctionFactory> {
        let call = || describe_call(name, args.iter().map(|a| a.data_type));
        let candidates = self
            .functions
            .get(name.to_ascii_lowercase().as_str())
            .ok_or_else(|| Error::signature(position, format!("unknown function name: {}", call())))?;

        let has_null = args.iter().any(|a| a.null);
        let mut best: Option<(u32, &Registered)> = None;
        let mut ambiguous = false;
        for candidate in candidates {
            let Some(cost) = match_cost(&candidate.signature, args) else {
                continue;
            };
            match best {
                Some((best_cost, _)) if cost > best_cost => {}
                Some((best_cost, _)) if cost == best_cost => ambiguous = !has_null,
                _ => {
                    best = Some((cost, candidate));
                    ambiguous = false;
                }
            }
        }

        match best {
            None => Err(Error::signature(position, format!("no signature match: {}", call()))),
            Some(_) if ambiguous => Err(Error::signature(
                position,
                format!("ambiguous function call: {}", call()),
            )),
            Some((cost, registered)) => {
                trace!(signature = registered.factory.signature(), cost, "resolved function");
                Ok(registered.factory.as_ref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SqlExecutionContext;
    use crate::function::{Constant, FunctionRef};
    use strata_core::Value;

    struct Fixed(&'static str);

    impl FunctionFactory for Fixed {
        fn signature(&self) -> &str {
            self.0
        }

        fn new_instance(&self, _: Vec<FunctionRef>, _: usize, _: &SqlExecutionContext) -> Result<FunctionRef> {
            Ok(Constant::new(Value::Str(self.0.into()), DataType::String).boxed())
        }
    }

    fn registry(signatures: &[&'static str]) -> FunctionRegistry {
        FunctionRegistry::with_factories(
            signatures
                .iter()
                .map(|s| Box::new(Fixed(*s)) as Box<dyn FunctionFactory>),
        )
    }

    fn int() -> ArgInfo {
        ArgInfo::new(DataType::Int, false)
    }

    #[test]
    fn test_builtin_registers_everything() {
        let r = FunctionRegistry::builtin();
        assert!(r.function_count() > 60);
        assert!(r.contains("ROUND"));
        assert!(r.contains("+"));
    }

    #[test]
    fn test_malformed_signature_skipped() {
        let r = registry(&["f(I)", "1x()", "g(Q)"]);
        assert_eq!(r.function_count(), 1);
        assert!(registry(&[]).register(Box::new(Fixed("x(VI)"))).is_err());
    }

    #[test]
    fn test_widening_prefers_closest() {
        let r = registry(&["f(D)", "f(L)"]);
        assert_eq!(r.resolve("f", &[int()], 0).unwrap().signature(), "f(L)");
        let r = registry(&["f(S)"]);
        let sym = ArgInfo::new(DataType::Symbol, false);
        assert_eq!(r.resolve("F", &[sym], 0).unwrap().signature(), "f(S)");
    }

    #[test]
    fn test_constant_parameter() {
        let r = registry(&["round(Di)"]);
        let d = ArgInfo::new(DataType::Double, false);
        assert!(r.resolve("round", &[d, ArgInfo::new(DataType::Int, true)], 0).is_ok());
        let err = r.resolve("round", &[d, int()], 7).err().unwrap();
        assert_eq!(err.message(), "no signature match: round(DOUBLE,INT)");
        assert_eq!(err.position(), Some(7));
    }

    #[test]
    fn test_unknown_name() {
        let r = registry(&["f(I)"]);
        let args = [
            ArgInfo::new(DataType::Boolean, false),
            ArgInfo::new(DataType::Symbol, false),
        ];
        let err = r.resolve("xyz", &args, 0).err().unwrap();
        assert_eq!(err.message(), "unknown function name: xyz(BOOLEAN,SYMBOL)");
    }

    #[test]
    fn test_ambiguity() {
        let r = registry(&["+(IL)", "+(LI)"]);
        let short = ArgInfo::new(DataType::Short, false);
        let err = r.resolve("+", &[short, short], 0).err().unwrap();
        assert_eq!(err.message(), "ambiguous function call: +(SHORT,SHORT)");

        // a null argument lets the first registered signature win
        let picked = r.resolve("+", &[ArgInfo::null(), ArgInfo::null()], 0).unwrap();
        assert_eq!(picked.signature(), "+(IL)");
    }

    #[test]
    fn test_var_args() {
        let r = registry(&["concat(V)"]);
        assert!(r.resolve("concat", &[], 0).is_ok());
        assert!(r.resolve("concat", &[int(), ArgInfo::null(), int()], 0).is_ok());
    }
}
