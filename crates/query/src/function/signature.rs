//! Function signature grammar.
//!
//! A signature reads `name(ARGS)`. The name is an identifier or an operator
//! made of symbol characters. Each argument is one type character; a
//! lowercase character requires a compile-time constant:
//!
//! | char | type |
//! |---|---|
//! | `T` | BOOLEAN |
//! | `B` | BYTE |
//! | `E` | SHORT |
//! | `I` | INT |
//! | `L` | LONG |
//! | `F` | FLOAT |
//! | `D` | DOUBLE |
//! | `S` | STRING |
//! | `K` | SYMBOL |
//! | `M` | DATE |
//! | `N` | TIMESTAMP |
//! | `V` | any number of arguments of any type, last only |

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use strata_core::{DataType, Error, Result};

const OPERATOR_CHARS: &str = "+-*/%<>=!~^";

/// One fixed parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub data_type: DataType,
    pub constant: bool,
}

/// A parsed signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Lower-cased function name.
    pub name: String,
    pub params: Vec<ParamSpec>,
    /// Trailing `V`.
    pub var_args: bool,
}

impl Signature {
    /// Parses `text`, rejecting malformed signatures.
    pub fn parse(text: &str) -> Result<Self> {
        let open = text
            .find('(')
            .ok_or_else(|| invalid(text, "open brace expected"))?;
        if !text.ends_with(')') || text.len() < open + 2 {
            return Err(invalid(text, "close brace expected"));
        }

        let name = &text[..open];
        if !is_valid_name(name) {
            return Err(invalid(text, "invalid function name"));
        }

        let mut params = Vec::new();
        let mut var_args = false;
        for (i, c) in text[open + 1..text.len() - 1].chars().enumerate() {
            if var_args {
                return Err(invalid(text, "var-arg must be the last argument"));
            }
            if c.eq_ignore_ascii_case(&'v') {
                var_args = true;
                continue;
            }
            let data_type = type_of(c.to_ascii_uppercase())
                .ok_or_else(|| invalid(text, &format!("illegal argument type at {}", i)))?;
            params.push(ParamSpec {
                data_type,
                constant: c.is_ascii_lowercase(),
            });
        }

        Ok(Self {
            name: name.to_ascii_lowercase(),
            params,
            var_args,
        })
    }

    /// Minimum number of arguments.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

fn invalid(text: &str, reason: &str) -> Error {
    Error::signature(0, format!("invalid signature: {} ({})", text, reason))
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => false,
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        Some(_) => name.chars().all(|c| OPERATOR_CHARS.contains(c)),
    }
}

/// Type of a signature character.
pub fn type_of(c: char) -> Option<DataType> {
    Some(match c {
        'T' => DataType::Boolean,
        'B' => DataType::Byte,
        'E' => DataType::Short,
        'I' => DataType::Int,
        'L' => DataType::Long,
        'F' => DataType::Float,
        'D' => DataType::Double,
        'S' => DataType::String,
        'K' => DataType::Symbol,
        'M' => DataType::Date,
        'N' => DataType::Timestamp,
        _ => return None,
    })
}

/// Renders `name(TYPE,TYPE)` for error messages.
pub fn describe_call(name: &str, types: impl Iterator<Item = DataType>) -> String {
    let mut out = name.to_string();
    out.push('(');
    for (i, t) in types.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(t.name());
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let s = Signature::parse("round(Di)").unwrap();
        assert_eq!(s.name, "round");
        assert_eq!(
            s.params,
            [
                ParamSpec { data_type: DataType::Double, constant: false },
                ParamSpec { data_type: DataType::Int, constant: true },
            ]
        );
        assert!(!s.var_args);

        let s = Signature::parse("concat(V)").unwrap();
        assert!(s.var_args);
        assert_eq!(s.arity(), 0);

        let s = Signature::parse("!=(SS)").unwrap();
        assert_eq!(s.name, "!=");
        assert_eq!(Signature::parse("rnd_int()").unwrap().arity(), 0);
    }

    #[test]
    fn test_malformed() {
        for bad in ["1x()", "(B)", "x(Bz)", "x'x()", "a(", "x", "x(VI)", "a+(I)"] {
            assert!(Signature::parse(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_describe_call() {
        assert_eq!(
            describe_call("xyz", [DataType::Boolean, DataType::Symbol].into_iter()),
            "xyz(BOOLEAN,SYMBOL)"
        );
        assert_eq!(describe_call("f", core::iter::empty()), "f()");
    }
}
