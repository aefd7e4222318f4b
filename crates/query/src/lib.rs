//! Strata Query - SQL compiler and record cursor runtime.
//!
//! A statement flows through these stages:
//!
//! - `lexer`, `parser`: tokens to expression trees and query models
//! - `model`: query models, join contexts, intervals and DDL models
//! - `optimizer`: select layers, join ordering, filter placement
//! - `function`: function registry and expression compilation
//! - `cursor`: pull-based record cursors and their factories
//! - `codegen`: optimized models to cursor factories
//! - `compiler`: the `SqlCompiler` entry point
//!
//! `config` and `context` carry compiler settings and the per-caller
//! execution state.

#![no_std]

extern crate alloc;

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod context;
pub mod cursor;
pub mod function;
pub mod lexer;
pub mod model;
pub mod optimizer;
pub mod parser;

pub use compiler::{CompiledStatement, SqlCompiler};
pub use config::CompilerConfig;
pub use context::SqlExecutionContext;
