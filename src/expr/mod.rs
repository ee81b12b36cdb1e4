//! The query-language tokenizer and expression-tree compiler (spec.md
//! §4.6).

mod lexer;
mod parser;
mod types;

pub use types::{CondOp, Expr, ExprFormat, ExprKind, MAX_BLOCK_LEVEL, MAX_BLOCK_LEVEL_SMALL};

use crate::error::ScriptError;

/// Compiles a full query expression (the top-level production: a Block
/// of one or more Chains).
pub fn compile(src: &[u8]) -> Result<Expr, ScriptError> {
    parser::compile(src)
}

/// Compiles the parenthesized body of an `@has(...)` node-pattern hook.
/// Used by [`crate::npattern::compile`], which cannot itself depend on
/// `engine` (the `has` evaluator lives there) without creating a module
/// cycle — so `npattern` calls this instead and stores the result behind
/// `HasEvaluator` (see `npattern::exec`).
pub fn compile_has_body(src: &[u8]) -> Result<Expr, String> {
    parser::compile(src).map_err(|e| e.to_string())
}
