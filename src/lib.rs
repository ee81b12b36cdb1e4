//! `htq`: a command-line HTML search and extraction engine. A query
//! expression in a small pattern/printf language selects structural
//! nodes (tags, comments, text) from an HTML document and renders them
//! raw or as JSON-style structured output (see SPEC_FULL.md).
//!
//! Module layout, leaf-first:
//! - [`bytes`] — ASCII classifiers, escape decoding, integer parsing.
//! - [`range`] — numeric range predicates (`[n]`, `[n:m]`, `[-n:]`, …).
//! - [`pattern`] — string pattern predicates, BRE/ERE-backed.
//! - [`fields`] — output field declarations and typed JSON rendering.
//! - [`html`] — the HTML tokenizer/tree builder and its flat `Doc`.
//! - [`npattern`] — the compiled node pattern and its axis traversal.
//! - [`printf`] — the node printf mini-language.
//! - [`expr`] — the query language tokenizer and expression compiler.
//! - [`engine`] — the execution and output engine.
//! - [`error`] — the three error kinds and their exit codes.
//! - [`cli`] — argument parsing and command dispatch.

pub mod bytes;
pub mod cli;
pub mod engine;
pub mod error;
pub mod expr;
pub mod fields;
pub mod html;
pub mod npattern;
pub mod pattern;
pub mod printf;
pub mod range;
