//! The execution and output engine (spec.md §4.7, §4.8): walks a
//! compiled [`crate::expr::Expr`] tree against a [`crate::html::Doc`]
//! and renders either a raw text stream or structured JSON-style output.
//!
//! spec.md §3/§9 describe the original engine's result representation as
//! packed `(node_index, parent_index)` handles collected into side
//! tables (`ncollector`/`fcollector`) and reordered after the fact. That
//! scheme exists to avoid reallocation and pointer chasing in C; in Rust,
//! `Vec<usize>` match lists and owned `Vec<u8>` render buffers give the
//! same result with the borrow checker doing the bookkeeping, so this
//! implementation walks the tree directly instead of deferring through
//! collectors (see DESIGN.md, "execution engine").

mod exec;
mod output;
mod sink;

pub use exec::Engine;
pub use output::render;
pub use sink::Sink;
