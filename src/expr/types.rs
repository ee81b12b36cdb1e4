//! The compiled expression tree (spec.md §3, §4.6): the output of the
//! query-language compiler, consumed read-only by the execution engine.

use crate::fields::OutputField;
use crate::npattern::NPattern;
use crate::printf::Template;

pub const MAX_BLOCK_LEVEL: usize = 6892;
pub const MAX_BLOCK_LEVEL_SMALL: usize = 256;

/// A post-processing filter bound with `/` (spec.md §4.6). The filter
/// families themselves (sed, tr, wc, cut, sort, uniq, line, trim, echo,
/// rev, tac, decode, encode) are external collaborators (spec.md §1); a
/// compiled `ExprFormat` only carries the raw invocation text and a
/// contract, `apply`, that the CLI layer can plug a real filter into.
/// The default `identity` implementation passes bytes through unchanged.
#[derive(Debug, Clone)]
pub struct ExprFormat {
    pub raw: Vec<u8>,
}

impl ExprFormat {
    pub fn apply(&self, input: &[u8]) -> Vec<u8> {
        input.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Or,
    And,
    AndBlank,
}

/// One node in the compiled expression tree. Carries everything spec.md
/// §3 says an expression node "may carry": an output field, node
/// formatters (applied per matched node), and expression formatters
/// (applied once to the rendered buffer).
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub field: Option<OutputField>,
    pub node_formatters: Vec<Template>,
    pub expr_formatters: Vec<ExprFormat>,
    /// Number of direct/transitive children that carry an output field;
    /// used for the "fields in the middle of a chain" structural check.
    pub child_fields: usize,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    NPattern(Box<NPattern>),
    Block(Vec<Expr>),
    Chain(Vec<Expr>),
    BlockCondition { op: CondOp, require_all: bool, children: Vec<Expr> },
    /// Iterates its parent's result set one element at a time through a
    /// fresh evaluation of the wrapped block (spec.md §4.7 `exec_singular`).
    Singular(Box<Expr>),
}

impl Expr {
    pub fn leaf(kind: ExprKind) -> Self {
        Self { kind, field: None, node_formatters: Vec::new(), expr_formatters: Vec::new(), child_fields: 0 }
    }

    pub fn has_string_output(&self) -> bool {
        !self.node_formatters.is_empty() || !self.expr_formatters.is_empty()
    }

    /// Whether this expression or any descendant carries an output field.
    /// Decides, once per run, between raw rendering (spec.md §4.8 "Raw")
    /// and structured JSON-style rendering ("Structured").
    pub fn uses_fields(&self) -> bool {
        if self.field.is_some() {
            return true;
        }
        match &self.kind {
            ExprKind::NPattern(_) => false,
            ExprKind::Block(children) | ExprKind::Chain(children) => children.iter().any(Expr::uses_fields),
            ExprKind::BlockCondition { children, .. } => children.iter().any(Expr::uses_fields),
            ExprKind::Singular(inner) => inner.uses_fields(),
        }
    }
}
