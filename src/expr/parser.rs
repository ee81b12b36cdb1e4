//! Recursive-descent tree builder for the query language (spec.md §4.6):
//! consumes the token stream from [`super::lexer`] and builds the
//! compiled [`Expr`] tree, checking the structural invariants as it goes.

use crate::bytes::trim;
use crate::error::ScriptError;
use crate::npattern::NPattern;

use super::lexer::{tokenize, TokKind, Token};
use super::types::{CondOp, Expr, ExprFormat, ExprKind, MAX_BLOCK_LEVEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Eof,
    BlockEnd,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

pub fn compile(src: &[u8]) -> Result<Expr, ScriptError> {
    let tokens = tokenize(src).map_err(|e| ScriptError::at(0, e))?;
    let mut p = Parser { tokens, pos: 0, depth: 0 };
    let expr = p.parse_block_content(Terminator::Eof)?;
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&TokKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.offset).unwrap_or_else(|| {
            self.tokens.last().map(|t| t.offset).unwrap_or(0)
        })
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_text(&mut self) -> Result<Vec<u8>, ScriptError> {
        match self.advance() {
            Some(Token { kind: TokKind::Text(b), .. }) => Ok(b),
            _ => Err(ScriptError::at(self.offset(), "expected a format string")),
        }
    }

    fn parse_block_content(&mut self, term: Terminator) -> Result<Expr, ScriptError> {
        let mut chains = Vec::new();
        loop {
            let at_end = match term {
                Terminator::Eof => self.pos >= self.tokens.len(),
                Terminator::BlockEnd => matches!(self.peek(), Some(TokKind::BlockEnd)) || self.pos >= self.tokens.len(),
            };
            if at_end {
                break;
            }
            chains.push(self.parse_chain()?);
            if matches!(self.peek(), Some(TokKind::NextNode)) {
                self.advance();
                continue;
            }
            break;
        }

        match term {
            Terminator::BlockEnd => match self.advance() {
                Some(Token { kind: TokKind::BlockEnd, .. }) => {}
                _ => return Err(ScriptError::at(self.offset(), "expected '}' to close block")),
            },
            Terminator::Eof => {
                if self.pos < self.tokens.len() {
                    return Err(ScriptError::at(self.offset(), "unexpected trailing token"));
                }
            }
        }

        let child_fields = chains.iter().filter(|c| c.field.is_some()).count();
        let mut block = Expr::leaf(ExprKind::Block(chains));
        block.child_fields = child_fields;
        Ok(block)
    }

    fn parse_chain(&mut self) -> Result<Expr, ScriptError> {
        let links = self.parse_chain_links()?;
        if let Some(k) = self.peek() {
            if is_conditional(k) {
                let mut result = self.parse_condition_tail(links)?;
                self.attach_expr_formatters(&mut result)?;
                return Ok(result);
            }
        }
        let mut result = self.finish_chain_links(links)?;
        self.attach_expr_formatters(&mut result)?;
        Ok(result)
    }

    fn parse_chain_links(&mut self) -> Result<Vec<Expr>, ScriptError> {
        let mut links = Vec::new();
        let mut is_first = true;
        loop {
            links.push(self.parse_chain_unit(is_first)?);
            is_first = false;
            if matches!(self.peek(), Some(TokKind::ChainLink)) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(links)
    }

    fn finish_chain_links(&self, mut links: Vec<Expr>) -> Result<Expr, ScriptError> {
        if links.len() == 1 {
            return Ok(links.pop().unwrap());
        }
        for link in &links[..links.len() - 1] {
            if link.child_fields > 0 || link.has_string_output() {
                return Err(ScriptError::at(self.offset(), "chains cannot have fields in the middle"));
            }
        }
        // An Output Field declaration at the start of a Chain binds to
        // the Chain as a whole (spec.md §4.6), not to its first link —
        // hoist it up so the output engine sees it on the Chain node.
        let field = links[0].field.take();
        let mut chain = Expr::leaf(ExprKind::Chain(links));
        chain.field = field;
        Ok(chain)
    }

    fn parse_condition_tail(&mut self, first_links: Vec<Expr>) -> Result<Expr, ScriptError> {
        let chain0 = self.finish_chain_links(first_links)?;
        if contains_field(&chain0) {
            return Err(ScriptError::at(self.offset(), "fields cannot be inside conditional expression"));
        }

        let (mut op, mut require_all) = decode_conditional(self.peek().unwrap());
        self.advance();

        let mut children = vec![chain0];
        loop {
            let links = self.parse_chain_links()?;
            let chain = self.finish_chain_links(links)?;
            if contains_field(&chain) {
                return Err(ScriptError::at(self.offset(), "fields cannot be inside conditional expression"));
            }
            children.push(chain);

            match self.peek() {
                Some(k) if is_conditional(k) => {
                    let (this_op, strict) = decode_conditional(k);
                    if this_op != op {
                        return Err(ScriptError::at(self.offset(), "mixed conditional operators in one group"));
                    }
                    require_all = require_all || strict;
                    op = this_op;
                    self.advance();
                }
                _ => break,
            }
        }

        Ok(Expr::leaf(ExprKind::BlockCondition { op, require_all, children }))
    }

    fn parse_chain_unit(&mut self, is_chain_start: bool) -> Result<Expr, ScriptError> {
        match self.peek() {
            Some(TokKind::Text(bytes)) if is_chain_start && bytes.first() == Some(&b'.') => {
                self.parse_field_led_unit(bytes.clone())
            }
            Some(TokKind::Text(_)) => {
                let bytes = match self.advance() {
                    Some(Token { kind: TokKind::Text(b), .. }) => b,
                    _ => unreachable!(),
                };
                let npattern = NPattern::compile(trim(&bytes))
                    .map_err(|e| ScriptError::at(self.offset(), e))?;
                let mut expr = Expr::leaf(ExprKind::NPattern(Box::new(npattern)));
                self.collect_node_formatters(&mut expr)?;
                Ok(expr)
            }
            Some(TokKind::BlockStart) => {
                self.advance();
                self.depth += 1;
                if self.depth > MAX_BLOCK_LEVEL {
                    return Err(ScriptError::at(self.offset(), "expression nesting too deep"));
                }
                let block = self.parse_block_content(Terminator::BlockEnd)?;
                self.depth -= 1;
                if matches!(self.peek(), Some(TokKind::NodeFormat)) {
                    let mut singular = Expr::leaf(ExprKind::Singular(Box::new(block)));
                    self.collect_node_formatters(&mut singular)?;
                    Ok(singular)
                } else {
                    Ok(block)
                }
            }
            other => Err(ScriptError::at(self.offset(), format!("unexpected token {other:?} in expression"))),
        }
    }

    fn parse_field_led_unit(&mut self, bytes: Vec<u8>) -> Result<Expr, ScriptError> {
        let (field, consumed) =
            crate::fields::parse_output_field(&bytes).map_err(|e| ScriptError::at(self.offset(), e))?;
        let remainder = &bytes[consumed..];

        if remainder.len() >= 2 && remainder.first() == Some(&b'[') && remainder.last() == Some(&b']') {
            let inner = &remainder[1..remainder.len() - 1];
            let nested_tokens = tokenize(inner).map_err(|e| ScriptError::at(self.offset(), e))?;
            let mut sub = Parser { tokens: nested_tokens, pos: 0, depth: self.depth + 1 };
            if sub.depth > MAX_BLOCK_LEVEL {
                return Err(ScriptError::at(self.offset(), "expression nesting too deep"));
            }
            let mut nested = sub.parse_block_content(Terminator::Eof)?;
            self.advance();
            let mut field = field;
            field.is_array = true;
            nested.field = Some(field);
            return Ok(nested);
        }

        if trim(remainder).is_empty() {
            self.advance();
            let mut next = self.parse_chain_unit(false)?;
            if next.field.is_some() {
                return Err(ScriptError::at(self.offset(), "duplicate output field declaration"));
            }
            next.field = Some(field);
            return Ok(next);
        }

        let npattern =
            NPattern::compile(trim(remainder)).map_err(|e| ScriptError::at(self.offset(), e))?;
        self.advance();
        let mut expr = Expr::leaf(ExprKind::NPattern(Box::new(npattern)));
        expr.field = Some(field);
        self.collect_node_formatters(&mut expr)?;
        Ok(expr)
    }

    fn collect_node_formatters(&mut self, expr: &mut Expr) -> Result<(), ScriptError> {
        while matches!(self.peek(), Some(TokKind::NodeFormat)) {
            self.advance();
            let raw = self.expect_text()?;
            let body = unquote(&raw);
            let tpl = crate::printf::compile(&body).map_err(|e| ScriptError::at(self.offset(), e))?;
            expr.node_formatters.push(tpl);
        }
        Ok(())
    }

    fn attach_expr_formatters(&mut self, expr: &mut Expr) -> Result<(), ScriptError> {
        while matches!(self.peek(), Some(TokKind::ExprFormat)) {
            if !matches!(expr.kind, ExprKind::Block(_) | ExprKind::BlockCondition { .. }) {
                return Err(ScriptError::at(
                    self.offset(),
                    "expression formatters can only follow a block or conditional",
                ));
            }
            self.advance();
            let raw = self.expect_text()?;
            expr.expr_formatters.push(ExprFormat { raw: unquote(&raw) });
        }
        Ok(())
    }
}

fn unquote(src: &[u8]) -> Vec<u8> {
    if src.len() >= 2 && (src[0] == b'"' || src[0] == b'\'') && src[src.len() - 1] == src[0] {
        crate::bytes::decode_escapes(&src[1..src.len() - 1])
    } else {
        crate::bytes::decode_escapes(trim(src))
    }
}

fn is_conditional(k: &TokKind) -> bool {
    matches!(k, TokKind::ConditionOr { .. } | TokKind::ConditionAnd { .. } | TokKind::ConditionAndBlank { .. })
}

fn decode_conditional(k: &TokKind) -> (CondOp, bool) {
    match *k {
        TokKind::ConditionOr { strict } => (CondOp::Or, strict),
        TokKind::ConditionAnd { strict } => (CondOp::And, strict),
        TokKind::ConditionAndBlank { strict } => (CondOp::AndBlank, strict),
        _ => unreachable!(),
    }
}

fn contains_field(expr: &Expr) -> bool {
    if expr.field.is_some() {
        return true;
    }
    match &expr.kind {
        ExprKind::NPattern(_) => false,
        ExprKind::Block(children) | ExprKind::Chain(children) => children.iter().any(contains_field),
        ExprKind::BlockCondition { children, .. } => children.iter().any(contains_field),
        ExprKind::Singular(inner) => contains_field(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pattern_compiles_to_block_of_one_chain() {
        let e = compile(b"a").unwrap();
        match e.kind {
            ExprKind::Block(chains) => {
                assert_eq!(chains.len(), 1);
                assert!(matches!(chains[0].kind, ExprKind::NPattern(_)));
            }
            _ => panic!("expected top-level block"),
        }
    }

    #[test]
    fn node_format_attaches_to_pattern() {
        let e = compile(br#"a | "%i\n""#).unwrap();
        let ExprKind::Block(chains) = e.kind else { panic!() };
        assert_eq!(chains[0].node_formatters.len(), 1);
    }

    #[test]
    fn chain_link_builds_chain_node() {
        let e = compile(b"a; b").unwrap();
        let ExprKind::Block(chains) = e.kind else { panic!() };
        assert!(matches!(chains[0].kind, ExprKind::Chain(_)));
    }

    #[test]
    fn nested_block() {
        let e = compile(b"{ a, b }").unwrap();
        let ExprKind::Block(chains) = e.kind else { panic!() };
        let ExprKind::Block(inner) = &chains[0].kind else { panic!("expected nested block") };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn block_followed_by_pipe_is_singular() {
        let e = compile(br#"{ a }| "%i""#).unwrap();
        let ExprKind::Block(chains) = e.kind else { panic!() };
        assert!(matches!(chains[0].kind, ExprKind::Singular(_)));
    }

    #[test]
    fn conditional_or_builds_block_condition() {
        let e = compile(b"a || b").unwrap();
        let ExprKind::Block(chains) = e.kind else { panic!() };
        match &chains[0].kind {
            ExprKind::BlockCondition { op, children, .. } => {
                assert_eq!(*op, CondOp::Or);
                assert_eq!(children.len(), 2);
            }
            _ => panic!("expected conditional"),
        }
    }

    #[test]
    fn named_field_binds_to_pattern() {
        let e = compile(br#".count.u a"#).unwrap();
        let ExprKind::Block(chains) = e.kind else { panic!() };
        assert!(chains[0].field.is_some());
    }

    #[test]
    fn array_field_sugar_produces_array_field() {
        let e = compile(br#"{ .items[ a | "%i" ] }"#).unwrap();
        let ExprKind::Block(outer) = e.kind else { panic!() };
        let ExprKind::Block(inner) = &outer[0].kind else { panic!("expected nested block") };
        let field = inner[0].field.as_ref().unwrap();
        assert!(field.is_array);
        assert_eq!(field.name.as_deref(), Some(b"items".as_ref()));
    }

    #[test]
    fn field_inside_conditional_is_rejected() {
        assert!(compile(br#".x a || b"#).is_err());
    }

    #[test]
    fn field_in_middle_of_chain_is_rejected() {
        assert!(compile(br#"{.x a}; b"#).is_err());
    }

    #[test]
    fn field_as_sole_chain_start_is_allowed() {
        assert!(compile(br#".x a ; b"#).is_ok());
    }
}
