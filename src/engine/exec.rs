//! Tree-walking evaluator and renderer (spec.md §4.7 `exec_block` /
//! `exec_chain` / `exec_table` / `exec_block_conditional` /
//! `exec_singular`, and §4.8's Raw/Structured split).
//!
//! [`Engine::eval_matches`] is the pure "which nodes does this
//! expression select" pass, used for chain threading and for `@has`
//! sub-expressions. [`Engine::render`] and friends are the rendering
//! pass: they re-walk the same tree producing bytes, re-running
//! [`crate::npattern::enumerate_positions`] where needed rather than
//! threading match lists through from the eval pass, since a render call
//! needs each match's position alongside its node index and a chain's
//! non-last links never need rendering at all.

use crate::expr::{CondOp, Expr, ExprKind};
use crate::fields;
use crate::html::Doc;
use crate::npattern::{self, HasEvaluator};
use crate::printf::{RenderContext, Template};

/// Borrows a [`Doc`] for the lifetime of one query evaluation. Stateless
/// beyond that: `@has` predicates recurse back into the same engine via
/// [`HasEvaluator`].
pub struct Engine<'d> {
    doc: &'d Doc,
}

impl<'d> Engine<'d> {
    pub fn new(doc: &'d Doc) -> Self {
        Self { doc }
    }

    /// Renders the compiled query's full output (spec.md §4.8): raw text
    /// if no expression in the tree carries an output field, structured
    /// JSON-style output otherwise.
    pub fn run(&self, expr: &Expr) -> Vec<u8> {
        let raw_mode = !expr.uses_fields();
        if raw_mode {
            self.render_content(expr, &[], None, raw_mode)
        } else {
            self.render(expr, &[], None, raw_mode)
        }
    }

    // ---- matching (pure; no rendering) --------------------------------

    /// The set of nodes `expr` selects, starting from `anchors`. Used for
    /// chain threading and by [`HasEvaluator::eval_has`]; never used
    /// directly for output, since it discards position information.
    fn eval_matches(&self, expr: &Expr, anchors: &[usize], relative_parent: Option<usize>) -> Vec<usize> {
        match &expr.kind {
            ExprKind::NPattern(pattern) => npattern::enumerate(self.doc, pattern, anchors, relative_parent, self),
            ExprKind::Block(children) => {
                children.iter().flat_map(|c| self.eval_matches(c, anchors, relative_parent)).collect()
            }
            ExprKind::Chain(links) => self.eval_chain_matches(links, anchors, relative_parent),
            ExprKind::BlockCondition { op, require_all, children } => {
                self.eval_condition_matches(*op, *require_all, children, anchors, relative_parent)
            }
            ExprKind::Singular(inner) => {
                anchors.iter().flat_map(|&a| self.eval_matches(inner, &[a], relative_parent)).collect()
            }
        }
    }

    fn eval_chain_matches(&self, links: &[Expr], anchors: &[usize], relative_parent: Option<usize>) -> Vec<usize> {
        let mut cur = anchors.to_vec();
        for link in links {
            cur = self.eval_matches(link, &cur, relative_parent);
            if cur.is_empty() {
                return Vec::new();
            }
        }
        cur
    }

    fn eval_condition_matches(
        &self,
        op: CondOp,
        require_all: bool,
        children: &[Expr],
        anchors: &[usize],
        relative_parent: Option<usize>,
    ) -> Vec<usize> {
        let mut out = Vec::new();
        let mut any = false;
        let mut all = true;
        for child in children {
            let m = self.eval_matches(child, anchors, relative_parent);
            let succeeded = !m.is_empty();
            any |= succeeded;
            all &= succeeded;
            out.extend(m);
            match op {
                CondOp::Or if succeeded && !require_all => break,
                CondOp::And if !succeeded => break,
                _ => {}
            }
        }
        let overall = match op {
            CondOp::Or => {
                if require_all {
                    all
                } else {
                    any
                }
            }
            CondOp::And => all,
            CondOp::AndBlank => any,
        };
        if overall {
            out
        } else {
            Vec::new()
        }
    }

    // ---- rendering ------------------------------------------------------

    /// Renders `expr` as a value: applies its own output field (wrapping
    /// the content in a JSON string/number/array per its type chain, or
    /// building a `[...]` array for `.name[...]` array fields) if it has
    /// one, otherwise just its content.
    fn render(&self, expr: &Expr, anchors: &[usize], relative_parent: Option<usize>, raw_mode: bool) -> Vec<u8> {
        match &expr.field {
            Some(field) if field.is_array => {
                let elements = self.render_elements(expr, anchors, relative_parent);
                let values: Vec<serde_json::Value> = elements
                    .iter()
                    .map(|el| {
                        let mut rendered = Vec::new();
                        fields::render_chain(&field.types, el, self.doc, &mut rendered);
                        serde_json::from_slice(&rendered).unwrap_or(serde_json::Value::Null)
                    })
                    .collect();
                serde_json::to_vec(&serde_json::Value::Array(values)).expect("array serialization cannot fail")
            }
            Some(field) => {
                let content = self.render_content(expr, anchors, relative_parent, raw_mode);
                let mut out = Vec::new();
                fields::render_chain(&field.types, &content, self.doc, &mut out);
                out
            }
            None => self.render_content(expr, anchors, relative_parent, raw_mode),
        }
    }

    /// Renders `expr.kind` on its own (ignoring `expr.field`, which
    /// [`Self::render`] already handled), applying `expr.expr_formatters`
    /// to the result last. `raw_mode` is decided once for the whole query
    /// (spec.md §4.8): it only changes the default (no node formatter)
    /// rendering of a bare `NPattern` match — a trailing newline in raw
    /// mode, nothing extra inside a structured field's value buffer.
    fn render_content(&self, expr: &Expr, anchors: &[usize], relative_parent: Option<usize>, raw_mode: bool) -> Vec<u8> {
        let mut buf = match &expr.kind {
            ExprKind::NPattern(pattern) => {
                let matches = npattern::enumerate_positions(self.doc, pattern, anchors, relative_parent, self);
                let mut b = Vec::new();
                for (node, pos_abs, pos_rel) in matches {
                    self.render_match(&expr.node_formatters, node, relative_parent, pos_abs, pos_rel, raw_mode, &mut b);
                }
                b
            }
            ExprKind::Block(children) => self.render_block(children, anchors, relative_parent, raw_mode),
            ExprKind::Chain(links) => self.render_chain(links, anchors, relative_parent, raw_mode),
            ExprKind::BlockCondition { op, require_all, children } => {
                self.render_condition(*op, *require_all, children, anchors, relative_parent, raw_mode)
            }
            ExprKind::Singular(inner) => {
                let mut b = Vec::new();
                for &a in anchors {
                    b.extend(self.render(inner, &[a], relative_parent, raw_mode));
                }
                b
            }
        };
        for f in &expr.expr_formatters {
            buf = f.apply(&buf);
        }
        buf
    }

    /// A Block with no field-bearing children concatenates their content
    /// (spec.md §4.8's "no-fields block", usable as a plain value
    /// anywhere a Chain link or array element is expected). A Block with
    /// at least one named field builds a JSON object; a Block whose only
    /// field child is unnamed is transparent and renders as that child's
    /// value directly.
    fn render_block(&self, children: &[Expr], anchors: &[usize], relative_parent: Option<usize>, raw_mode: bool) -> Vec<u8> {
        let field_children: Vec<&Expr> = children.iter().filter(|c| c.field.is_some()).collect();
        if field_children.is_empty() {
            let mut buf = Vec::new();
            for c in children {
                buf.extend(self.render(c, anchors, relative_parent, raw_mode));
            }
            return buf;
        }
        let any_named = field_children.iter().any(|c| c.field.as_ref().unwrap().name.is_some());
        if !any_named && field_children.len() == 1 {
            return self.render(field_children[0], anchors, relative_parent, raw_mode);
        }
        let mut map = serde_json::Map::new();
        for c in &field_children {
            let name = match c.field.as_ref().unwrap().name.as_ref() {
                Some(name) => String::from_utf8_lossy(name).into_owned(),
                None => String::new(),
            };
            let rendered = self.render(c, anchors, relative_parent, raw_mode);
            let value = serde_json::from_slice(&rendered).unwrap_or(serde_json::Value::Null);
            map.insert(name, value);
        }
        serde_json::to_vec(&serde_json::Value::Object(map)).expect("object serialization cannot fail")
    }

    /// Threads anchors through every link but the last (pure filtering);
    /// renders only the last link, which carries the chain's eventual
    /// value (and, per the parser's field-hoisting, the chain's own
    /// output field if one was declared at its start).
    fn render_chain(&self, links: &[Expr], anchors: &[usize], relative_parent: Option<usize>, raw_mode: bool) -> Vec<u8> {
        let mut cur = anchors.to_vec();
        for link in &links[..links.len().saturating_sub(1)] {
            cur = self.eval_matches(link, &cur, relative_parent);
            if cur.is_empty() {
                return Vec::new();
            }
        }
        match links.last() {
            Some(last) => self.render(last, &cur, relative_parent, raw_mode),
            None => Vec::new(),
        }
    }

    /// Output fields cannot appear anywhere inside a conditional (the
    /// parser rejects them), so a conditional's content is always plain
    /// text: render whichever alternative(s) the condition's operator
    /// selects, in order, and return empty if the condition overall
    /// fails.
    fn render_condition(
        &self,
        op: CondOp,
        require_all: bool,
        children: &[Expr],
        anchors: &[usize],
        relative_parent: Option<usize>,
        raw_mode: bool,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut any = false;
        let mut all = true;
        for child in children {
            let succeeded = !self.eval_matches(child, anchors, relative_parent).is_empty();
            any |= succeeded;
            all &= succeeded;
            if succeeded {
                buf.extend(self.render(child, anchors, relative_parent, raw_mode));
            }
            match op {
                CondOp::Or if succeeded && !require_all => break,
                CondOp::And if !succeeded => break,
                _ => {}
            }
        }
        let overall = match op {
            CondOp::Or => {
                if require_all {
                    all
                } else {
                    any
                }
            }
            CondOp::And => all,
            CondOp::AndBlank => any,
        };
        if overall {
            buf
        } else {
            Vec::new()
        }
    }

    /// The per-element render pass for `.name[...]` array fields: one
    /// buffer per leaf match, rather than one concatenated buffer. Mirrors
    /// [`Self::render_content`]'s dispatch, but a `Singular` collapses
    /// each anchor's whole inner render into a single element (it still
    /// iterates one at a time; it just doesn't flatten further) while a
    /// `Block`/`Chain` flattens through to their leaf `NPattern` matches.
    fn render_elements(&self, expr: &Expr, anchors: &[usize], relative_parent: Option<usize>) -> Vec<Vec<u8>> {
        match &expr.kind {
            ExprKind::NPattern(pattern) => {
                let matches = npattern::enumerate_positions(self.doc, pattern, anchors, relative_parent, self);
                matches
                    .into_iter()
                    .map(|(node, pos_abs, pos_rel)| {
                        let mut b = Vec::new();
                        self.render_match(&expr.node_formatters, node, relative_parent, pos_abs, pos_rel, false, &mut b);
                        for f in &expr.expr_formatters {
                            b = f.apply(&b);
                        }
                        b
                    })
                    .collect()
            }
            ExprKind::Block(children) => {
                children.iter().flat_map(|c| self.render_elements(c, anchors, relative_parent)).collect()
            }
            ExprKind::Chain(links) => {
                let mut cur = anchors.to_vec();
                for link in &links[..links.len().saturating_sub(1)] {
                    cur = self.eval_matches(link, &cur, relative_parent);
                    if cur.is_empty() {
                        return Vec::new();
                    }
                }
                match links.last() {
                    Some(last) => self.render_elements(last, &cur, relative_parent),
                    None => Vec::new(),
                }
            }
            ExprKind::BlockCondition { .. } => {
                vec![self.render_content(expr, anchors, relative_parent, false)]
            }
            ExprKind::Singular(inner) => {
                anchors.iter().map(|&a| self.render(inner, &[a], relative_parent, false)).collect()
            }
        }
    }

    /// Renders one matched node: the last bound node formatter if there
    /// is one, or else the node's raw `all` span — with a trailing
    /// newline only in whole-query raw mode (spec.md §4.8 "Raw").
    fn render_match(
        &self,
        formatters: &[Template],
        node: usize,
        relative_parent: Option<usize>,
        pos_abs: i64,
        pos_rel: i64,
        raw_mode: bool,
        out: &mut Vec<u8>,
    ) {
        let ctx = RenderContext { parent: relative_parent, position_relative: pos_rel, position_absolute: pos_abs };
        match formatters.last() {
            Some(tpl) => tpl.render(self.doc, node, &ctx, out),
            None => {
                out.extend_from_slice(self.doc.node_all(&self.doc.nodes[node]));
                if raw_mode {
                    out.push(b'\n');
                }
            }
        }
    }
}

impl HasEvaluator for Engine<'_> {
    fn eval_has(&self, _doc: &Doc, range: std::ops::Range<usize>, expr: &Expr) -> bool {
        let anchors: Vec<usize> = range.collect();
        !self.eval_matches(expr, &anchors, None).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse, ParseOptions};

    fn doc(s: &str) -> Doc {
        parse(s.as_bytes().to_vec(), ParseOptions::default(), None).unwrap()
    }

    #[test]
    fn raw_node_formatter_per_match() {
        let d = doc("<a>1</a><a>2</a>");
        let expr = crate::expr::compile(br#"a | "%i\n""#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, b"1\n2\n");
    }

    #[test]
    fn raw_with_autoclosed_li() {
        let d = doc("<ul><li>x<li>y</ul>");
        let expr = crate::expr::compile(br#"li | "%n:%i\n""#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, b"li:x\nli:y\n");
    }

    #[test]
    fn raw_class_predicate() {
        let d = doc(r#"<p class="a b">t</p>"#);
        let expr = crate::expr::compile(br#"p .a | "%i\n""#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, b"t\n");
    }

    #[test]
    fn raw_position_filter() {
        let d = doc("<div><p>1</p><p>2</p><p>3</p></div>");
        let expr = crate::expr::compile(br#"p [1] | "%i\n""#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, b"2\n");
    }

    #[test]
    fn raw_chain_threading() {
        let d = doc("<a><b/><c/><b/></a>");
        let expr = crate::expr::compile(br#"a; b | "%p\n""#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, b"0\n1\n");
    }

    #[test]
    fn structured_array_field() {
        let d = doc("<a>1</a><a>2</a>");
        let expr = crate::expr::compile(br#"{ .items[ a | "%i" ] }"#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, br#"{"items":["1","2"]}"#);
    }

    #[test]
    fn structured_named_scalar_field() {
        let d = doc(r#"<p id="x">hi</p>"#);
        let expr = crate::expr::compile(br#"{ .name.s p | "%v(id)", .text.s p | "%i" }"#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, br#"{"name":"x","text":"hi"}"#);
    }

    #[test]
    fn structured_unnamed_single_field_is_transparent() {
        let d = doc("<a>hi</a>");
        let expr = crate::expr::compile(br#"{ ..s a | "%i" }"#).unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, br#""hi""#);
    }

    #[test]
    fn has_predicate_runs_against_live_engine() {
        let d = doc("<div><a/></div><div></div>");
        let expr = crate::expr::compile(b"div @has(a)").unwrap();
        let out = Engine::new(&d).run(&expr);
        assert_eq!(out, d.node_all(&d.nodes[0]).to_vec() + b"\n");
    }
}
