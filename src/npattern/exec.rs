//! Enumerates the nodes a compiled [`NPattern`] matches from a set of
//! anchors (spec.md §4.5): runs the pattern's axis functions in
//! canonical order, applies the predicate list, then applies the
//! position range either per anchor or globally.

use std::collections::BTreeSet;

use crate::html::{Doc, NodeKind, TextKind};

use super::axis::{self, enumerate_axis};
use super::compile::{Hook, NPattern, Predicate, TypeFilter};

/// Runs a compiled `has` sub-expression against a candidate's descendant
/// range. Implemented by the execution engine; kept as a trait here so
/// `npattern` does not need to depend on the engine's execution state.
pub trait HasEvaluator {
    fn eval_has(&self, doc: &Doc, range: std::ops::Range<usize>, expr: &crate::expr::Expr) -> bool;
}

/// An evaluator that always fails `has` predicates; useful for testing
/// patterns that don't use `@has`.
pub struct NoHas;

impl HasEvaluator for NoHas {
    fn eval_has(&self, _doc: &Doc, _range: std::ops::Range<usize>, _expr: &crate::expr::Expr) -> bool {
        false
    }
}

/// Enumerates matches of `pattern` over `anchors`. An empty `anchors`
/// slice means "first-time enumeration": synthesize a single pass over
/// every node in document order (spec.md §4.5).
pub fn enumerate(
    doc: &Doc,
    pattern: &NPattern,
    anchors: &[usize],
    relative_parent: Option<usize>,
    evaluator: &dyn HasEvaluator,
) -> Vec<usize> {
    enumerate_positions(doc, pattern, anchors, relative_parent, evaluator)
        .into_iter()
        .map(|(node, ..)| node)
        .collect()
}

/// Like [`enumerate`], but also returns each match's `(position_absolute,
/// position_relative)` — the counters `@position`/`@position_relative`
/// hooks compare against, and what the `%P`/`%p` printf directives print.
/// Used by the execution engine, which needs these alongside the node
/// index; plain pattern matching (tests, `has` sub-expressions) only
/// needs the index, hence the thin [`enumerate`] wrapper above.
pub fn enumerate_positions(
    doc: &Doc,
    pattern: &NPattern,
    anchors: &[usize],
    relative_parent: Option<usize>,
    evaluator: &dyn HasEvaluator,
) -> Vec<(usize, i64, i64)> {
    if anchors.is_empty() {
        let mut matches = Vec::new();
        let mut position_rel = 0i64;
        for node in 0..doc.nodes.len() {
            if !node_matches(doc, pattern, node, node, position_rel, position_rel, evaluator) {
                continue;
            }
            matches.push((node, position_rel, position_rel));
            position_rel += 1;
            if let Some(max) = pattern.range.predict_max() {
                if matches.len() as u64 >= max {
                    break;
                }
            }
        }
        return apply_range(pattern, matches);
    }

    let axes = pattern.axis_mask.simplify();
    let mut global_position = 0i64;
    let mut absolute_acc = Vec::new();
    let mut result = Vec::new();

    for &anchor in anchors {
        let mut seen = BTreeSet::new();
        let mut per_anchor = Vec::new();
        let mut position_rel = 0i64;
        'axes: for axis in &axes {
            for node in enumerate_axis(doc, anchor, *axis, relative_parent) {
                if !seen.insert(node) {
                    continue;
                }
                if !node_matches(doc, pattern, node, anchor, global_position, position_rel, evaluator) {
                    continue;
                }
                per_anchor.push((node, global_position, position_rel));
                position_rel += 1;
                global_position += 1;
                if !pattern.absolute {
                    if let Some(max) = pattern.range.predict_max() {
                        if per_anchor.len() as u64 >= max {
                            break 'axes;
                        }
                    }
                }
            }
        }
        if pattern.absolute {
            absolute_acc.extend(per_anchor);
        } else {
            result.extend(apply_range(pattern, per_anchor));
        }
    }

    if pattern.absolute {
        return apply_range(pattern, absolute_acc);
    }
    result
}

fn apply_range(pattern: &NPattern, matches: Vec<(usize, i64, i64)>) -> Vec<(usize, i64, i64)> {
    if pattern.range.is_empty() {
        return matches;
    }
    let total = matches.len() as u64;
    matches
        .into_iter()
        .enumerate()
        .filter(|(i, _)| pattern.range.matches(*i as i64, Some(total)))
        .map(|(_, m)| m)
        .collect()
}

fn node_matches(
    doc: &Doc,
    pattern: &NPattern,
    node: usize,
    anchor: usize,
    position: i64,
    position_relative: i64,
    evaluator: &dyn HasEvaluator,
) -> bool {
    if !type_filter_matches(pattern.type_filter, doc.nodes[node].kind) {
        return false;
    }
    pattern
        .predicates
        .iter()
        .all(|p| predicate_matches(doc, p, node, anchor, position, position_relative, evaluator))
}

fn type_filter_matches(filter: TypeFilter, kind: NodeKind) -> bool {
    match filter {
        TypeFilter::Tag => kind.is_tag(),
        TypeFilter::Comment => kind.is_comment(),
        TypeFilter::Text => matches!(kind, NodeKind::Text(TextKind::Normal)),
        TypeFilter::TextNoErr => {
            matches!(kind, NodeKind::Text(TextKind::Normal) | NodeKind::Text(TextKind::Empty))
        }
        TypeFilter::TextErr => matches!(kind, NodeKind::Text(TextKind::Error)),
        TypeFilter::TextEmpty => matches!(kind, NodeKind::Text(TextKind::Empty)),
        TypeFilter::TextAll => kind.is_text(),
    }
}

fn predicate_matches(
    doc: &Doc,
    predicate: &Predicate,
    node: usize,
    anchor: usize,
    position: i64,
    position_relative: i64,
    evaluator: &dyn HasEvaluator,
) -> bool {
    match predicate {
        Predicate::Hook(hook) => hook_matches(doc, hook, node, anchor, position, position_relative, evaluator),
        Predicate::Attr(attr) => attr_matches(doc, attr, node),
        Predicate::Group(alts) => alts.iter().any(|alt| {
            alt.iter()
                .all(|p| predicate_matches(doc, p, node, anchor, position, position_relative, evaluator))
        }),
    }
}

fn hook_matches(
    doc: &Doc,
    hook: &Hook,
    node: usize,
    anchor: usize,
    position: i64,
    position_relative: i64,
    evaluator: &dyn HasEvaluator,
) -> bool {
    let n = &doc.nodes[node];
    match hook {
        Hook::Level(r) => r.matches(n.lvl as i64, None),
        Hook::LevelRelative(r) => r.matches(n.lvl as i64 - doc.nodes[anchor].lvl as i64, None),
        Hook::TagCount(r) => r.matches(n.tag_count as i64, None),
        Hook::CommentsCount(r) => r.matches(n.comment_count as i64, None),
        Hook::TextCount(r) => r.matches(n.text_count as i64, None),
        Hook::AllCount(r) => r.matches(n.descendant_count() as i64, None),
        Hook::Position(r) => r.matches(position, None),
        Hook::PositionRelative(r) => r.matches(position_relative, None),
        Hook::Index(r) => r.matches(axis::sibling_index(doc, node) as i64, None),
        Hook::Attributes(r) => r.matches(doc.attrs_of(node).len() as i64, None),
        Hook::Name(p) => p.matches(doc.node_tag_name(n)),
        Hook::All(p) => p.matches(doc.node_all(n)),
        Hook::Insides(p) => p.matches(doc.node_insides(n)),
        Hook::Start(p) => p.matches(start_tag_span(doc, n)),
        Hook::End(p) => p.matches(end_tag_span(doc, n)),
        Hook::EndStrip(p) => p.matches(strip_end_tag(end_tag_span(doc, n))),
        Hook::Has(expr) => evaluator.eval_has(doc, doc.descendants_range(node), expr),
    }
}

fn start_tag_span<'a>(doc: &'a Doc, n: &crate::html::CNode) -> &'a [u8] {
    doc.slice(n.all_offset, n.insides_offset)
}

fn end_tag_span<'a>(doc: &'a Doc, n: &crate::html::CNode) -> &'a [u8] {
    let start = n.insides_offset + n.insides_len;
    doc.slice(n.all_offset + start, n.all_len - start)
}

fn strip_end_tag(s: &[u8]) -> &[u8] {
    let s = s.strip_prefix(b"</").unwrap_or(s);
    let s = s.strip_suffix(b">").unwrap_or(s);
    crate::bytes::trim(s)
}

fn attr_matches(doc: &Doc, pred: &super::compile::AttrPredicate, node: usize) -> bool {
    let attrs = doc.attrs_of(node);
    let total = attrs.len() as u64;
    let raw = attrs.iter().enumerate().any(|(i, a)| {
        pred.position.matches(i as i64, Some(total))
            && pred.name.matches(doc.attr_key(a))
            && pred.value.as_ref().is_none_or(|v| v.matches(doc.attr_value(a)))
    });
    raw ^ pred.invert
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse, ParseOptions};

    fn doc(s: &str) -> Doc {
        parse(s.as_bytes().to_vec(), ParseOptions::default(), None).unwrap()
    }

    #[test]
    fn name_hook_matches_tag_by_name() {
        let d = doc("<a/><b/><a/>");
        let pattern = NPattern::compile(b"a").unwrap();
        let matches = enumerate(&d, &pattern, &[], None, &NoHas);
        assert_eq!(matches, vec![0, 2]);
    }

    #[test]
    fn position_range_applies_per_match_index() {
        let d = doc("<div><p>1</p><p>2</p><p>3</p></div>");
        let pattern = NPattern::compile(b"p [1]").unwrap();
        let matches = enumerate(&d, &pattern, &[], None, &NoHas);
        assert_eq!(matches.len(), 1);
        assert_eq!(d.node_insides(&d.nodes[matches[0]]), b"2");
    }

    #[test]
    fn class_predicate() {
        let d = doc(r#"<p class="a b">t</p>"#);
        let pattern = NPattern::compile(b"p .a").unwrap();
        let matches = enumerate(&d, &pattern, &[], None, &NoHas);
        assert_eq!(matches, vec![0]);
    }

    #[test]
    fn axis_chain_children_of_anchor() {
        let d = doc("<a><b/><c/><b/></a>");
        let a_pattern = NPattern::compile(b"a").unwrap();
        let anchors = enumerate(&d, &a_pattern, &[], None, &NoHas);
        let b_pattern = NPattern::compile(b"b").unwrap();
        let matches = enumerate(&d, &b_pattern, &anchors, None, &NoHas);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn descendants_axis_includes_nested() {
        let d = doc("<a><b><c/></b></a>");
        let pattern = NPattern::compile(b"@descendants c").unwrap();
        let anchors = vec![0usize];
        let matches = enumerate(&d, &pattern, &anchors, None, &NoHas);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn type_filter_text() {
        let d = doc("<a>hi</a>");
        let pattern = NPattern::compile(b"@text *").unwrap();
        let matches = enumerate(&d, &pattern, &[], None, &NoHas);
        assert_eq!(matches.len(), 1);
        assert_eq!(d.node_all(&d.nodes[matches[0]]), b"hi");
    }

    #[test]
    fn group_alternatives_match_or() {
        let d = doc(r#"<a id="x"/><a class="y"/><a/>"#);
        let pattern = NPattern::compile(b"a (#x)(.y)").unwrap();
        let matches = enumerate(&d, &pattern, &[], None, &NoHas);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn negated_attribute_predicate() {
        let d = doc(r#"<a href="x"/><a/>"#);
        let pattern = NPattern::compile(b"a -href").unwrap();
        let matches = enumerate(&d, &pattern, &[], None, &NoHas);
        assert_eq!(matches, vec![1]);
    }
}
