//! The node printf mini-language (spec.md §6): the template language
//! used by node formatters (`|`) and the `-l` listing shortcut.
//!
//! `%U` and `%D` are modifier flags: they don't emit anything themselves,
//! they change how the *next* directive renders (untrimmed insides,
//! entity-decoded text). Entity decoding itself is an external
//! collaborator (spec.md §1 non-goals); `%D` is wired to a pluggable
//! hook that defaults to the identity function.

use crate::bytes::trim;
use crate::html::{CNode, Doc, NodeKind, TextKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountKind {
    All,
    Text,
    Comment,
}

#[derive(Debug, Clone)]
enum Directive {
    Literal(Vec<u8>),
    TagName,
    Insides { untrim: bool, decode: bool },
    TextShallow { untrim: bool, decode: bool },
    TextRecursive { untrim: bool, decode: bool },
    AllAttributes,
    AttrValue(Option<Vec<u8>>),
    RawAll,
    StartTag,
    EndTagStripped,
    EndTagRaw,
    LevelRelative,
    LevelAbsolute,
    AllLen,
    ChildTagCount,
    ChildCounts(Vec<CountKind>),
    PositionRelative,
    PositionAbsolute,
    ByteOffset,
    Percent,
}

/// A compiled format template, ready to render against any `(Doc, node,
/// parent)` triple.
#[derive(Debug, Clone, Default)]
pub struct Template(Vec<Directive>);

/// Per-render context the engine threads through: `parent` backs
/// relative directives (`%l`, `%p`) when the node was reached through a
/// `relative_parent` axis hop; `position` is the node's position within
/// its current result set (for `%p`/`%P`, which otherwise coincide).
pub struct RenderContext {
    pub parent: Option<usize>,
    pub position_relative: i64,
    pub position_absolute: i64,
}

/// Decodes HTML entities in `s`. The entity table itself is an external
/// collaborator (spec.md §1); this default implementation is the
/// identity function, matching "specify only the contract".
pub fn default_entity_decode(s: &[u8]) -> Vec<u8> {
    s.to_vec()
}

pub fn compile(src: &[u8]) -> Result<Template, String> {
    let mut out = Vec::new();
    let mut literal = Vec::new();
    let mut untrim = false;
    let mut decode = false;
    let mut i = 0;
    while i < src.len() {
        if src[i] != b'%' {
            literal.push(src[i]);
            i += 1;
            continue;
        }
        if !literal.is_empty() {
            out.push(Directive::Literal(std::mem::take(&mut literal)));
        }
        i += 1;
        let c = *src.get(i).ok_or_else(|| "dangling '%' at end of format string".to_string())?;
        i += 1;
        match c {
            b'%' => out.push(Directive::Percent),
            b'U' => {
                untrim = true;
                continue;
            }
            b'D' => {
                decode = true;
                continue;
            }
            b'n' => out.push(Directive::TagName),
            b'i' => out.push(Directive::Insides { untrim, decode }),
            b't' => out.push(Directive::TextShallow { untrim, decode }),
            b'T' => out.push(Directive::TextRecursive { untrim, decode }),
            b'a' => out.push(Directive::AllAttributes),
            b'v' => {
                if src.get(i) == Some(&b'(') {
                    let close = src[i..]
                        .iter()
                        .position(|&b| b == b')')
                        .ok_or_else(|| "unterminated '%v(' directive".to_string())?;
                    let key = src[i + 1..i + close].to_vec();
                    i += close + 1;
                    out.push(Directive::AttrValue(Some(key)));
                } else {
                    out.push(Directive::AttrValue(None));
                }
            }
            b'A' => out.push(Directive::RawAll),
            b'S' => out.push(Directive::StartTag),
            b'e' => out.push(Directive::EndTagStripped),
            b'E' => out.push(Directive::EndTagRaw),
            b'l' => out.push(Directive::LevelRelative),
            b'L' => out.push(Directive::LevelAbsolute),
            b's' => out.push(Directive::AllLen),
            b'c' => out.push(Directive::ChildTagCount),
            b'C' => {
                if src.get(i) != Some(&b'{') {
                    return Err("'%C' requires a '{a,t,c}' argument".to_string());
                }
                let close = src[i..]
                    .iter()
                    .position(|&b| b == b'}')
                    .ok_or_else(|| "unterminated '%C{' directive".to_string())?;
                let body = &src[i + 1..i + close];
                i += close + 1;
                let mut kinds = Vec::new();
                for part in body.split(|&b| b == b',') {
                    kinds.push(match part {
                        b"a" => CountKind::All,
                        b"t" => CountKind::Text,
                        b"c" => CountKind::Comment,
                        other => {
                            return Err(format!(
                                "unknown '%C' selector '{}'",
                                String::from_utf8_lossy(other)
                            ))
                        }
                    });
                }
                out.push(Directive::ChildCounts(kinds));
            }
            b'p' => out.push(Directive::PositionRelative),
            b'P' => out.push(Directive::PositionAbsolute),
            b'I' => out.push(Directive::ByteOffset),
            other => return Err(format!("unknown printf directive '%{}'", other as char)),
        }
        untrim = false;
        decode = false;
    }
    if !literal.is_empty() {
        out.push(Directive::Literal(literal));
    }
    Ok(Template(out))
}

impl Template {
    pub fn render(&self, doc: &Doc, node: usize, ctx: &RenderContext, out: &mut Vec<u8>) {
        let n = &doc.nodes[node];
        for d in &self.0 {
            render_directive(d, doc, node, n, ctx, out);
        }
    }
}

fn render_directive(d: &Directive, doc: &Doc, node: usize, n: &CNode, ctx: &RenderContext, out: &mut Vec<u8>) {
    match d {
        Directive::Literal(s) => out.extend_from_slice(s),
        Directive::Percent => out.push(b'%'),
        Directive::TagName => out.extend_from_slice(doc.node_tag_name(n)),
        Directive::Insides { untrim, decode } => {
            let s = doc.node_insides(n);
            let s = if *untrim { s } else { trim(s) };
            emit_maybe_decoded(s, *decode, out);
        }
        Directive::TextShallow { untrim, decode } => {
            let mut buf = Vec::new();
            collect_text(doc, node, false, &mut buf);
            let s = if *untrim { &buf[..] } else { trim(&buf) };
            emit_maybe_decoded(s, *decode, out);
        }
        Directive::TextRecursive { untrim, decode } => {
            let mut buf = Vec::new();
            collect_text(doc, node, true, &mut buf);
            let s = if *untrim { &buf[..] } else { trim(&buf) };
            emit_maybe_decoded(s, *decode, out);
        }
        Directive::AllAttributes => {
            for (i, a) in doc.attrs_of(node).iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                out.extend_from_slice(doc.attr_key(a));
                out.extend_from_slice(b"=\"");
                out.extend_from_slice(doc.attr_value(a));
                out.push(b'"');
            }
        }
        Directive::AttrValue(key) => match key {
            Some(k) => {
                if let Some(a) = doc.find_attr(node, k) {
                    out.extend_from_slice(doc.attr_value(a));
                }
            }
            None => {
                if let Some(a) = doc.attrs_of(node).first() {
                    out.extend_from_slice(doc.attr_value(a));
                }
            }
        },
        Directive::RawAll => out.extend_from_slice(doc.node_all(n)),
        Directive::StartTag => out.extend_from_slice(doc.slice(n.all_offset, n.insides_offset)),
        Directive::EndTagStripped => {
            let s = end_tag_span(doc, n);
            let s = s.strip_prefix(b"</").unwrap_or(s);
            let s = s.strip_suffix(b">").unwrap_or(s);
            out.extend_from_slice(trim(s));
        }
        Directive::EndTagRaw => out.extend_from_slice(end_tag_span(doc, n)),
        Directive::LevelRelative => {
            let parent_lvl = ctx.parent.map(|p| doc.nodes[p].lvl as i64).unwrap_or(-1);
            out.extend_from_slice((n.lvl as i64 - parent_lvl).to_string().as_bytes());
        }
        Directive::LevelAbsolute => out.extend_from_slice(n.lvl.to_string().as_bytes()),
        Directive::AllLen => out.extend_from_slice(n.all_len.to_string().as_bytes()),
        Directive::ChildTagCount => {
            out.extend_from_slice(child_tag_count(doc, node).to_string().as_bytes())
        }
        Directive::ChildCounts(kinds) => {
            for (i, k) in kinds.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                let v = match k {
                    CountKind::All => n.descendant_count(),
                    CountKind::Text => n.text_count,
                    CountKind::Comment => n.comment_count,
                };
                out.extend_from_slice(v.to_string().as_bytes());
            }
        }
        Directive::PositionRelative => out.extend_from_slice(ctx.position_relative.to_string().as_bytes()),
        Directive::PositionAbsolute => out.extend_from_slice(ctx.position_absolute.to_string().as_bytes()),
        Directive::ByteOffset => out.extend_from_slice(n.all_offset.to_string().as_bytes()),
    }
}

fn emit_maybe_decoded(s: &[u8], decode: bool, out: &mut Vec<u8>) {
    if decode {
        out.extend_from_slice(&default_entity_decode(s));
    } else {
        out.extend_from_slice(s);
    }
}

fn end_tag_span<'a>(doc: &'a Doc, n: &CNode) -> &'a [u8] {
    let start = n.insides_offset + n.insides_len;
    doc.slice(n.all_offset + start, n.all_len - start)
}

fn child_tag_count(doc: &Doc, node: usize) -> u32 {
    let n = &doc.nodes[node];
    let child_lvl = n.lvl + 1;
    let range = doc.descendants_range(node);
    let mut count = 0u32;
    let mut i = range.start;
    while i < range.end {
        if doc.nodes[i].lvl == child_lvl {
            if doc.nodes[i].kind.is_tag() {
                count += 1;
            }
            i += 1 + doc.nodes[i].descendant_count() as usize;
        } else {
            i += 1;
        }
    }
    count
}

fn collect_text(doc: &Doc, node: usize, recursive: bool, out: &mut Vec<u8>) {
    let n = &doc.nodes[node];
    let child_lvl = n.lvl + 1;
    let range = doc.descendants_range(node);
    let mut i = range.start;
    while i < range.end {
        let child = &doc.nodes[i];
        let is_direct = child.lvl == child_lvl;
        if is_direct && matches!(child.kind, NodeKind::Text(TextKind::Normal | TextKind::Empty)) {
            out.extend_from_slice(doc.node_all(child));
        }
        if recursive || !is_direct {
            i += 1;
        } else {
            i += 1 + child.descendant_count() as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse, ParseOptions};

    fn doc(s: &str) -> Doc {
        parse(s.as_bytes().to_vec(), ParseOptions::default(), None).unwrap()
    }

    fn ctx() -> RenderContext {
        RenderContext { parent: None, position_relative: 0, position_absolute: 0 }
    }

    #[test]
    fn renders_tag_name_and_insides() {
        let d = doc("<a>hi</a>");
        let tpl = compile(b"%n:%i").unwrap();
        let mut out = Vec::new();
        tpl.render(&d, 0, &ctx(), &mut out);
        assert_eq!(out, b"a:hi");
    }

    #[test]
    fn literal_percent() {
        let d = doc("<a/>");
        let tpl = compile(b"100%%").unwrap();
        let mut out = Vec::new();
        tpl.render(&d, 0, &ctx(), &mut out);
        assert_eq!(out, b"100%");
    }

    #[test]
    fn attr_value_by_name() {
        let d = doc(r#"<a href="x">t</a>"#);
        let tpl = compile(b"%v(href)").unwrap();
        let mut out = Vec::new();
        tpl.render(&d, 0, &ctx(), &mut out);
        assert_eq!(out, b"x");
    }

    #[test]
    fn absolute_level() {
        let d = doc("<a><b/></a>");
        let b = 1;
        let tpl = compile(b"%L").unwrap();
        let mut out = Vec::new();
        tpl.render(&d, b, &ctx(), &mut out);
        assert_eq!(out, b"1");
    }

    #[test]
    fn untrim_modifier_applies_only_to_next_directive() {
        let d = doc("<a>  hi  </a>");
        let tpl = compile(b"[%Ui][%i]").unwrap();
        let mut out = Vec::new();
        tpl.render(&d, 0, &ctx(), &mut out);
        assert_eq!(out, b"[  hi  ][hi]");
    }

    #[test]
    fn unknown_directive_is_a_compile_error() {
        assert!(compile(b"%Q").is_err());
    }
}
