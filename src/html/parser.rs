//! The tokenizer/tree builder (spec.md §4.1). Single pass, permissive,
//! producing the flat `nodes`/`attribs` arrays of [`crate::html::Doc`].
//!
//! The original algorithm is described recursively (one stack frame per
//! open tag). This implementation is the equivalent iterative form: an
//! explicit `Vec<OpenTag>` stands in for the call stack, `lvl` is always
//! `stack.len()` at the moment a node is emitted, and "close k levels"
//! becomes "pop k entries". This keeps the real recursion bound
//! (`MAX_NODE_LEVEL`) a simple length check instead of native stack
//! depth, and reads the same as the spec's description node for node.

use crate::bytes::{eq_ignore_case, is_alpha, is_space, is_tag_name_cont};
use crate::error::HtmlError;
use crate::html::node::{CAttr, CNode, Doc, NodeKind, TextKind};
use crate::html::tags;

pub const MAX_NODE_LEVEL: usize = 8192;
pub const MAX_NODE_LEVEL_SMALL_STACK: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Emit `<? ... ?>` as a special tag (respecting quoted strings).
    pub php_tags: bool,
    /// Enable the autoclose tag-family table.
    pub autoclose: bool,
    /// Use the smaller max tree depth, for constrained environments.
    pub small_stack: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { php_tags: false, autoclose: true, small_stack: false }
    }
}

impl ParseOptions {
    fn max_depth(&self) -> usize {
        if self.small_stack { MAX_NODE_LEVEL_SMALL_STACK } else { MAX_NODE_LEVEL }
    }
}

struct OpenTag {
    node_index: usize,
    name_start: usize,
    name_len: usize,
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    nodes: Vec<CNode>,
    attribs: Vec<CAttr>,
    stack: Vec<OpenTag>,
    opts: ParseOptions,
}

pub fn parse(data: Vec<u8>, opts: ParseOptions, url: Option<url::Url>) -> Result<Doc, HtmlError> {
    let (nodes, attribs) = {
        let mut p = Parser {
            data: &data,
            pos: 0,
            nodes: Vec::new(),
            attribs: Vec::new(),
            stack: Vec::new(),
            opts,
        };
        p.run()?;
        (p.nodes, p.attribs)
    };
    Ok(Doc { data, nodes, attribs, url })
}

impl<'a> Parser<'a> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn run(&mut self) -> Result<(), HtmlError> {
        while self.pos < self.len() {
            if self.data[self.pos] == b'<' {
                self.dispatch_angle()?;
            } else {
                self.emit_text_run();
            }
        }
        self.close_all_at_eof();
        Ok(())
    }

    fn dispatch_angle(&mut self) -> Result<(), HtmlError> {
        let rest = &self.data[self.pos..];
        if rest.starts_with(b"<!--") {
            self.parse_comment();
        } else if rest.starts_with(b"<!") {
            self.parse_doctype();
        } else if self.opts.php_tags && rest.starts_with(b"<?") {
            self.parse_php_tag();
        } else if rest.len() > 1 && rest[1] == b'/' {
            self.parse_close_tag();
        } else if rest.len() > 1 && is_alpha(rest[1]) {
            self.parse_open_tag()?;
        } else {
            // A lone '<' that doesn't start any recognized construct:
            // emit it as a single-byte error text node and move on.
            self.push_leaf(NodeKind::Text(TextKind::Error), self.pos, 1, 0, 0);
            self.pos += 1;
        }
        Ok(())
    }

    fn emit_text_run(&mut self) {
        let start = self.pos;
        let end = find_byte(self.data, start, b'<').unwrap_or(self.len());
        let kind = if end == start { TextKind::Empty } else { TextKind::Normal };
        self.push_leaf(NodeKind::Text(kind), start, end - start, 0, 0);
        self.pos = end;
    }

    fn parse_comment(&mut self) {
        let start = self.pos;
        let inner_start = start + 4; // past "<!--"
        let end = find_subslice(self.data, inner_start, b"-->")
            .unwrap_or(self.len());
        let all_end = (end + 3).min(self.len());
        let insides_len = end.saturating_sub(inner_start);
        self.push_leaf(
            NodeKind::Comment,
            start,
            all_end - start,
            inner_start - start,
            insides_len,
        );
        self.pos = all_end;
    }

    fn parse_doctype(&mut self) {
        let start = self.pos;
        let inner_start = start + 2; // past "<!"
        let end = find_byte(self.data, inner_start, b'>').unwrap_or(self.len());
        let all_end = (end + 1).min(self.len());
        self.push_leaf(
            NodeKind::Comment,
            start,
            all_end - start,
            inner_start - start,
            end - inner_start,
        );
        self.pos = all_end;
    }

    fn parse_php_tag(&mut self) {
        let start = self.pos;
        let inner_start = start + 2; // past "<?"
        let mut i = inner_start;
        let mut quote: Option<u8> = None;
        while i < self.len() {
            let b = self.data[i];
            match quote {
                Some(q) => {
                    if b == b'\\' {
                        i += 1;
                    } else if b == q {
                        quote = None;
                    }
                }
                None => {
                    if b == b'"' || b == b'\'' {
                        quote = Some(b);
                    } else if b == b'?' && self.data.get(i + 1) == Some(&b'>') {
                        break;
                    }
                }
            }
            i += 1;
        }
        let inner_end = i.min(self.len());
        let all_end = (inner_end + 2).min(self.len());
        let name_start = inner_start;
        let mut name_end = name_start;
        while name_end < inner_end && is_tag_name_cont(self.data[name_end]) {
            name_end += 1;
        }
        let mut node = CNode {
            kind: NodeKind::Tag,
            all_offset: start,
            all_len: all_end - start,
            tag_offset: name_start - start,
            tag_len: name_end - name_start,
            insides_offset: name_end - start,
            insides_len: inner_end.saturating_sub(name_end),
            attribs_index: self.attribs.len(),
            lvl: self.stack.len() as u32,
            tag_count: 0,
            text_count: 0,
            comment_count: 0,
        };
        if node.tag_len == 0 {
            node.tag_offset = 0;
        }
        self.bump_ancestors(NodeKind::Tag);
        self.nodes.push(node);
        self.pos = all_end;
    }

    fn parse_close_tag(&mut self) {
        let start = self.pos;
        let name_start = start + 2;
        let mut i = name_start;
        while i < self.len() && is_tag_name_cont(self.data[i]) {
            i += 1;
        }
        let name_end = i;
        let gt = find_byte(self.data, name_end, b'>').unwrap_or(self.len());
        let close_end = (gt + 1).min(self.len());
        let name = &self.data[name_start..name_end];

        if let Some(depth_from_top) = self.find_match_in_stack(name) {
            self.close_n_levels(depth_from_top + 1, start, close_end);
        }
        // If not found: permissively ignore the stray close tag.
        self.pos = close_end;
    }

    fn parse_open_tag(&mut self) -> Result<(), HtmlError> {
        let all_offset = self.pos;
        self.pos += 1; // past '<'
        let name_start = self.pos;
        while self.pos < self.len() && is_tag_name_cont(self.data[self.pos]) {
            self.pos += 1;
        }
        let name_end = self.pos;

        let attribs_index = self.attribs.len();
        self.parse_attributes();

        let self_closing = self.data.get(self.pos) == Some(&b'/');
        if self_closing {
            self.pos += 1;
        }
        if self.data.get(self.pos) == Some(&b'>') {
            self.pos += 1;
        }
        let all_end_after_open = self.pos;
        let name = &self.data[name_start..name_end];
        let lvl = self.stack.len() as u32;

        if self_closing || tags::is_void(name) {
            self.bump_ancestors(NodeKind::Tag);
            self.nodes.push(CNode {
                kind: NodeKind::Tag,
                all_offset,
                all_len: all_end_after_open - all_offset,
                tag_offset: name_start - all_offset,
                tag_len: name_end - name_start,
                insides_offset: all_end_after_open - all_offset,
                insides_len: 0,
                attribs_index,
                lvl,
                tag_count: 0,
                text_count: 0,
                comment_count: 0,
            });
            return Ok(());
        }

        if tags::is_raw_text(name) {
            let insides_offset_abs = all_end_after_open;
            let close_start = find_raw_text_close(self.data, insides_offset_abs, name);
            let insides_len = close_start - insides_offset_abs;
            let all_end = find_byte(self.data, close_start, b'>')
                .map(|p| p + 1)
                .unwrap_or(self.len())
                .min(self.len());
            self.bump_ancestors(NodeKind::Tag);
            self.nodes.push(CNode {
                kind: NodeKind::Tag,
                all_offset,
                all_len: all_end - all_offset,
                tag_offset: name_start - all_offset,
                tag_len: name_end - name_start,
                insides_offset: insides_offset_abs - all_offset,
                insides_len,
                attribs_index,
                lvl,
                tag_count: 0,
                text_count: 0,
                comment_count: 0,
            });
            self.pos = all_end;
            return Ok(());
        }

        // Autoclose: opening this tag may implicitly close the tag
        // currently on top of the stack.
        if self.opts.autoclose {
            if let Some(top) = self.stack.last() {
                let top_name = &self.data[top.name_start..top.name_start + top.name_len];
                if tags::autocloses(top_name, name) {
                    self.close_n_levels(1, all_offset, all_offset);
                }
            }
        }

        if self.stack.len() >= self.opts.max_depth() {
            return Err(HtmlError::DepthExceeded {
                offset: all_offset,
                max: self.opts.max_depth(),
            });
        }

        let node_index = self.nodes.len();
        self.bump_ancestors(NodeKind::Tag);
        self.nodes.push(CNode {
            kind: NodeKind::Tag,
            all_offset,
            all_len: 0, // patched on close
            tag_offset: name_start - all_offset,
            tag_len: name_end - name_start,
            insides_offset: all_end_after_open - all_offset,
            insides_len: 0, // patched on close
            attribs_index,
            lvl: self.stack.len() as u32,
            tag_count: 0,
            text_count: 0,
            comment_count: 0,
        });
        self.stack.push(OpenTag { node_index, name_start, name_len: name_end - name_start });
        Ok(())
    }

    fn parse_attributes(&mut self) {
        loop {
            while self.pos < self.len() && is_space(self.data[self.pos]) {
                self.pos += 1;
            }
            match self.data.get(self.pos) {
                None | Some(b'>') => break,
                Some(b'/') if self.data.get(self.pos + 1) == Some(&b'>') => break,
                _ => {}
            }

            let key_start = self.pos;
            while self.pos < self.len()
                && !is_space(self.data[self.pos])
                && !matches!(self.data[self.pos], b'=' | b'>' | b'/')
            {
                self.pos += 1;
            }
            if self.pos == key_start {
                // Stray delimiter (e.g. a bare '/' not followed by '>');
                // skip it so we always make progress.
                self.pos += 1;
                continue;
            }
            let key_len = self.pos - key_start;

            while self.pos < self.len() && is_space(self.data[self.pos]) {
                self.pos += 1;
            }

            let mut value_offset_abs = key_start + key_len;
            let mut value_len = 0;
            if self.data.get(self.pos) == Some(&b'=') {
                self.pos += 1;
                while self.pos < self.len() && is_space(self.data[self.pos]) {
                    self.pos += 1;
                }
                match self.data.get(self.pos) {
                    Some(&q @ (b'"' | b'\'')) => {
                        self.pos += 1;
                        let vs = self.pos;
                        while self.pos < self.len() && self.data[self.pos] != q {
                            self.pos += 1;
                        }
                        value_offset_abs = vs;
                        value_len = self.pos - vs;
                        if self.pos < self.len() {
                            self.pos += 1; // closing quote
                        }
                    }
                    _ => {
                        let vs = self.pos;
                        while self.pos < self.len()
                            && !is_space(self.data[self.pos])
                            && self.data[self.pos] != b'>'
                        {
                            self.pos += 1;
                        }
                        value_offset_abs = vs;
                        value_len = self.pos - vs;
                    }
                }
            }

            self.attribs.push(CAttr {
                key_offset: key_start,
                key_len,
                value_offset: value_offset_abs - (key_start + key_len),
                value_len,
            });
        }
    }

    /// Finds the nearest open-tag entry on the stack matching `name`,
    /// respecting the inescapable-tag boundary (spec.md §4.1): the
    /// search stops, unmatched, if it would have to cross an
    /// inescapable tag (e.g. `table`) that is not itself the target.
    fn find_match_in_stack(&self, name: &[u8]) -> Option<usize> {
        for (depth, entry) in self.stack.iter().rev().enumerate() {
            let entry_name = &self.data[entry.name_start..entry.name_start + entry.name_len];
            if eq_ignore_case(entry_name, name) {
                return Some(depth);
            }
            if tags::is_inescapable(entry_name) {
                return None;
            }
        }
        None
    }

    /// Pops `n` entries off the stack (innermost first), finalizing each
    /// popped node's `insides_len`/`all_len` using the same boundary
    /// position for all of them (spec.md §4.1: "intermediate nodes
    /// acquire their all_len and insides_len from the current
    /// position").
    fn close_n_levels(&mut self, n: usize, insides_end_abs: usize, all_end_abs: usize) {
        for _ in 0..n {
            let Some(entry) = self.stack.pop() else { break };
            let node = &mut self.nodes[entry.node_index];
            let insides_start_abs = node.all_offset + node.insides_offset;
            node.insides_len = insides_end_abs.saturating_sub(insides_start_abs);
            node.all_len = all_end_abs.saturating_sub(node.all_offset);
        }
    }

    fn close_all_at_eof(&mut self) {
        let eof = self.len();
        while let Some(entry) = self.stack.pop() {
            let node = &mut self.nodes[entry.node_index];
            let insides_start_abs = node.all_offset + node.insides_offset;
            node.insides_len = eof.saturating_sub(insides_start_abs);
            node.all_len = eof.saturating_sub(node.all_offset);
        }
    }

    fn push_leaf(
        &mut self,
        kind: NodeKind,
        all_offset: usize,
        all_len: usize,
        insides_offset: usize,
        insides_len: usize,
    ) {
        self.bump_ancestors(kind);
        self.nodes.push(CNode {
            kind,
            all_offset,
            all_len,
            tag_offset: 0,
            tag_len: 0,
            insides_offset,
            insides_len,
            attribs_index: self.attribs.len(),
            lvl: self.stack.len() as u32,
            tag_count: 0,
            text_count: 0,
            comment_count: 0,
        });
    }

    fn bump_ancestors(&mut self, kind: NodeKind) {
        for entry in &self.stack {
            let node = &mut self.nodes[entry.node_index];
            match kind {
                NodeKind::Tag => node.tag_count += 1,
                NodeKind::Text(_) => node.text_count += 1,
                NodeKind::Comment => node.comment_count += 1,
            }
        }
    }
}

fn find_byte(data: &[u8], from: usize, b: u8) -> Option<usize> {
    data[from..].iter().position(|&x| x == b).map(|p| p + from)
}

fn find_subslice(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > data.len() || needle.is_empty() {
        return None;
    }
    data[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

/// Finds the byte offset of the start of a case-insensitive `</name>`
/// close tag at or after `from`, or `data.len()` if none is found.
fn find_raw_text_close(data: &[u8], from: usize, name: &[u8]) -> usize {
    let mut i = from;
    while i < data.len() {
        if data[i] == b'<' && data.get(i + 1) == Some(&b'/') {
            let name_start = i + 2;
            let name_end = name_start + name.len();
            if name_end <= data.len()
                && eq_ignore_case(&data[name_start..name_end], name)
                && data.get(name_end).copied().map(|b| b == b'>' || is_space(b)).unwrap_or(false)
            {
                return i;
            }
        }
        i += 1;
    }
    data.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Doc {
        parse(s.as_bytes().to_vec(), ParseOptions::default(), None).unwrap()
    }

    #[test]
    fn simple_tag_with_text() {
        let doc = parse_str("<a>1</a>");
        assert_eq!(doc.nodes.len(), 2);
        assert!(doc.nodes[0].kind.is_tag());
        assert_eq!(doc.node_tag_name(&doc.nodes[0]), b"a");
        assert_eq!(doc.node_insides(&doc.nodes[0]), b"1");
        assert_eq!(doc.node_all(&doc.nodes[0]), b"<a>1</a>");
        assert!(doc.nodes[1].kind.is_text());
    }

    #[test]
    fn void_tag_has_no_insides() {
        let doc = parse_str("<br>x");
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.node_tag_name(&doc.nodes[0]), b"br");
        assert_eq!(doc.nodes[0].insides_len, 0);
    }

    #[test]
    fn attributes_are_partitioned_per_node() {
        let doc = parse_str(r#"<a href="x" class='y'>t</a><b id=z>u</b>"#);
        assert_eq!(doc.attrs_of(0).len(), 2);
        assert_eq!(doc.attr_key(&doc.attrs_of(0)[0]), b"href");
        assert_eq!(doc.attr_value(&doc.attrs_of(0)[0]), b"x");
        assert_eq!(doc.attr_key(&doc.attrs_of(0)[1]), b"class");
        assert_eq!(doc.attr_value(&doc.attrs_of(0)[1]), b"y");
        let b_index = doc.nodes.iter().position(|n| doc.node_tag_name(n) == b"b").unwrap();
        assert_eq!(doc.attrs_of(b_index).len(), 1);
        assert_eq!(doc.attr_value(&doc.attrs_of(b_index)[0]), b"z");
    }

    #[test]
    fn nested_tags_compute_descendant_counts() {
        let doc = parse_str("<div><p>1</p><p>2</p></div>");
        let div = &doc.nodes[0];
        assert!(doc.node_tag_name(div) == b"div");
        assert_eq!(div.tag_count, 2);
        assert_eq!(div.text_count, 2);
        assert_eq!(div.descendant_count(), 4);
    }

    #[test]
    fn comment_node() {
        let doc = parse_str("<!-- hi -->x");
        assert!(doc.nodes[0].kind.is_comment());
        assert_eq!(doc.node_insides(&doc.nodes[0]), b" hi ");
    }

    #[test]
    fn doctype_is_treated_as_comment() {
        let doc = parse_str("<!DOCTYPE html><p>x</p>");
        assert!(doc.nodes[0].kind.is_comment());
    }

    #[test]
    fn raw_text_tag_is_not_parsed() {
        let doc = parse_str("<script>if (1 < 2) { x(); }</script>");
        assert!(doc.node_tag_name(&doc.nodes[0]) == b"script");
        assert_eq!(doc.node_insides(&doc.nodes[0]), b"if (1 < 2) { x(); }");
    }

    #[test]
    fn autoclose_li_inside_ul() {
        let doc = parse_str("<ul><li>x<li>y</ul>");
        let tags: Vec<&[u8]> = doc
            .nodes
            .iter()
            .filter(|n| n.kind.is_tag())
            .map(|n| doc.node_tag_name(n))
            .collect();
        assert_eq!(tags, vec![b"ul".as_ref(), b"li".as_ref(), b"li".as_ref()]);
        let li_nodes: Vec<_> = doc.nodes.iter().filter(|n| doc.node_tag_name(n) == b"li").collect();
        assert_eq!(doc.node_insides(li_nodes[0]), b"x");
        assert_eq!(doc.node_insides(li_nodes[1]), b"y");
    }

    #[test]
    fn stray_close_tag_is_ignored() {
        let doc = parse_str("<a>1</b>2</a>");
        assert_eq!(doc.node_insides(&doc.nodes[0]), b"1</b>2");
    }

    #[test]
    fn close_tag_matches_ancestor_and_closes_intermediates() {
        let doc = parse_str("<a><b>1</a>");
        let a = doc.nodes.iter().find(|n| doc.node_tag_name(n) == b"a").unwrap();
        let b = doc.nodes.iter().find(|n| doc.node_tag_name(n) == b"b").unwrap();
        assert_eq!(doc.node_insides(a), b"<b>1");
        assert_eq!(doc.node_insides(b), b"1");
    }

    #[test]
    fn table_is_inescapable() {
        let doc = parse_str("<table><tr></div><td>x</td></tr></table>");
        let table = doc.nodes.iter().find(|n| doc.node_tag_name(n) == b"table").unwrap();
        assert_eq!(table.all_len, "<table><tr></div><td>x</td></tr></table>".len());
    }

    #[test]
    fn unclosed_tags_are_closed_at_eof() {
        let doc = parse_str("<div><p>x");
        let div = &doc.nodes[0];
        assert_eq!(doc.node_insides(div), b"<p>x");
    }

    #[test]
    fn depth_overflow_is_fatal() {
        let mut s = String::new();
        for _ in 0..(MAX_NODE_LEVEL_SMALL_STACK + 5) {
            s.push_str("<d>");
        }
        let opts = ParseOptions { small_stack: true, ..Default::default() };
        let err = parse(s.into_bytes(), opts, None).unwrap_err();
        assert!(matches!(err, HtmlError::DepthExceeded { .. }));
    }
}
