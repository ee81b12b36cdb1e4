//! The flat node/attribute arrays and the `Doc` that owns them, per
//! spec.md §3.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Normal,
    Empty,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Tag,
    Comment,
    Text(TextKind),
}

impl NodeKind {
    pub fn is_tag(self) -> bool {
        matches!(self, NodeKind::Tag)
    }

    pub fn is_comment(self) -> bool {
        matches!(self, NodeKind::Comment)
    }

    pub fn is_text(self) -> bool {
        matches!(self, NodeKind::Text(_))
    }
}

/// One element, comment, or text run. See spec.md §3 for the field
/// semantics. `tag_offset`/`tag_len`/`insides_offset`/`insides_len` are
/// always zero on text and comment nodes in this implementation: node
/// kind is tracked explicitly in `kind` rather than inferred from
/// overloaded zero/nonzero spans (see DESIGN.md, "node kind
/// representation").
#[derive(Debug, Clone)]
pub struct CNode {
    pub kind: NodeKind,
    pub all_offset: usize,
    pub all_len: usize,
    /// Relative to `all_offset`.
    pub tag_offset: usize,
    pub tag_len: usize,
    /// Relative to `all_offset`.
    pub insides_offset: usize,
    pub insides_len: usize,
    pub attribs_index: usize,
    pub lvl: u32,
    pub tag_count: u32,
    pub text_count: u32,
    pub comment_count: u32,
}

impl CNode {
    pub fn descendant_count(&self) -> u32 {
        self.tag_count + self.text_count + self.comment_count
    }

    pub fn all_span(&self) -> (usize, usize) {
        (self.all_offset, self.all_len)
    }

    pub fn tag_span(&self) -> (usize, usize) {
        (self.all_offset + self.tag_offset, self.tag_len)
    }

    pub fn insides_span(&self) -> (usize, usize) {
        (self.all_offset + self.insides_offset, self.insides_len)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CAttr {
    pub key_offset: usize,
    pub key_len: usize,
    /// Relative to `key_offset + key_len`.
    pub value_offset: usize,
    pub value_len: usize,
}

impl CAttr {
    pub fn key_span(&self) -> (usize, usize) {
        (self.key_offset, self.key_len)
    }

    pub fn value_span(&self) -> (usize, usize) {
        (self.key_offset + self.key_len + self.value_offset, self.value_len)
    }
}

/// A parsed document: owns the source bytes, the flat node array, and
/// the flat attribute array. `url` is the optional reference URL
/// supplied on the CLI with `-u`, used to resolve relative URLs for the
/// `U` output field type.
pub struct Doc {
    pub data: Vec<u8>,
    pub nodes: Vec<CNode>,
    pub attribs: Vec<CAttr>,
    pub url: Option<url::Url>,
}

impl Doc {
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn node_all<'a>(&'a self, node: &CNode) -> &'a [u8] {
        let (o, l) = node.all_span();
        self.slice(o, l)
    }

    pub fn node_tag_name<'a>(&'a self, node: &CNode) -> &'a [u8] {
        let (o, l) = node.tag_span();
        self.slice(o, l)
    }

    pub fn node_insides<'a>(&'a self, node: &CNode) -> &'a [u8] {
        let (o, l) = node.insides_span();
        self.slice(o, l)
    }

    pub fn attr_key<'a>(&'a self, attr: &CAttr) -> &'a [u8] {
        let (o, l) = attr.key_span();
        self.slice(o, l)
    }

    pub fn attr_value<'a>(&'a self, attr: &CAttr) -> &'a [u8] {
        let (o, l) = attr.value_span();
        self.slice(o, l)
    }

    /// Attributes belonging to node `i`: `attribs[nodes[i].attribs_index
    /// .. upper)`, where `upper` is the next node's `attribs_index`, or
    /// `attribs.len()` for the last node (spec.md §3, attribute
    /// partition invariant).
    pub fn attrs_of(&self, i: usize) -> &[CAttr] {
        let start = self.nodes[i].attribs_index;
        let end = self
            .nodes
            .get(i + 1)
            .map(|n| n.attribs_index)
            .unwrap_or(self.attribs.len());
        &self.attribs[start..end]
    }

    /// The half-open range of node indices that are descendants of node
    /// `i`: `[i+1, i+1+descendant_count)`.
    pub fn descendants_range(&self, i: usize) -> std::ops::Range<usize> {
        let count = self.nodes[i].descendant_count() as usize;
        (i + 1)..(i + 1 + count)
    }

    pub fn find_attr<'a>(&'a self, i: usize, name: &[u8]) -> Option<&'a CAttr> {
        self.attrs_of(i)
            .iter()
            .find(|a| crate::bytes::eq_ignore_case(self.attr_key(a), name))
    }
}
