//! Compiles a node-pattern source string into an [`NPattern`] (spec.md
//! §4.4): type filter, ordered predicate list, position range, and axis
//! mask.

use crate::bytes::{is_space, trim};
use crate::pattern::Pattern;
use crate::range::Range;

use super::axis::{Axis, AxisMask};

pub const MAX_GROUP_LEVEL: usize = 3552;
pub const MAX_GROUP_LEVEL_SMALL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Tag,
    Comment,
    Text,
    TextNoErr,
    TextErr,
    TextEmpty,
    TextAll,
}

#[derive(Debug, Clone)]
pub enum Hook {
    Level(Range),
    LevelRelative(Range),
    TagCount(Range),
    CommentsCount(Range),
    TextCount(Range),
    AllCount(Range),
    Position(Range),
    PositionRelative(Range),
    Index(Range),
    Name(Pattern),
    All(Pattern),
    Insides(Pattern),
    Start(Pattern),
    End(Pattern),
    EndStrip(Pattern),
    Attributes(Range),
    Has(Box<crate::expr::Expr>),
}

#[derive(Debug, Clone)]
pub struct AttrPredicate {
    pub name: Pattern,
    pub value: Option<Pattern>,
    pub position: Range,
    pub invert: bool,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Hook(Hook),
    Attr(AttrPredicate),
    Group(Vec<Vec<Predicate>>),
}

#[derive(Debug, Clone)]
pub struct NPattern {
    pub type_filter: TypeFilter,
    pub predicates: Vec<Predicate>,
    pub range: Range,
    pub axis_mask: AxisMask,
    /// Whether `range` is applied once globally across all anchors
    /// rather than per anchor (spec.md §4.5).
    pub absolute: bool,
}

impl NPattern {
    /// The pattern with no matchers: matches every node of the default
    /// type (spec.md §4.4).
    pub fn empty() -> Self {
        Self {
            type_filter: TypeFilter::Tag,
            predicates: Vec::new(),
            range: Range::any(),
            axis_mask: AxisMask::default_mask(),
            absolute: false,
        }
    }

    pub fn compile(src: &[u8]) -> Result<Self, String> {
        let mut type_filter: Option<TypeFilter> = None;
        let mut axis_mask = AxisMask::empty();
        let mut absolute = false;
        let mut range = Range::any();
        let mut predicates = Vec::new();
        let mut first_plain_seen = false;

        for tok in split_tokens(trim(src)) {
            if tok.is_empty() {
                continue;
            }
            if tok[0] == b'[' && tok[tok.len() - 1] == b']' {
                range = Range::parse(&tok[1..tok.len() - 1])?;
                continue;
            }
            if tok[0] == b'@' {
                compile_at_hook(&tok[1..], true, &mut type_filter, &mut axis_mask, &mut absolute, &mut predicates)?;
                continue;
            }
            if tok[0] == b'(' {
                predicates.push(Predicate::Group(compile_group(tok, 1)?));
                continue;
            }
            if tok[0] == b'.' {
                predicates.push(attr_class_shorthand(&tok[1..])?);
                continue;
            }
            if tok[0] == b'#' {
                predicates.push(attr_id_shorthand(&tok[1..])?);
                continue;
            }
            if tok[0] == b'+' {
                predicates.push(attr_presence(&tok[1..], false)?);
                continue;
            }
            if tok[0] == b'-' {
                predicates.push(attr_presence(&tok[1..], true)?);
                continue;
            }
            let is_tag_filter = matches!(type_filter.unwrap_or(TypeFilter::Tag), TypeFilter::Tag);
            if !first_plain_seen && is_tag_filter && !tok.contains(&b'=') {
                predicates.push(Predicate::Hook(Hook::Name(parse_pattern_flexible(tok)?)));
                first_plain_seen = true;
                continue;
            }
            first_plain_seen = true;
            predicates.push(attr_named(tok)?);
        }

        if axis_mask.is_empty() {
            axis_mask = AxisMask::default_mask();
        }

        Ok(Self {
            type_filter: type_filter.unwrap_or(TypeFilter::Tag),
            predicates,
            range,
            axis_mask,
            absolute,
        })
    }
}

fn compile_at_hook(
    tok: &[u8],
    top_level: bool,
    type_filter: &mut Option<TypeFilter>,
    axis_mask: &mut AxisMask,
    absolute: &mut bool,
    predicates: &mut Vec<Predicate>,
) -> Result<(), String> {
    let (name, rest) = split_hook_name(tok);
    macro_rules! set_type {
        ($ty:expr) => {{
            if type_filter.is_some() {
                return Err("conflicting type hooks in node pattern".to_string());
            }
            *type_filter = Some($ty);
        }};
    }
    macro_rules! set_axis {
        ($axis:expr) => {{
            if !top_level {
                return Err(format!("access hook '@{}' is not allowed inside a group", String::from_utf8_lossy(name)));
            }
            axis_mask.set($axis);
        }};
    }
    match name {
        b"tag" => set_type!(TypeFilter::Tag),
        b"comment" => set_type!(TypeFilter::Comment),
        b"text" => set_type!(TypeFilter::Text),
        b"textnoerr" => set_type!(TypeFilter::TextNoErr),
        b"texterr" => set_type!(TypeFilter::TextErr),
        b"textempty" => set_type!(TypeFilter::TextEmpty),
        b"textall" => set_type!(TypeFilter::TextAll),
        b"absolute" => {
            if !top_level {
                return Err("'@absolute' is not allowed inside a group".to_string());
            }
            *absolute = true;
        }
        b"self" => set_axis!(Axis::SelfAxis),
        b"descendants" => set_axis!(Axis::Descendants),
        b"children" => set_axis!(Axis::Children),
        b"parent" => set_axis!(Axis::Parent),
        b"relative_parent" => set_axis!(Axis::RelativeParent),
        b"ancestors" => set_axis!(Axis::Ancestors),
        b"siblings_preceding" => set_axis!(Axis::SiblingsPreceding),
        b"siblings_subsequent" => set_axis!(Axis::SiblingsSubsequent),
        b"full_siblings_preceding" => set_axis!(Axis::FullSiblingsPreceding),
        b"full_siblings_subsequent" => set_axis!(Axis::FullSiblingsSubsequent),
        b"preceding" => set_axis!(Axis::Preceding),
        b"subsequent" => set_axis!(Axis::Subsequent),
        b"before" => set_axis!(Axis::Before),
        b"after" => set_axis!(Axis::After),
        b"everything" => set_axis!(Axis::Everything),
        b"level" => predicates.push(Predicate::Hook(Hook::Level(hook_range_arg(rest)?))),
        b"level_relative" => predicates.push(Predicate::Hook(Hook::LevelRelative(hook_range_arg(rest)?))),
        b"tag_count" => predicates.push(Predicate::Hook(Hook::TagCount(hook_range_arg(rest)?))),
        b"comments_count" => predicates.push(Predicate::Hook(Hook::CommentsCount(hook_range_arg(rest)?))),
        b"text_count" => predicates.push(Predicate::Hook(Hook::TextCount(hook_range_arg(rest)?))),
        b"all_count" => predicates.push(Predicate::Hook(Hook::AllCount(hook_range_arg(rest)?))),
        b"position" => predicates.push(Predicate::Hook(Hook::Position(hook_range_arg(rest)?))),
        b"position_relative" => predicates.push(Predicate::Hook(Hook::PositionRelative(hook_range_arg(rest)?))),
        b"index" => predicates.push(Predicate::Hook(Hook::Index(hook_range_arg(rest)?))),
        b"attributes" => predicates.push(Predicate::Hook(Hook::Attributes(hook_range_arg(rest)?))),
        b"name" => predicates.push(Predicate::Hook(Hook::Name(parse_pattern_flexible(rest)?))),
        b"all" => predicates.push(Predicate::Hook(Hook::All(parse_pattern_flexible(rest)?))),
        b"insides" => predicates.push(Predicate::Hook(Hook::Insides(parse_pattern_flexible(rest)?))),
        b"start" => predicates.push(Predicate::Hook(Hook::Start(parse_pattern_flexible(rest)?))),
        b"end" => predicates.push(Predicate::Hook(Hook::End(parse_pattern_flexible(rest)?))),
        b"endstrip" => predicates.push(Predicate::Hook(Hook::EndStrip(parse_pattern_flexible(rest)?))),
        b"has" => {
            let body = strip_parens(rest).ok_or_else(|| "'@has' requires a parenthesized expression".to_string())?;
            let expr = crate::expr::compile_has_body(body)?;
            predicates.push(Predicate::Hook(Hook::Has(Box::new(expr))));
        }
        other => return Err(format!("unknown access hook '@{}'", String::from_utf8_lossy(other))),
    }
    Ok(())
}

fn split_hook_name(tok: &[u8]) -> (&[u8], &[u8]) {
    let end = tok
        .iter()
        .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_'))
        .unwrap_or(tok.len());
    (&tok[..end], &tok[end..])
}

fn hook_range_arg(rest: &[u8]) -> Result<Range, String> {
    if rest.is_empty() {
        return Ok(Range::any());
    }
    if rest[0] != b'[' || rest[rest.len() - 1] != b']' {
        return Err("expected '[range]' argument after hook name".to_string());
    }
    Range::parse(&rest[1..rest.len() - 1])
}

fn strip_parens(rest: &[u8]) -> Option<&[u8]> {
    if rest.first() == Some(&b'(') && rest.last() == Some(&b')') {
        Some(&rest[1..rest.len() - 1])
    } else {
        None
    }
}

/// Parses a pattern argument that may be given in full `<flags>[range]"…"`
/// form, or as a bare unquoted word meaning "matches this literal
/// exactly" (case-insensitively): used for attribute names/values and
/// bare-identifier shorthand, where writing `<f>"…"` every time would be
/// needlessly verbose.
fn parse_pattern_flexible(src: &[u8]) -> Result<Pattern, String> {
    if src.is_empty() {
        return Ok(Pattern::any());
    }
    match src[0] {
        b'<' | b'[' | b'"' | b'\'' | b'*' => Pattern::parse(src),
        _ => {
            let mut wrapped = Vec::with_capacity(src.len() + 6);
            wrapped.extend_from_slice(b"<fi>\"");
            wrapped.extend_from_slice(src);
            wrapped.push(b'"');
            Pattern::parse(&wrapped)
        }
    }
}

fn attr_presence(name: &[u8], invert: bool) -> Result<Predicate, String> {
    Ok(Predicate::Attr(AttrPredicate {
        name: parse_pattern_flexible(name)?,
        value: None,
        position: Range::any(),
        invert,
    }))
}

fn attr_named(tok: &[u8]) -> Result<Predicate, String> {
    match tok.iter().position(|&b| b == b'=') {
        Some(eq) => Ok(Predicate::Attr(AttrPredicate {
            name: parse_pattern_flexible(&tok[..eq])?,
            value: Some(parse_pattern_flexible(&tok[eq + 1..])?),
            position: Range::any(),
            invert: false,
        })),
        None => attr_presence(tok, false),
    }
}

fn attr_class_shorthand(word: &[u8]) -> Result<Predicate, String> {
    let mut name = Vec::new();
    name.extend_from_slice(b"<fi>\"class\"");
    let mut value = Vec::with_capacity(word.len() + 6);
    value.extend_from_slice(b"<wf>\"");
    value.extend_from_slice(word);
    value.push(b'"');
    Ok(Predicate::Attr(AttrPredicate {
        name: Pattern::parse(&name)?,
        value: Some(Pattern::parse(&value)?),
        position: Range::any(),
        invert: false,
    }))
}

fn attr_id_shorthand(word: &[u8]) -> Result<Predicate, String> {
    let name = Pattern::parse(b"<fi>\"id\"")?;
    let mut value = Vec::with_capacity(word.len() + 6);
    value.extend_from_slice(b"<f>\"");
    value.extend_from_slice(word);
    value.push(b'"');
    Ok(Predicate::Attr(AttrPredicate {
        name,
        value: Some(Pattern::parse(&value)?),
        position: Range::any(),
        invert: false,
    }))
}

fn compile_group(tok: &[u8], depth: usize) -> Result<Vec<Vec<Predicate>>, String> {
    let max_depth = MAX_GROUP_LEVEL;
    if depth > max_depth {
        return Err("node pattern group nesting too deep".to_string());
    }
    let content = &tok[1..tok.len() - 1];
    let mut alts = Vec::new();
    for alt_src in split_group_alternatives(content) {
        let mut alt_predicates = Vec::new();
        for t in split_tokens(trim(alt_src)) {
            if t.is_empty() {
                continue;
            }
            if t[0] == b'(' {
                alt_predicates.push(Predicate::Group(compile_group(t, depth + 1)?));
            } else if t[0] == b'.' {
                alt_predicates.push(attr_class_shorthand(&t[1..])?);
            } else if t[0] == b'#' {
                alt_predicates.push(attr_id_shorthand(&t[1..])?);
            } else if t[0] == b'+' {
                alt_predicates.push(attr_presence(&t[1..], false)?);
            } else if t[0] == b'-' {
                alt_predicates.push(attr_presence(&t[1..], true)?);
            } else if t[0] == b'@' {
                let mut dummy_type = None;
                let mut dummy_axis = AxisMask::empty();
                let mut dummy_absolute = false;
                compile_at_hook(&t[1..], false, &mut dummy_type, &mut dummy_axis, &mut dummy_absolute, &mut alt_predicates)?;
            } else {
                alt_predicates.push(attr_named(t)?);
            }
        }
        alts.push(alt_predicates);
    }
    Ok(alts)
}

fn split_group_alternatives(content: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < content.len() {
        match content[i] {
            b'(' => depth += 1,
            b')' => {
                if depth == 0 && content.get(i + 1) == Some(&b'(') {
                    out.push(&content[start..i]);
                    i += 2;
                    start = i;
                    continue;
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    out.push(&content[start..]);
    out
}

/// Splits `src` on top-level whitespace, keeping quoted strings, `[...]`
/// ranges and `(...)` groups intact even when they contain spaces.
fn split_tokens(src: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut start: Option<usize> = None;
    let mut i = 0usize;
    while i < src.len() {
        let b = src[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => {
                quote = Some(b);
                if start.is_none() {
                    start = Some(i);
                }
            }
            b'[' | b'(' => {
                depth += 1;
                if start.is_none() {
                    start = Some(i);
                }
            }
            b']' | b')' => {
                depth -= 1;
            }
            _ if is_space(b) && depth <= 0 && quote.is_none() => {
                if let Some(s) = start.take() {
                    out.push(&src[s..i]);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
        i += 1;
    }
    if let Some(s) = start {
        out.push(&src[s..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_becomes_name_hook() {
        let p = NPattern::compile(b"a").unwrap();
        assert_eq!(p.predicates.len(), 1);
        assert!(matches!(p.predicates[0], Predicate::Hook(Hook::Name(_))));
    }

    #[test]
    fn class_shorthand_produces_attr_predicate() {
        let p = NPattern::compile(b"p .foo").unwrap();
        assert_eq!(p.predicates.len(), 2);
        assert!(matches!(p.predicates[1], Predicate::Attr(_)));
    }

    #[test]
    fn position_range_is_parsed() {
        let p = NPattern::compile(b"p [1:3]").unwrap();
        assert!(p.range.matches(2, None));
        assert!(!p.range.matches(5, None));
    }

    #[test]
    fn axis_hook_sets_mask() {
        let p = NPattern::compile(b"@children b").unwrap();
        assert!(p.axis_mask.has(Axis::Children));
        assert!(!p.axis_mask.has(Axis::SelfAxis));
    }

    #[test]
    fn default_axis_mask_is_self_and_descendants() {
        let p = NPattern::compile(b"a").unwrap();
        assert!(p.axis_mask.has(Axis::SelfAxis));
        assert!(p.axis_mask.has(Axis::Descendants));
    }

    #[test]
    fn conflicting_type_hooks_rejected() {
        assert!(NPattern::compile(b"@tag @comment").is_err());
    }

    #[test]
    fn group_parses_alternatives() {
        let p = NPattern::compile(b"(a)(b)").unwrap();
        match &p.predicates[0] {
            Predicate::Group(alts) => assert_eq!(alts.len(), 2),
            _ => panic!("expected group"),
        }
    }

    #[test]
    fn attribute_with_value() {
        let p = NPattern::compile(br#"a href="x""#).unwrap();
        match &p.predicates[1] {
            Predicate::Attr(a) => assert!(a.value.is_some()),
            _ => panic!("expected attribute predicate"),
        }
    }

    #[test]
    fn negative_attribute_shorthand() {
        let p = NPattern::compile(b"a -href").unwrap();
        match &p.predicates[1] {
            Predicate::Attr(a) => assert!(a.invert),
            _ => panic!("expected attribute predicate"),
        }
    }

    #[test]
    fn empty_pattern_matches_default_type() {
        let p = NPattern::empty();
        assert_eq!(p.type_filter, TypeFilter::Tag);
        assert!(p.predicates.is_empty());
    }
}
