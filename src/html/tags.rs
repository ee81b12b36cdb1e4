//! Tag classification tables (spec.md §4.1): which tags are void,
//! raw-text, mutually autoclosing, or inescapable during close-tag
//! search.

use crate::bytes::eq_ignore_case;

const VOID_TAGS: &[&str] = &[
    "br", "img", "input", "link", "meta", "hr", "col", "embed", "area",
    "base", "param", "source", "track", "wbr", "command", "keygen",
    "menuitem",
];

const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// `(tag, tags-that-close-it-when-opened)`.
const AUTOCLOSE_TABLE: &[(&str, &[&str])] = &[
    ("p", &["p", "div", "ul", "ol", "table", "h1", "h2", "h3", "h4", "h5", "h6"]),
    ("li", &["li"]),
    ("td", &["td", "th"]),
    ("th", &["td", "th"]),
    ("tr", &["tr"]),
    ("dt", &["dt", "dd"]),
    ("dd", &["dt", "dd"]),
    ("thead", &["thead", "tbody", "tfoot"]),
    ("tbody", &["tbody", "tfoot"]),
    ("tfoot", &[]),
    ("optgroup", &["optgroup"]),
    ("option", &["option", "optgroup"]),
    ("caption", &[]),
    ("colgroup", &["colgroup"]),
    ("rt", &["rt", "rp"]),
    ("rp", &["rt", "rp"]),
];

const INESCAPABLE_TAGS: &[&str] = &["table"];

fn name_in(table: &[&str], name: &[u8]) -> bool {
    table.iter().any(|t| eq_ignore_case(t.as_bytes(), name))
}

pub fn is_void(name: &[u8]) -> bool {
    name_in(VOID_TAGS, name)
}

pub fn is_raw_text(name: &[u8]) -> bool {
    name_in(RAW_TEXT_TAGS, name)
}

pub fn is_inescapable(name: &[u8]) -> bool {
    name_in(INESCAPABLE_TAGS, name)
}

/// Whether opening a tag named `opening` should implicitly close a
/// currently open tag named `open_tag`, per the autoclose-family table.
pub fn autocloses(open_tag: &[u8], opening: &[u8]) -> bool {
    AUTOCLOSE_TABLE
        .iter()
        .find(|(tag, _)| eq_ignore_case(tag.as_bytes(), open_tag))
        .is_some_and(|(_, closers)| name_in(closers, opening))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_tags_are_case_insensitive() {
        assert!(is_void(b"BR"));
        assert!(is_void(b"img"));
        assert!(!is_void(b"div"));
    }

    #[test]
    fn autoclose_family_examples() {
        assert!(autocloses(b"p", b"p"));
        assert!(autocloses(b"tr", b"tr"));
        assert!(autocloses(b"li", b"li"));
        assert!(!autocloses(b"div", b"p"));
    }

    #[test]
    fn inescapable_table() {
        assert!(is_inescapable(b"table"));
        assert!(!is_inescapable(b"div"));
    }
}
