//! String pattern predicates: `<flags>[range]"body"` or `<flags>*`.
//!
//! Grammar (spec.md §4.3):
//!
//! ```text
//! pattern := ['<' flag* '>'] ['[' range ']'] ( '*' | quoted )
//! ```
//!
//! Flag characters, any number in any order:
//!
//! - `t`/`u` — trim whitespace from the subject before matching.
//! - `i`/`c` — case-insensitive / case-sensitive (sensitive is the
//!   default; `c` exists to let a flag string explicitly pin it).
//! - `v`/`n` — invert the match.
//! - `a`/`f`/`b`/`e` — match kind: contains / full / prefix (begin) /
//!   suffix (end). Contains is the default.
//! - `W`/`w` — match whole subject vs. tokenize into whitespace-separated
//!   words and test each one.
//! - `s`/`B`/`E` — pattern type: literal string (default) / POSIX basic
//!   regex / POSIX extended regex.

use regex::bytes::Regex;

use crate::bytes::{decode_escapes, eq_ignore_case, is_space, trim};
use crate::range::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Contains,
    Full,
    Begin,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    Str,
    Bre,
    Ere,
}

#[derive(Debug, Clone, Default)]
struct Flags {
    trim: bool,
    case_insensitive: bool,
    invert: bool,
    kind: Option<MatchKind>,
    word: bool,
    ty: Option<PatternType>,
}

#[derive(Debug, Clone)]
enum Body {
    Universal,
    Literal(Vec<u8>),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct Pattern {
    trim: bool,
    case_insensitive: bool,
    invert: bool,
    kind: MatchKind,
    word: bool,
    range: Option<Range>,
    body: Body,
}

impl Pattern {
    /// The pattern that matches everything unconditionally (used as the
    /// default when a predicate slot is left empty).
    pub fn any() -> Self {
        Self {
            trim: false,
            case_insensitive: false,
            invert: false,
            kind: MatchKind::Contains,
            word: false,
            range: None,
            body: Body::Universal,
        }
    }

    pub fn parse(src: &[u8]) -> Result<Self, String> {
        let mut pos = 0;
        let mut flags = Flags::default();

        if src.first() == Some(&b'<') {
            let end = src
                .iter()
                .position(|&b| b == b'>')
                .ok_or_else(|| "unterminated flag prefix '<...>'".to_string())?;
            for &c in &src[1..end] {
                apply_flag(&mut flags, c)?;
            }
            pos = end + 1;
        }

        let mut range = None;
        if src.get(pos) == Some(&b'[') {
            let end = find_matching_bracket(src, pos)?;
            range = Some(Range::parse(&src[pos + 1..end])?);
            pos = end + 1;
        }

        let body_src = &src[pos..];
        let kind = flags.kind.unwrap_or(MatchKind::Contains);
        let ty = flags.ty.unwrap_or(PatternType::Str);

        let body = if body_src == b"*" {
            Body::Universal
        } else {
            let quoted = unquote(body_src)?;
            let decoded = decode_escapes(&quoted);
            match ty {
                PatternType::Str => Body::Literal(decoded),
                PatternType::Bre | PatternType::Ere => {
                    let anchored = anchor_for(kind, &decoded, ty);
                    let re = Regex::new(&anchored)
                        .map_err(|e| format!("invalid regular expression: {e}"))?;
                    Body::Regex(re)
                }
            }
        };

        Ok(Self {
            trim: flags.trim,
            case_insensitive: flags.case_insensitive,
            invert: flags.invert,
            kind,
            word: flags.word,
            range,
            body,
        })
    }

    pub fn matches(&self, subject: &[u8]) -> bool {
        if let Some(range) = &self.range {
            if !range.matches(subject.len() as i64, None) {
                return self.invert;
            }
        }

        if matches!(self.body, Body::Universal) {
            return true ^ self.invert;
        }

        let matched = if self.word {
            tokenize(subject).any(|w| self.match_one(w))
        } else {
            let s = if self.trim { trim(subject) } else { subject };
            self.match_one(s)
        };
        matched ^ self.invert
    }

    fn match_one(&self, s: &[u8]) -> bool {
        match &self.body {
            Body::Universal => true,
            Body::Literal(pat) => match self.kind {
                MatchKind::Full => self.str_eq(s, pat),
                MatchKind::Contains => self.str_contains(s, pat),
                MatchKind::Begin => self.str_starts_with(s, pat),
                MatchKind::End => self.str_ends_with(s, pat),
            },
            Body::Regex(re) => re.is_match(s),
        }
    }

    fn str_eq(&self, s: &[u8], pat: &[u8]) -> bool {
        if self.case_insensitive { eq_ignore_case(s, pat) } else { s == pat }
    }

    fn str_contains(&self, s: &[u8], pat: &[u8]) -> bool {
        if pat.is_empty() {
            return true;
        }
        if self.case_insensitive {
            let s_lower = s.to_ascii_lowercase();
            let pat_lower = pat.to_ascii_lowercase();
            contains_subslice(&s_lower, &pat_lower)
        } else {
            contains_subslice(s, pat)
        }
    }

    fn str_starts_with(&self, s: &[u8], pat: &[u8]) -> bool {
        if pat.len() > s.len() {
            return false;
        }
        self.str_eq(&s[..pat.len()], pat)
    }

    fn str_ends_with(&self, s: &[u8], pat: &[u8]) -> bool {
        if pat.len() > s.len() {
            return false;
        }
        self.str_eq(&s[s.len() - pat.len()..], pat)
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn tokenize(s: &[u8]) -> impl Iterator<Item = &[u8]> {
    s.split(|&b| is_space(b)).filter(|w| !w.is_empty())
}

fn apply_flag(flags: &mut Flags, c: u8) -> Result<(), String> {
    match c {
        b't' | b'u' => flags.trim = true,
        b'i' => flags.case_insensitive = true,
        b'c' => flags.case_insensitive = false,
        b'v' | b'n' => flags.invert = true,
        b'a' => flags.kind = Some(MatchKind::Contains),
        b'f' => flags.kind = Some(MatchKind::Full),
        b'b' => flags.kind = Some(MatchKind::Begin),
        b'e' => flags.kind = Some(MatchKind::End),
        b'W' | b'w' => flags.word = true,
        b's' => flags.ty = Some(PatternType::Str),
        b'B' => flags.ty = Some(PatternType::Bre),
        b'E' => flags.ty = Some(PatternType::Ere),
        other => return Err(format!("unknown pattern flag '{}'", other as char)),
    }
    Ok(())
}

fn find_matching_bracket(src: &[u8], open: usize) -> Result<usize, String> {
    src[open..]
        .iter()
        .position(|&b| b == b']')
        .map(|p| open + p)
        .ok_or_else(|| "unterminated '[' range in pattern".to_string())
}

fn unquote(src: &[u8]) -> Result<Vec<u8>, String> {
    match src.first() {
        Some(&q @ (b'"' | b'\'')) => {
            if src.len() < 2 || src[src.len() - 1] != q {
                return Err("unterminated quoted pattern body".to_string());
            }
            Ok(src[1..src.len() - 1].to_vec())
        }
        _ => Ok(src.to_vec()),
    }
}

/// Anchors a decoded BRE/ERE pattern body according to the match kind,
/// and translates BRE escape-group/brace syntax to the ERE syntax that
/// the `regex` crate understands (`\(`/`\)` -> `(`/`)`, `\{`/`\}` ->
/// `{`/`}`), a best-effort subset covering the patterns this language
/// actually produces.
fn anchor_for(kind: MatchKind, body: &[u8], ty: PatternType) -> String {
    let translated = match ty {
        PatternType::Bre => translate_bre(body),
        _ => String::from_utf8_lossy(body).into_owned(),
    };
    match kind {
        MatchKind::Full => format!("^(?:{translated})$"),
        MatchKind::Begin => format!("^(?:{translated})"),
        MatchKind::End => format!("(?:{translated})$"),
        MatchKind::Contains => translated,
    }
}

fn translate_bre(body: &[u8]) -> String {
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'\\' && i + 1 < body.len() {
            match body[i + 1] {
                b'(' => { out.push('('); i += 2; continue; }
                b')' => { out.push(')'); i += 2; continue; }
                b'{' => { out.push('{'); i += 2; continue; }
                b'}' => { out.push('}'); i += 2; continue; }
                _ => {}
            }
        }
        out.push(body[i] as char);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Pattern {
        Pattern::parse(s.as_bytes()).unwrap()
    }

    #[test]
    fn universal_matches_anything() {
        assert!(p("*").matches(b"whatever"));
        assert!(p("*").matches(b""));
    }

    #[test]
    fn plain_quoted_is_contains_by_default() {
        assert!(p("\"bc\"").matches(b"abcd"));
        assert!(!p("\"bc\"").matches(b"axyz"));
    }

    #[test]
    fn full_match_flag() {
        assert!(p("<f>\"abc\"").matches(b"abc"));
        assert!(!p("<f>\"abc\"").matches(b"abcd"));
    }

    #[test]
    fn begin_end_flags() {
        assert!(p("<b>\"ab\"").matches(b"abcd"));
        assert!(!p("<b>\"ab\"").matches(b"xabcd"));
        assert!(p("<e>\"cd\"").matches(b"abcd"));
        assert!(!p("<e>\"cd\"").matches(b"abcdx"));
    }

    #[test]
    fn case_insensitive_flag() {
        assert!(p("<if>\"ABC\"").matches(b"abc"));
        assert!(!p("<f>\"ABC\"").matches(b"abc"));
    }

    #[test]
    fn invert_flag() {
        assert!(!p("<vf>\"abc\"").matches(b"abc"));
        assert!(p("<vf>\"abc\"").matches(b"xyz"));
    }

    #[test]
    fn trim_flag() {
        assert!(p("<tf>\"abc\"").matches(b"  abc  "));
        assert!(!p("<f>\"abc\"").matches(b"  abc  "));
    }

    #[test]
    fn word_flag_tests_each_token() {
        assert!(p("<wf>\"cat\"").matches(b"a cat sat"));
        assert!(!p("<wf>\"cat\"").matches(b"category sat"));
    }

    #[test]
    fn ere_pattern() {
        assert!(p("<E>\"^a.c$\"").matches(b"abc"));
        assert!(!p("<E>\"^a.c$\"").matches(b"abcd"));
    }

    #[test]
    fn bre_pattern_group_translation() {
        assert!(p(r#"<B>"\(ab\)\{2\}""#).matches(b"abab"));
    }

    #[test]
    fn range_guard_on_subject_length() {
        assert!(p("[1:3]\"a\"").matches(b"abc"));
        assert!(!p("[1:3]\"a\"").matches(b"abcdefgh"));
    }
}
