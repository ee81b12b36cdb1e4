//! Output field declarations (spec.md §4.6, §6): `.name.type[(args)]
//! (|.type[(args)])* "annotation"`, and the typed, JSON-style rendering
//! each builtin drives.

use crate::bytes::{is_alnum, is_space, trim};
use crate::html::Doc;

#[derive(Debug, Clone)]
pub enum FieldType {
    Str { min: Option<i64>, max: Option<i64> },
    Number,
    Int { min: Option<i64>, max: Option<i64> },
    Uint { min: Option<u64>, max: Option<u64> },
    Bool,
    Date { patterns: Vec<Vec<u8>> },
    Url { base: Option<Vec<u8>> },
    Array { delim: u8, subtype: Box<FieldType> },
    Null,
    Escaped,
    Unknown(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct OutputField {
    pub name: Option<Vec<u8>>,
    pub types: Vec<FieldType>,
    pub annotation: Option<Vec<u8>>,
    /// Set by the expression parser for the `.name[...]` array-field
    /// sugar (spec.md §4.6); never set by `parse_output_field` itself.
    pub is_array: bool,
}

impl OutputField {
    pub fn unnamed() -> Self {
        Self { name: None, types: Vec::new(), annotation: None, is_array: false }
    }
}

#[derive(Debug, Clone)]
enum Arg {
    Str(Vec<u8>),
    Int(i64),
}

/// Parses one output-field declaration starting at `src[0] == '.'`.
/// Returns the field and the number of bytes consumed.
pub fn parse_output_field(src: &[u8]) -> Result<(OutputField, usize), String> {
    if src.first() != Some(&b'.') {
        return Err("output field declaration must start with '.'".to_string());
    }
    let mut pos = 1;
    let name_start = pos;
    while pos < src.len() && (is_alnum(src[pos]) || src[pos] == b'_') {
        pos += 1;
    }
    let name = if pos > name_start { Some(src[name_start..pos].to_vec()) } else { None };

    let mut types = Vec::new();
    loop {
        while pos < src.len() && is_space(src[pos]) {
            pos += 1;
        }
        if src.get(pos) != Some(&b'.') {
            break;
        }
        pos += 1;
        let (ty, consumed) = parse_type(&src[pos..])?;
        types.push(ty);
        pos += consumed;
        while pos < src.len() && is_space(src[pos]) {
            pos += 1;
        }
        if src.get(pos) == Some(&b'|') {
            pos += 1;
            continue;
        }
        break;
    }

    while pos < src.len() && is_space(src[pos]) {
        pos += 1;
    }
    let mut annotation = None;
    if let Some(&q @ (b'"' | b'\'')) = src.get(pos) {
        let rest = &src[pos + 1..];
        let end = rest
            .iter()
            .position(|&b| b == q)
            .ok_or_else(|| "unterminated output field annotation".to_string())?;
        annotation = Some(crate::bytes::decode_escapes_strict(&rest[..end]).map_err(|i| {
            format!("invalid escape in field annotation at offset {i}")
        })?);
        pos += 2 + end;
    }

    Ok((OutputField { name, types, annotation, is_array: false }, pos))
}

fn parse_type(src: &[u8]) -> Result<(FieldType, usize), String> {
    let name_start = 0;
    let mut pos = 0;
    while pos < src.len() && (is_alnum(src[pos]) || src[pos] == b'_') {
        pos += 1;
    }
    if pos == name_start {
        return Err("expected a type name after '.'".to_string());
    }
    let name = &src[name_start..pos];

    let mut args = Vec::new();
    if src.get(pos) == Some(&b'(') {
        let close = find_matching_paren(src, pos)?;
        args = parse_args(&src[pos + 1..close])?;
        pos = close + 1;
    }

    let ty = build_type(name, args)?;
    Ok((ty, pos))
}

fn find_matching_paren(src: &[u8], open: usize) -> Result<usize, String> {
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    for (i, &b) in src.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unterminated '(' in type argument list".to_string())
}

fn parse_args(src: &[u8]) -> Result<Vec<Arg>, String> {
    let src = trim(src);
    if src.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for part in split_args(src) {
        let part = trim(part);
        if let Some(&q @ (b'"' | b'\'')) = part.first() {
            if part.last() != Some(&q) || part.len() < 2 {
                return Err("unterminated quoted type argument".to_string());
            }
            let decoded = crate::bytes::decode_escapes_strict(&part[1..part.len() - 1])
                .map_err(|i| format!("invalid escape in type argument at offset {i}"))?;
            args.push(Arg::Str(decoded));
        } else {
            let (n, consumed) = crate::bytes::parse_int_prefix(part)
                .ok_or_else(|| "expected a quoted string or integer type argument".to_string())?;
            if consumed != part.len() {
                return Err("trailing characters in integer type argument".to_string());
            }
            args.push(Arg::Int(n));
        }
    }
    Ok(args)
}

fn split_args(src: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    for (i, &b) in src.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b',' => {
                    out.push(&src[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    out.push(&src[start..]);
    out
}

fn arg_int(args: &[Arg], i: usize) -> Option<i64> {
    match args.get(i) {
        Some(Arg::Int(n)) => Some(*n),
        _ => None,
    }
}

fn arg_uint(args: &[Arg], i: usize) -> Option<u64> {
    arg_int(args, i).map(|n| n.max(0) as u64)
}

fn arg_str(args: &[Arg], i: usize) -> Option<&[u8]> {
    match args.get(i) {
        Some(Arg::Str(s)) => Some(s.as_slice()),
        _ => None,
    }
}

fn build_type(name: &[u8], args: Vec<Arg>) -> Result<FieldType, String> {
    match name {
        b"s" => Ok(FieldType::Str { min: arg_int(&args, 0), max: arg_int(&args, 1) }),
        b"n" => Ok(FieldType::Number),
        b"i" => Ok(FieldType::Int { min: arg_int(&args, 0), max: arg_int(&args, 1) }),
        b"u" => Ok(FieldType::Uint { min: arg_uint(&args, 0), max: arg_uint(&args, 1) }),
        b"b" => Ok(FieldType::Bool),
        b"d" => {
            if args.is_empty() {
                return Err("'d' (date) type requires at least one strftime-like pattern".to_string());
            }
            let mut patterns = Vec::new();
            for a in &args {
                match a {
                    Arg::Str(s) => patterns.push(s.clone()),
                    Arg::Int(_) => return Err("'d' (date) patterns must be quoted strings".to_string()),
                }
            }
            Ok(FieldType::Date { patterns })
        }
        b"U" => Ok(FieldType::Url { base: arg_str(&args, 0).map(|s| s.to_vec()) }),
        b"a" => {
            let delim = arg_str(&args, 0).and_then(|s| s.first().copied()).unwrap_or(b',');
            let subtype = match arg_str(&args, 1) {
                Some(s) => build_type(s, Vec::new())?,
                None => FieldType::Str { min: None, max: None },
            };
            Ok(FieldType::Array { delim, subtype: Box::new(subtype) })
        }
        b"N" => Ok(FieldType::Null),
        b"e" => Ok(FieldType::Escaped),
        other => Ok(FieldType::Unknown(other.to_vec())),
    }
}

/// Renders `subject` through the field's type fallback chain (first type
/// that successfully parses wins); an empty chain or an unknown type
/// falls back to a plain JSON string.
pub fn render_chain(types: &[FieldType], subject: &[u8], doc: &Doc, out: &mut Vec<u8>) {
    for ty in types {
        if try_render(ty, subject, doc, out) {
            return;
        }
    }
    write_json_string(out, subject);
}

fn try_render(ty: &FieldType, subject: &[u8], doc: &Doc, out: &mut Vec<u8>) -> bool {
    match ty {
        FieldType::Str { min, max } => {
            let len = subject.len() as i64;
            if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
                return false;
            }
            write_json_string(out, subject);
            true
        }
        FieldType::Number => match std::str::from_utf8(trim(subject)).ok().and_then(|s| s.parse::<f64>().ok()) {
            Some(v) => {
                out.extend_from_slice(format_number(v).as_bytes());
                true
            }
            None => false,
        },
        FieldType::Int { min, max } => match crate::bytes::parse_int_prefix(trim(subject)) {
            Some((n, consumed)) if consumed == trim(subject).len() => {
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return false;
                }
                out.extend_from_slice(n.to_string().as_bytes());
                true
            }
            _ => false,
        },
        FieldType::Uint { min, max } => match crate::bytes::parse_uint_prefix(trim(subject)) {
            Some((n, consumed)) if consumed == trim(subject).len() => {
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return false;
                }
                out.extend_from_slice(n.to_string().as_bytes());
                true
            }
            _ => false,
        },
        FieldType::Bool => {
            let t = trim(subject);
            if t.eq_ignore_ascii_case(b"true") || t == b"1" {
                out.extend_from_slice(b"true");
                true
            } else if t.eq_ignore_ascii_case(b"false") || t == b"0" {
                out.extend_from_slice(b"false");
                true
            } else {
                false
            }
        }
        FieldType::Date { patterns } => {
            for pat in patterns {
                if let Some(iso) = parse_date(pat, trim(subject)) {
                    write_json_string(out, iso.as_bytes());
                    return true;
                }
            }
            false
        }
        FieldType::Url { base } => {
            let joined = join_url(base.as_deref(), subject, doc);
            write_json_string(out, joined.as_bytes());
            true
        }
        FieldType::Array { delim, subtype } => {
            out.push(b'[');
            for (i, piece) in subject.split(|b| b == delim).enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                if !try_render(subtype, piece, doc, out) {
                    write_json_string(out, piece);
                }
            }
            out.push(b']');
            true
        }
        FieldType::Null => {
            out.extend_from_slice(b"null");
            true
        }
        FieldType::Escaped => {
            write_json_string(out, subject);
            true
        }
        FieldType::Unknown(_) => {
            write_json_string(out, subject);
            true
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let mut s = format!("{v}");
        if !s.contains('.') && !s.contains('e') {
            s.push_str(".0");
        }
        s
    }
}

/// A deliberately small strftime-like subset: `%Y %m %d %H %M %S` plus
/// literal characters that must match verbatim. Parses `subject` fully
/// against `pattern`, or returns `None`.
fn parse_date(pattern: &[u8], subject: &[u8]) -> Option<String> {
    let mut year = 1970i32;
    let mut month = 1u32;
    let mut day = 1u32;
    let mut hour = 0u32;
    let mut min = 0u32;
    let mut sec = 0u32;

    let mut pi = 0;
    let mut si = 0;
    while pi < pattern.len() {
        if pattern[pi] == b'%' && pi + 1 < pattern.len() {
            match pattern[pi + 1] {
                b'Y' => {
                    let (v, n) = read_digits(subject, si, 4)?;
                    year = v as i32;
                    si += n;
                }
                b'm' => {
                    let (v, n) = read_digits(subject, si, 2)?;
                    month = v;
                    si += n;
                }
                b'd' => {
                    let (v, n) = read_digits(subject, si, 2)?;
                    day = v;
                    si += n;
                }
                b'H' => {
                    let (v, n) = read_digits(subject, si, 2)?;
                    hour = v;
                    si += n;
                }
                b'M' => {
                    let (v, n) = read_digits(subject, si, 2)?;
                    min = v;
                    si += n;
                }
                b'S' => {
                    let (v, n) = read_digits(subject, si, 2)?;
                    sec = v;
                    si += n;
                }
                b'%' => {
                    if subject.get(si) != Some(&b'%') {
                        return None;
                    }
                    si += 1;
                }
                _ => return None,
            };
            pi += 2;
        } else {
            if subject.get(si) != Some(&pattern[pi]) {
                return None;
            }
            pi += 1;
            si += 1;
        }
    }
    if si != subject.len() {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z"))
}

fn read_digits(s: &[u8], start: usize, max_width: usize) -> Option<(u32, usize)> {
    let mut n = 0u32;
    let mut count = 0;
    while count < max_width && start + count < s.len() && s[start + count].is_ascii_digit() {
        n = n * 10 + (s[start + count] - b'0') as u32;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some((n, count))
    }
}

fn join_url(base: Option<&[u8]>, subject: &[u8], doc: &Doc) -> String {
    let subject_str = String::from_utf8_lossy(subject);
    let base_url = base
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .and_then(|b| url::Url::parse(&b).ok())
        .or_else(|| doc.url.clone());
    match base_url {
        Some(b) => b.join(&subject_str).map(|u| u.to_string()).unwrap_or_else(|_| subject_str.into_owned()),
        None => subject_str.into_owned(),
    }
}

/// JSON-style string encoding (spec.md §6), via `serde_json` rather than
/// hand-rolled escaping. Input is treated as UTF-8 (lossily, since subjects
/// come from raw HTML byte spans that are not guaranteed valid).
pub fn write_json_string(out: &mut Vec<u8>, s: &[u8]) {
    let text = String::from_utf8_lossy(s);
    serde_json::to_writer(out, text.as_ref()).expect("string serialization cannot fail");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{parse, ParseOptions};

    fn doc() -> Doc {
        parse(b"<a/>".to_vec(), ParseOptions::default(), None).unwrap()
    }

    #[test]
    fn parses_name_and_single_type() {
        let (f, n) = parse_output_field(b".count.u").unwrap();
        assert_eq!(f.name.as_deref(), Some(b"count".as_ref()));
        assert_eq!(n, 8);
        assert!(matches!(f.types[0], FieldType::Uint { .. }));
    }

    #[test]
    fn parses_unnamed_field_with_annotation() {
        let (f, _) = parse_output_field(br#"..s "the text""#).unwrap();
        assert!(f.name.is_none());
        assert_eq!(f.annotation.as_deref(), Some(b"the text".as_ref()));
    }

    #[test]
    fn parses_fallback_type_chain() {
        let (f, _) = parse_output_field(b".x.i|.s").unwrap();
        assert_eq!(f.types.len(), 2);
    }

    #[test]
    fn renders_string() {
        let d = doc();
        let mut out = Vec::new();
        render_chain(&[FieldType::Str { min: None, max: None }], b"hi\n", &d, &mut out);
        assert_eq!(out, br#""hi\n""#);
    }

    #[test]
    fn renders_int_with_bounds() {
        let d = doc();
        let mut out = Vec::new();
        render_chain(&[FieldType::Int { min: Some(0), max: Some(10) }], b"42", &d, &mut out);
        // out of bounds falls through to default string rendering
        assert_eq!(out, br#""42""#);
    }

    #[test]
    fn renders_bool() {
        let d = doc();
        let mut out = Vec::new();
        render_chain(&[FieldType::Bool], b"true", &d, &mut out);
        assert_eq!(out, b"true");
    }

    #[test]
    fn renders_array_of_ints() {
        let (f, _) = parse_output_field(br#".xs.a(",", "i")"#).unwrap();
        let d = doc();
        let mut out = Vec::new();
        render_chain(&f.types, b"1,2,3", &d, &mut out);
        assert_eq!(out, b"[1,2,3]");
    }

    #[test]
    fn renders_date() {
        let (f, _) = parse_output_field(br#".d.d("%Y-%m-%d")"#).unwrap();
        let d = doc();
        let mut out = Vec::new();
        render_chain(&f.types, b"2024-01-02", &d, &mut out);
        assert_eq!(out, br#""2024-01-02T00:00:00Z""#);
    }

    #[test]
    fn unknown_type_falls_back_to_string() {
        let (f, _) = parse_output_field(b".x.frobnicate").unwrap();
        let d = doc();
        let mut out = Vec::new();
        render_chain(&f.types, b"x", &d, &mut out);
        assert_eq!(out, br#""x""#);
    }
}
