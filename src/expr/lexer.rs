//! Tokenizer for the query language (spec.md §4.6): produces an ordered
//! token stream, coalescing quoted strings and comments into `Text`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokKind {
    Text(Vec<u8>),
    BlockStart,
    BlockEnd,
    NextNode,
    ChainLink,
    NodeFormat,
    ExprFormat,
    ConditionOr { strict: bool },
    ConditionAnd { strict: bool },
    ConditionAndBlank { strict: bool },
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokKind,
    pub offset: usize,
}

pub fn tokenize(src: &[u8]) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut text = Vec::new();
    let mut text_start = 0usize;
    let mut pos = 0usize;

    macro_rules! flush_text {
        () => {
            if !text.is_empty() {
                tokens.push(Token { kind: TokKind::Text(std::mem::take(&mut text)), offset: text_start });
            }
        };
    }

    while pos < src.len() {
        let b = src[pos];

        if b == b'"' || b == b'\'' {
            if text.is_empty() {
                text_start = pos;
            }
            let quote = b;
            text.push(b);
            pos += 1;
            while pos < src.len() {
                let c = src[pos];
                text.push(c);
                pos += 1;
                if c == b'\\' && pos < src.len() {
                    text.push(src[pos]);
                    pos += 1;
                    continue;
                }
                if c == quote {
                    break;
                }
            }
            continue;
        }

        if src[pos..].starts_with(b"//") {
            while pos < src.len() && src[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        if src[pos..].starts_with(b"/*") {
            let rest = &src[pos + 2..];
            let end = find_subslice(rest, b"*/").ok_or_else(|| "unterminated /* comment".to_string())?;
            pos += 2 + end + 2;
            continue;
        }
        if src[pos..].starts_with(b"--") {
            while pos < src.len() && src[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        if src[pos..].starts_with(b"{-") {
            let rest = &src[pos + 2..];
            let end = find_subslice(rest, b"-}").ok_or_else(|| "unterminated {- comment".to_string())?;
            pos += 2 + end + 2;
            continue;
        }

        if b == b'^' {
            if src[pos..].starts_with(b"^&&") {
                flush_text!();
                tokens.push(Token { kind: TokKind::ConditionAndBlank { strict: true }, offset: pos });
                pos += 3;
                continue;
            }
            if src[pos..].starts_with(b"^||") {
                flush_text!();
                tokens.push(Token { kind: TokKind::ConditionOr { strict: true }, offset: pos });
                pos += 3;
                continue;
            }
            if src[pos..].starts_with(b"^&") {
                flush_text!();
                tokens.push(Token { kind: TokKind::ConditionAnd { strict: true }, offset: pos });
                pos += 2;
                continue;
            }
        }
        if src[pos..].starts_with(b"&&") {
            flush_text!();
            tokens.push(Token { kind: TokKind::ConditionAndBlank { strict: false }, offset: pos });
            pos += 2;
            continue;
        }
        if src[pos..].starts_with(b"||") {
            flush_text!();
            tokens.push(Token { kind: TokKind::ConditionOr { strict: false }, offset: pos });
            pos += 2;
            continue;
        }
        if b == b'&' {
            flush_text!();
            tokens.push(Token { kind: TokKind::ConditionAnd { strict: false }, offset: pos });
            pos += 1;
            continue;
        }

        match b {
            b'{' => {
                flush_text!();
                tokens.push(Token { kind: TokKind::BlockStart, offset: pos });
                pos += 1;
            }
            b'}' => {
                flush_text!();
                tokens.push(Token { kind: TokKind::BlockEnd, offset: pos });
                pos += 1;
            }
            b',' => {
                flush_text!();
                tokens.push(Token { kind: TokKind::NextNode, offset: pos });
                pos += 1;
            }
            b';' => {
                flush_text!();
                tokens.push(Token { kind: TokKind::ChainLink, offset: pos });
                pos += 1;
            }
            b'|' => {
                flush_text!();
                tokens.push(Token { kind: TokKind::NodeFormat, offset: pos });
                pos += 1;
            }
            b'/' => {
                flush_text!();
                tokens.push(Token { kind: TokKind::ExprFormat, offset: pos });
                pos += 1;
            }
            b'.' if text.is_empty() => {
                if let Some(end) = try_absorb_field_array(src, pos)? {
                    text_start = pos;
                    text.extend_from_slice(&src[pos..end]);
                    pos = end;
                } else {
                    text_start = pos;
                    text.push(b);
                    pos += 1;
                }
            }
            _ => {
                if text.is_empty() {
                    text_start = pos;
                }
                text.push(b);
                pos += 1;
            }
        }
    }
    flush_text!();
    Ok(tokens)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Recognizes the `.name[...]` array-field sugar (spec.md §4.6's
/// testable scenario 6: `{ .items[ a | "%i" ] }` → `{"items":["1","2"]}`):
/// an output field declaration immediately followed (no whitespace) by a
/// bracketed sub-expression. Absorbs the whole span as one opaque `Text`
/// token, the same way quoted strings are absorbed, so the parser can
/// later split it back into a field plus a nested block without the
/// outer tokenizer's structural characters interfering.
fn try_absorb_field_array(src: &[u8], pos: usize) -> Result<Option<usize>, String> {
    let (_, consumed) = match crate::fields::parse_output_field(&src[pos..]) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    if src.get(pos + consumed) != Some(&b'[') {
        return Ok(None);
    }
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = pos + consumed;
    while i < src.len() {
        let c = src[i];
        if let Some(q) = quote {
            if c == b'\\' && i + 1 < src.len() {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => quote = Some(c),
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err("unterminated '[' in output field array sugar".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &[u8]) -> Vec<TokKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn splits_chain_and_block() {
        let k = kinds(b"a; b { c }");
        assert_eq!(
            k,
            vec![
                TokKind::Text(b"a".to_vec()),
                TokKind::ChainLink,
                TokKind::Text(b" b ".to_vec()),
                TokKind::BlockStart,
                TokKind::Text(b" c ".to_vec()),
                TokKind::BlockEnd,
            ]
        );
    }

    #[test]
    fn quoted_structural_chars_stay_in_text() {
        let k = kinds(br#"a "x;y|z""#);
        assert_eq!(k, vec![TokKind::Text(br#"a "x;y|z""#.to_vec())]);
    }

    #[test]
    fn line_comment_is_dropped() {
        let k = kinds(b"a // comment\nb");
        assert_eq!(k, vec![TokKind::Text(b"a ".to_vec()), TokKind::Text(b"b".to_vec())]);
    }

    #[test]
    fn block_comment_is_dropped() {
        let k = kinds(b"a /* c */ b");
        assert_eq!(k, vec![TokKind::Text(b"a ".to_vec()), TokKind::Text(b" b".to_vec())]);
    }

    #[test]
    fn strict_conditional_operators() {
        let k = kinds(b"a ^&& b");
        assert_eq!(
            k,
            vec![
                TokKind::Text(b"a ".to_vec()),
                TokKind::ConditionAndBlank { strict: true },
                TokKind::Text(b" b".to_vec()),
            ]
        );
    }

    #[test]
    fn node_format_pipe() {
        let k = kinds(br#"a | "%i""#);
        assert_eq!(
            k,
            vec![TokKind::Text(b"a ".to_vec()), TokKind::NodeFormat, TokKind::Text(br#" "%i""#.to_vec())]
        );
    }
}
