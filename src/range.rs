//! Range predicates: `[a:b:c+d, …]` numeric range expressions used for
//! position filters on node patterns and on output-field array/string
//! length constraints.
//!
//! Grammar (spec.md §4.2):
//!
//! ```text
//! range := '[' item (',' item)* ']'
//! item  := ['!'] ['-']N [':' ['-']N [':' N ['+' N]]]
//! ```
//!
//! A leading `-` on an operand means "relative to the total": the
//! matched value is `total - N` rather than `N` itself. The second
//! operand may be omitted, meaning "open ended" (matches through the
//! last index).

use crate::bytes::parse_uint_prefix;

/// One endpoint of a range item: either an absolute index or an index
/// relative to the candidate count ("total - N").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Abs(u64),
    FromEnd(u64),
}

impl Endpoint {
    /// Resolves the endpoint to a concrete (possibly negative, if
    /// `FromEnd` exceeds `total`) signed value, or `None` if it is
    /// relative and `total` is unknown.
    fn resolve(self, total: Option<u64>) -> Option<i64> {
        match self {
            Endpoint::Abs(n) => Some(n as i64),
            Endpoint::FromEnd(n) => total.map(|t| t as i64 - n as i64),
        }
    }

    fn is_relative(self) -> bool {
        matches!(self, Endpoint::FromEnd(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RangeItem {
    invert: bool,
    a: Endpoint,
    b: Option<Endpoint>,
    step: Option<u64>,
    offset: u64,
}

impl RangeItem {
    fn test_raw(&self, i: i64, total: Option<u64>) -> bool {
        let Some(a) = self.a.resolve(total) else { return false };
        let in_range = match self.b {
            None => i == a,
            Some(b) => match b.resolve(total) {
                Some(b) => {
                    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                    i >= lo && i <= hi
                }
                None => false,
            },
        };
        if !in_range {
            return false;
        }
        match self.step {
            Some(step) if step > 0 => {
                ((i + self.offset as i64).rem_euclid(step as i64)) == 0
            }
            _ => true,
        }
    }

    /// Upper bound beyond which this single item can never match again,
    /// or `None` if unbounded (has a step, a relative endpoint with
    /// unknown total, or an open second operand).
    fn predict_max(&self) -> Option<u64> {
        if self.step.is_some() {
            return None;
        }
        if self.a.is_relative() {
            return None;
        }
        let a = match self.a {
            Endpoint::Abs(n) => n,
            Endpoint::FromEnd(_) => return None,
        };
        match self.b {
            None => Some(a + 1),
            Some(Endpoint::Abs(b)) => Some(a.max(b) + 1),
            Some(Endpoint::FromEnd(_)) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Range {
    items: Vec<RangeItem>,
}

impl Range {
    /// The empty range: matches every index.
    pub fn any() -> Self {
        Self { items: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Tests whether `i` matches, given `total` candidates (`None` if the
    /// total count is not known at this point, e.g. streaming
    /// enumeration before all anchors have been visited).
    pub fn matches(&self, i: i64, total: Option<u64>) -> bool {
        if self.items.is_empty() {
            return true;
        }
        let mut has_positive = false;
        let mut any_positive_matched = false;
        for item in &self.items {
            let raw = item.test_raw(i, total);
            let val = if item.invert { !raw } else { raw };
            if item.invert {
                if !val {
                    return false;
                }
            } else {
                has_positive = true;
                any_positive_matched |= val;
            }
        }
        if has_positive { any_positive_matched } else { true }
    }

    /// Smallest upper bound such that every `i >= predict_max()` is
    /// guaranteed to fail, or `None` when no static bound exists (a step,
    /// a relative endpoint, or an inverted/empty item set).
    pub fn predict_max(&self) -> Option<u64> {
        if self.items.is_empty() {
            return None;
        }
        let mut bound: Option<u64> = Some(0);
        for item in &self.items {
            if item.invert {
                return None;
            }
            match item.predict_max() {
                Some(b) => bound = bound.map(|cur| cur.max(b)),
                None => return None,
            }
        }
        bound
    }

    /// Parses the contents of a `[ ... ]` range expression (without the
    /// brackets). An empty string yields [`Range::any`].
    pub fn parse(src: &[u8]) -> Result<Self, String> {
        let src = crate::bytes::trim(src);
        if src.is_empty() {
            return Ok(Self::any());
        }
        let mut items = Vec::new();
        for part in split_top_level(src, b',') {
            items.push(parse_item(crate::bytes::trim(part))?);
        }
        Ok(Self { items })
    }
}

fn split_top_level(s: &[u8], sep: u8) -> Vec<&[u8]> {
    s.split(|&b| b == sep).collect()
}

fn parse_endpoint(s: &[u8]) -> Result<(Endpoint, usize), String> {
    if let Some(rest) = s.strip_prefix(b"-") {
        let (n, len) = parse_uint_prefix(rest)
            .ok_or_else(|| "expected digits after '-' in range".to_string())?;
        Ok((Endpoint::FromEnd(n), len + 1))
    } else {
        let (n, len) = parse_uint_prefix(s)
            .ok_or_else(|| "expected digits in range item".to_string())?;
        Ok((Endpoint::Abs(n), len))
    }
}

fn parse_item(s: &[u8]) -> Result<RangeItem, String> {
    let mut pos = 0;
    let invert = if s.first() == Some(&b'!') {
        pos += 1;
        true
    } else {
        false
    };

    let (a, len) = parse_endpoint(&s[pos..])?;
    pos += len;

    let mut b = None;
    let mut step = None;
    let mut offset = 0u64;

    if s.get(pos) == Some(&b':') {
        pos += 1;
        if pos < s.len() && s[pos] != b':' {
            let (end, len) = parse_endpoint(&s[pos..])?;
            b = Some(end);
            pos += len;
        } else {
            // second operand omitted: open-ended, i.e. "-1" (last index)
            b = Some(Endpoint::FromEnd(1));
        }

        if s.get(pos) == Some(&b':') {
            pos += 1;
            let (n, len) = parse_uint_prefix(&s[pos..])
                .ok_or_else(|| "expected step value after second ':'".to_string())?;
            step = Some(n);
            pos += len;

            if s.get(pos) == Some(&b'+') {
                pos += 1;
                let (n, len) = parse_uint_prefix(&s[pos..])
                    .ok_or_else(|| "expected offset after '+'".to_string())?;
                offset = n;
                pos += len;
            }
        }
    }

    if pos != s.len() {
        return Err(format!("unexpected trailing bytes in range item: {:?}", &s[pos..]));
    }

    Ok(RangeItem { invert, a, b, step, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> Range {
        Range::parse(s.as_bytes()).unwrap()
    }

    #[test]
    fn empty_matches_everything() {
        let range = r("");
        assert!(range.matches(0, None));
        assert!(range.matches(999, Some(3)));
    }

    #[test]
    fn single_value() {
        let range = r("2");
        assert!(!range.matches(1, None));
        assert!(range.matches(2, None));
        assert!(!range.matches(3, None));
    }

    #[test]
    fn closed_range() {
        let range = r("1:3");
        assert!(!range.matches(0, None));
        assert!(range.matches(1, None));
        assert!(range.matches(2, None));
        assert!(range.matches(3, None));
        assert!(!range.matches(4, None));
    }

    #[test]
    fn open_ended_range() {
        let range = r("2:");
        assert!(range.matches(2, Some(10)));
        assert!(range.matches(9, Some(10)));
        assert!(!range.matches(1, Some(10)));
    }

    #[test]
    fn stepped_range() {
        let range = r("0:10:2");
        assert!(range.matches(0, None));
        assert!(range.matches(2, None));
        assert!(!range.matches(1, None));
    }

    #[test]
    fn stepped_with_offset() {
        let range = r("0:10:2+1");
        assert!(range.matches(1, None));
        assert!(!range.matches(2, None));
    }

    #[test]
    fn relative_to_end() {
        let range = r("-1");
        assert!(range.matches(9, Some(10)));
        assert!(!range.matches(8, Some(10)));
    }

    #[test]
    fn inversion() {
        let range = r("!2");
        assert!(range.matches(1, None));
        assert!(!range.matches(2, None));
    }

    #[test]
    fn multiple_items_are_unioned() {
        let range = r("1,3,5");
        assert!(range.matches(1, None));
        assert!(range.matches(3, None));
        assert!(range.matches(5, None));
        assert!(!range.matches(2, None));
    }

    #[test]
    fn predict_max_bounds_absolute_items() {
        assert_eq!(r("0:4").predict_max(), Some(5));
        assert_eq!(r("7").predict_max(), Some(8));
    }

    #[test]
    fn predict_max_unbounded_for_open_or_stepped() {
        assert_eq!(r("2:").predict_max(), None);
        assert_eq!(r("0:10:2").predict_max(), None);
        assert_eq!(r("-1").predict_max(), None);
        assert_eq!(r("!2").predict_max(), None);
    }
}
