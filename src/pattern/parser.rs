//! Parser for the read-layout pattern dialect.
//!
//! The dialect is a regular-expression subset with named captures and
//! bounded-error ("fuzzy") constraints:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `A`, `\.` | literal byte |
//! | `.` | any byte |
//! | `[ACGT]`, `[^N]`, `[A-Z]` | byte class |
//! | `(?P<name>...)`, `(?<name>...)` | named capture |
//! | `(...)`, `(?:...)` | grouping (not captured) |
//! | `a\|b` | alternation |
//! | `* + ? {n} {n,} {,m} {n,m}` | repetition, `?` suffix for lazy |
//! | `^ $` | start / end of the sequence |
//! | `{e<=1}`, `{s<=1,i<=1,d<2}` | error budget for the preceding item |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::pattern::PatternError;

/// Set of bytes accepted by a class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self([0; 4])
    }

    #[must_use]
    pub const fn full() -> Self {
        Self([u64::MAX; 4])
    }

    pub fn insert(&mut self, b: u8) {
        self.0[usize::from(b >> 6)] |= 1 << (b & 63);
    }

    pub fn insert_range(&mut self, lo: u8, hi: u8) {
        for b in lo..=hi {
            self.insert(b);
        }
    }

    #[must_use]
    pub fn contains(&self, b: u8) -> bool {
        self.0[usize::from(b >> 6)] & (1 << (b & 63)) != 0
    }

    #[must_use]
    pub fn negated(self) -> Self {
        Self(self.0.map(|w| !w))
    }

    fn union(&mut self, other: &Self) {
        for (w, o) in self.0.iter_mut().zip(other.0.iter()) {
            *w |= o;
        }
    }
}

/// Error budget attached to a pattern item.
///
/// A type of error that is not listed is not permitted unless a total (`e`)
/// limit is given, in which case it is bounded by that total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FuzzyLimits {
    /// Total errors of any kind
    pub errors: Option<usize>,
    pub substitutions: Option<usize>,
    pub insertions: Option<usize>,
    pub deletions: Option<usize>,
}

impl FuzzyLimits {
    #[must_use]
    pub fn max_substitutions(&self) -> usize {
        self.substitutions.or(self.errors).unwrap_or(0)
    }

    #[must_use]
    pub fn max_insertions(&self) -> usize {
        self.insertions.or(self.errors).unwrap_or(0)
    }

    #[must_use]
    pub fn max_deletions(&self) -> usize {
        self.deletions.or(self.errors).unwrap_or(0)
    }

    #[must_use]
    pub fn max_total(&self) -> usize {
        self.errors.unwrap_or_else(|| {
            self.max_substitutions()
                .saturating_add(self.max_insertions())
                .saturating_add(self.max_deletions())
        })
    }
}

/// Parsed pattern tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Empty,
    Literal(u8),
    Class(ByteSet),
    Any,
    Start,
    End,
    Concat(Vec<Node>),
    Alternate(Vec<Node>),
    /// Grouping; `capture` indexes the named captures in order of appearance
    Group {
        capture: Option<usize>,
        node: Box<Node>,
    },
    Repeat {
        node: Box<Node>,
        min: usize,
        max: Option<usize>,
        greedy: bool,
    },
    Fuzzy {
        node: Box<Node>,
        limits: FuzzyLimits,
    },
}

impl Node {
    /// Byte predicate for items that consume exactly one byte
    pub(crate) fn single_byte(&self) -> Option<ByteSet> {
        match self {
            Node::Literal(b) => {
                let mut set = ByteSet::empty();
                set.insert(*b);
                Some(set)
            }
            Node::Class(set) => Some(*set),
            Node::Any => Some(ByteSet::full()),
            _ => None,
        }
    }
}

/// Result of parsing: the tree plus capture names in order of appearance
#[derive(Debug, Clone)]
pub struct ParsedPattern {
    pub root: Node,
    pub capture_names: Vec<String>,
}

/// Parse a pattern string.
///
/// # Errors
///
/// Returns `PatternError::Syntax` for malformed input,
/// `PatternError::DuplicateGroup` if a capture name repeats, and
/// `PatternError::InvalidFuzzy` for unsupported error constraints.
pub fn parse(pattern: &str) -> Result<ParsedPattern, PatternError> {
    if let Some(offset) = pattern.bytes().position(|b| !b.is_ascii()) {
        return Err(PatternError::Syntax {
            offset,
            reason: "patterns must be ASCII".to_string(),
        });
    }

    let mut parser = Parser {
        input: pattern.as_bytes(),
        pos: 0,
        capture_names: Vec::new(),
        seen: HashSet::new(),
    };

    let root = parser.parse_alternation()?;
    if parser.pos < parser.input.len() {
        return Err(parser.error("unbalanced ')'"));
    }

    Ok(ParsedPattern {
        root,
        capture_names: parser.capture_names,
    })
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    capture_names: Vec<String>,
    seen: HashSet<String>,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> PatternError {
        PatternError::Syntax {
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_alternation(&mut self) -> Result<Node, PatternError> {
        let mut branches = vec![self.parse_concat()?];
        while self.eat(b'|') {
            branches.push(self.parse_concat()?);
        }

        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Node::Alternate(branches)
        })
    }

    fn parse_concat(&mut self) -> Result<Node, PatternError> {
        let mut items = Vec::new();
        while let Some(b) = self.peek() {
            if b == b'|' || b == b')' {
                break;
            }
            items.push(self.parse_postfix()?);
        }

        Ok(match items.len() {
            0 => Node::Empty,
            1 => items.remove(0),
            _ => Node::Concat(items),
        })
    }

    fn parse_postfix(&mut self) -> Result<Node, PatternError> {
        let mut node = self.parse_atom()?;

        loop {
            let (min, max) = match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    (0, None)
                }
                Some(b'+') => {
                    self.pos += 1;
                    (1, None)
                }
                Some(b'?') => {
                    self.pos += 1;
                    (0, Some(1))
                }
                Some(b'{') => {
                    if let Some(limits) = self.try_parse_fuzzy()? {
                        node = Node::Fuzzy {
                            node: Box::new(node),
                            limits,
                        };
                        continue;
                    }
                    self.parse_counted()?
                }
                _ => break,
            };

            if matches!(node, Node::Start | Node::End | Node::Empty) {
                return Err(self.error("nothing to repeat"));
            }

            let greedy = !self.eat(b'?');
            node = Node::Repeat {
                node: Box::new(node),
                min,
                max,
                greedy,
            };
        }

        Ok(node)
    }

    /// Parse `{n}`, `{n,}`, `{,m}` or `{n,m}` with the cursor on `{`
    fn parse_counted(&mut self) -> Result<(usize, Option<usize>), PatternError> {
        let open = self.pos;
        let close = self.input[open..]
            .iter()
            .position(|&b| b == b'}')
            .map(|i| open + i)
            .ok_or_else(|| self.error("unterminated '{'"))?;
        let body = std::str::from_utf8(&self.input[open + 1..close])
            .map_err(|_| self.error("invalid repetition"))?;

        let parse_bound = |s: &str| -> Result<Option<usize>, PatternError> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse().map(Some).map_err(|_| PatternError::Syntax {
                    offset: open,
                    reason: format!("invalid repetition count '{s}'"),
                })
            }
        };

        let (min, max) = match body.split_once(',') {
            Some((lo, hi)) => (parse_bound(lo)?.unwrap_or(0), parse_bound(hi)?),
            None => {
                let n = parse_bound(body)?.ok_or_else(|| self.error("empty repetition"))?;
                (n, Some(n))
            }
        };

        if let Some(max) = max {
            if max < min {
                return Err(self.error("repetition maximum below minimum"));
            }
        }

        self.pos = close + 1;
        Ok((min, max))
    }

    /// Parse a fuzzy constraint if the braces at the cursor hold one
    fn try_parse_fuzzy(&mut self) -> Result<Option<FuzzyLimits>, PatternError> {
        let open = self.pos;
        let Some(close) = self.input[open..].iter().position(|&b| b == b'}') else {
            return Ok(None);
        };
        let close = open + close;
        let body = std::str::from_utf8(&self.input[open + 1..close])
            .map_err(|_| self.error("invalid constraint"))?;

        if !body.trim_start().starts_with(['e', 's', 'i', 'd']) {
            return Ok(None);
        }

        let mut limits = FuzzyLimits::default();
        for term in body.split(',') {
            let term = term.trim();
            let (kind, bound) = if let Some((k, v)) = term.split_once("<=") {
                (k.trim(), v.trim().parse::<usize>().ok())
            } else if let Some((k, v)) = term.split_once('<') {
                // `e<2` is `e<=1`; `e<0` can never be satisfied
                let bound = v.trim().parse::<usize>().ok();
                match bound {
                    Some(0) => return Err(PatternError::InvalidFuzzy(term.to_string())),
                    _ => (k.trim(), bound.map(|n| n - 1)),
                }
            } else {
                return Err(PatternError::InvalidFuzzy(term.to_string()));
            };

            let bound = bound.ok_or_else(|| PatternError::InvalidFuzzy(term.to_string()))?;
            let slot = match kind {
                "e" => &mut limits.errors,
                "s" => &mut limits.substitutions,
                "i" => &mut limits.insertions,
                "d" => &mut limits.deletions,
                _ => return Err(PatternError::InvalidFuzzy(term.to_string())),
            };
            if slot.is_some() {
                return Err(PatternError::InvalidFuzzy(term.to_string()));
            }
            *slot = Some(bound);
        }

        self.pos = close + 1;
        Ok(Some(limits))
    }

    fn parse_atom(&mut self) -> Result<Node, PatternError> {
        let Some(b) = self.peek() else {
            return Err(self.error("unexpected end of pattern"));
        };

        match b {
            b'(' => self.parse_group(),
            b'[' => self.parse_class(),
            b'.' => {
                self.pos += 1;
                Ok(Node::Any)
            }
            b'^' => {
                self.pos += 1;
                Ok(Node::Start)
            }
            b'$' => {
                self.pos += 1;
                Ok(Node::End)
            }
            b'\\' => {
                self.pos += 1;
                let set = self.parse_escape()?;
                Ok(single_or_class(set))
            }
            b'*' | b'+' | b'?' | b'{' => Err(self.error("nothing to repeat")),
            _ => {
                self.pos += 1;
                Ok(Node::Literal(b))
            }
        }
    }

    fn parse_group(&mut self) -> Result<Node, PatternError> {
        let open = self.pos;
        self.pos += 1;

        let capture = if self.eat(b'?') {
            if self.eat(b':') {
                None
            } else if self.eat(b'P') || self.peek() == Some(b'<') {
                if !self.eat(b'<') {
                    return Err(self.error("expected '<' after '(?P'"));
                }
                Some(self.parse_group_name()?)
            } else {
                return Err(self.error("unsupported group flag"));
            }
        } else {
            None
        };

        let node = self.parse_alternation()?;
        if !self.eat(b')') {
            return Err(PatternError::Syntax {
                offset: open,
                reason: "missing ')'".to_string(),
            });
        }

        Ok(Node::Group {
            capture,
            node: Box::new(node),
        })
    }

    fn parse_group_name(&mut self) -> Result<usize, PatternError> {
        let start = self.pos;
        let end = self.input[start..]
            .iter()
            .position(|&b| b == b'>')
            .map(|i| start + i)
            .ok_or_else(|| self.error("unterminated group name"))?;
        let name = String::from_utf8_lossy(&self.input[start..end]).into_owned();

        let valid = name
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid {
            return Err(PatternError::InvalidGroupName(name));
        }

        if !self.seen.insert(name.clone()) {
            return Err(PatternError::DuplicateGroup(name));
        }

        self.pos = end + 1;
        self.capture_names.push(name);
        Ok(self.capture_names.len() - 1)
    }

    fn parse_class(&mut self) -> Result<Node, PatternError> {
        let open = self.pos;
        self.pos += 1;
        let negate = self.eat(b'^');
        let mut set = ByteSet::empty();
        let mut first = true;

        loop {
            let Some(b) = self.peek() else {
                return Err(PatternError::Syntax {
                    offset: open,
                    reason: "unterminated character class".to_string(),
                });
            };

            if b == b']' && !first {
                self.pos += 1;
                break;
            }
            first = false;

            let lo = if b == b'\\' {
                self.pos += 1;
                let escaped = self.parse_escape()?;
                set.union(&escaped);
                continue;
            } else {
                self.pos += 1;
                b
            };

            // Range such as `A-Z`; a trailing `-` is literal
            if self.peek() == Some(b'-') && self.input.get(self.pos + 1).is_some_and(|&n| n != b']') {
                self.pos += 1;
                let hi = self.peek().ok_or_else(|| self.error("unterminated range"))?;
                self.pos += 1;
                if hi < lo {
                    return Err(self.error("invalid class range"));
                }
                set.insert_range(lo, hi);
            } else {
                set.insert(lo);
            }
        }

        Ok(Node::Class(if negate { set.negated() } else { set }))
    }

    /// Parse the character after a backslash into the set it denotes
    fn parse_escape(&mut self) -> Result<ByteSet, PatternError> {
        let b = self
            .peek()
            .ok_or_else(|| self.error("trailing backslash"))?;
        self.pos += 1;

        let mut set = ByteSet::empty();
        match b {
            b'd' | b'D' => set.insert_range(b'0', b'9'),
            b'w' | b'W' => {
                set.insert_range(b'a', b'z');
                set.insert_range(b'A', b'Z');
                set.insert_range(b'0', b'9');
                set.insert(b'_');
            }
            b's' | b'S' => {
                for ws in [b' ', b'\t', b'\n', b'\r', 0x0b, 0x0c] {
                    set.insert(ws);
                }
            }
            b'n' => set.insert(b'\n'),
            b't' => set.insert(b'\t'),
            b'r' => set.insert(b'\r'),
            b if b.is_ascii_alphanumeric() => {
                self.pos -= 1;
                return Err(self.error("unsupported escape"));
            }
            b => set.insert(b),
        }

        Ok(if b.is_ascii_uppercase() { set.negated() } else { set })
    }
}

fn single_or_class(set: ByteSet) -> Node {
    let mut members = (0..=u8::MAX).filter(|&b| set.contains(b));
    match (members.next(), members.next()) {
        (Some(only), None) => Node::Literal(only),
        _ => Node::Class(set),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        let parsed = parse("ACG").unwrap();
        assert_eq!(
            parsed.root,
            Node::Concat(vec![
                Node::Literal(b'A'),
                Node::Literal(b'C'),
                Node::Literal(b'G')
            ])
        );
        assert!(parsed.capture_names.is_empty());
    }

    #[test]
    fn test_parse_named_groups() {
        let parsed = parse("ACG(?P<barcode>[ACGT]{3})(?<read>[ACGT]+)CTT").unwrap();
        assert_eq!(parsed.capture_names, vec!["barcode", "read"]);
    }

    #[test]
    fn test_duplicate_group_is_error() {
        let err = parse("(?P<a>A)(?P<a>C)").unwrap_err();
        assert!(matches!(err, PatternError::DuplicateGroup(name) if name == "a"));
    }

    #[test]
    fn test_parse_counted_repetition() {
        let parsed = parse("A{2,5}").unwrap();
        assert_eq!(
            parsed.root,
            Node::Repeat {
                node: Box::new(Node::Literal(b'A')),
                min: 2,
                max: Some(5),
                greedy: true,
            }
        );

        let parsed = parse("A{3,}?").unwrap();
        assert!(matches!(
            parsed.root,
            Node::Repeat { min: 3, max: None, greedy: false, .. }
        ));
    }

    #[test]
    fn test_parse_fuzzy() {
        let parsed = parse("(A{5,}){e<=1}").unwrap();
        let Node::Fuzzy { limits, .. } = parsed.root else {
            panic!("expected fuzzy node");
        };
        assert_eq!(limits.errors, Some(1));
        assert_eq!(limits.max_substitutions(), 1);
        assert_eq!(limits.max_total(), 1);

        let parsed = parse("(ACGT){s<=1,d<2}").unwrap();
        let Node::Fuzzy { limits, .. } = parsed.root else {
            panic!("expected fuzzy node");
        };
        assert_eq!(limits.max_substitutions(), 1);
        assert_eq!(limits.max_deletions(), 1);
        assert_eq!(limits.max_insertions(), 0);
        assert_eq!(limits.max_total(), 2);
    }

    #[test]
    fn test_invalid_fuzzy() {
        assert!(matches!(
            parse("(A){x<=1}"),
            Err(PatternError::Syntax { .. })
        ));
        assert!(matches!(
            parse("(A){e<=1,e<=2}"),
            Err(PatternError::InvalidFuzzy(_))
        ));
        assert!(matches!(parse("(A){e<0}"), Err(PatternError::InvalidFuzzy(_))));
    }

    #[test]
    fn test_parse_class() {
        let parsed = parse("[A-C^]").unwrap();
        let Node::Class(set) = parsed.root else {
            panic!("expected class");
        };
        assert!(set.contains(b'A') && set.contains(b'B') && set.contains(b'C'));
        assert!(set.contains(b'^'));
        assert!(!set.contains(b'D'));

        let parsed = parse("[^AG]").unwrap();
        let Node::Class(set) = parsed.root else {
            panic!("expected class");
        };
        assert!(set.contains(b'C') && !set.contains(b'A'));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("(AC").is_err());
        assert!(parse("AC)").is_err());
        assert!(parse("*A").is_err());
        assert!(parse("[AC").is_err());
        assert!(parse("A{5,2}").is_err());
        assert!(parse("(?i)A").is_err());
        assert!(parse("(?P<1a>A)").is_err());
    }

    #[test]
    fn test_alternation() {
        let parsed = parse("ATG|CTG").unwrap();
        assert!(matches!(parsed.root, Node::Alternate(ref b) if b.len() == 2));
    }

    #[test]
    fn test_escaped_literal() {
        let parsed = parse(r"\.").unwrap();
        assert_eq!(parsed.root, Node::Literal(b'.'));
    }
}
