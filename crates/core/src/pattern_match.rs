//! Pattern matching for the `like` and `~` operators.
//!
//! Patterns are compiled once, when the function is resolved, and then
//! matched against every row.
//!
//! # LIKE patterns
//!
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! Matching is case-sensitive and operates on Unicode scalar values.
//!
//! # Regex patterns
//!
//! A compact backtracking engine supporting:
//! - `.` any character
//! - `*` `+` `?` greedy quantifiers
//! - `^` / `$` anchors
//! - `\d` `\D` `\w` `\W` `\s` `\S` character classes
//! - `[abc]` `[a-z]` `[^abc]` bracket classes
//! - `\.` `\\` and other literal escapes
//!
//! ```
//! use strata_core::pattern_match::Pattern;
//!
//! let like = Pattern::like("h%o");
//! assert!(like.matches("hello"));
//!
//! let regex = Pattern::regex("^[a-z]+\\d+$").unwrap();
//! assert!(regex.matches("abc123"));
//! assert!(!regex.matches("123abc"));
//! ```

use crate::error::{Error, Result};
use alloc::vec::Vec;

/// A compiled `like` or regex pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Like(Vec<LikeToken>),
    Regex(Regex),
}

impl Pattern {
    /// Compiles a LIKE pattern. Every text is a valid LIKE pattern.
    pub fn like(pattern: &str) -> Self {
        let tokens = pattern
            .chars()
            .map(|c| match c {
                '%' => LikeToken::Many,
                '_' => LikeToken::One,
                c => LikeToken::Char(c),
            })
            .collect();
        Pattern::Like(tokens)
    }

    /// Compiles a regular expression.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::compile(pattern).map(Pattern::Regex)
    }

    /// Returns whether `value` matches.
    pub fn matches(&self, value: &str) -> bool {
        let chars: Vec<char> = value.chars().collect();
        match self {
            Pattern::Like(tokens) => like_at(&chars, tokens, 0, 0),
            Pattern::Regex(regex) => regex.matches_chars(&chars),
        }
    }
}

/// One element of a LIKE pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeToken {
    /// `%`
    Many,
    /// `_`
    One,
    Char(char),
}

fn like_at(v: &[char], p: &[LikeToken], vi: usize, pi: usize) -> bool {
    if pi == p.len() {
        return vi == v.len();
    }
    match p[pi] {
        LikeToken::Many => (vi..=v.len()).any(|skip| like_at(v, p, skip, pi + 1)),
        LikeToken::One => vi < v.len() && like_at(v, p, vi + 1, pi + 1),
        LikeToken::Char(ch) => vi < v.len() && v[vi] == ch && like_at(v, p, vi + 1, pi + 1),
    }
}

/// Matches a single character.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Atom {
    Any,
    Char(char),
    Digit { negate: bool },
    Word { negate: bool },
    Space { negate: bool },
    Class { negate: bool, items: Vec<(char, char)> },
}

impl Atom {
    fn accepts(&self, c: char) -> bool {
        match self {
            Atom::Any => true,
            Atom::Char(ch) => c == *ch,
            Atom::Digit { negate } => c.is_ascii_digit() != *negate,
            Atom::Word { negate } => (c.is_alphanumeric() || c == '_') != *negate,
            Atom::Space { negate } => c.is_whitespace() != *negate,
            Atom::Class { negate, items } => {
                items.iter().any(|&(lo, hi)| lo <= c && c <= hi) != *negate
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Quantifier {
    One,
    ZeroOrMore,
    OneOrMore,
    ZeroOrOne,
}

/// A compiled regular expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Regex {
    terms: Vec<(Atom, Quantifier)>,
    anchored_start: bool,
    anchored_end: bool,
}

impl Regex {
    /// Compiles `pattern`. An unclosed bracket class fails.
    pub fn compile(pattern: &str) -> Result<Self> {
        let anchored_start = pattern.starts_with('^');
        let anchored_end = pattern.ends_with('$') && !pattern.ends_with("\\$");
        let mut body: Vec<char> = pattern.chars().collect();
        if anchored_start {
            body.remove(0);
        }
        if anchored_end && !body.is_empty() {
            body.pop();
        }

        let mut terms = Vec::new();
        let mut i = 0;
        while i < body.len() {
            let (atom, len) = parse_atom(&body, i)
                .ok_or_else(|| Error::constraint(i, "unclosed character class"))?;
            i += len;
            let quantifier = match body.get(i) {
                Some('*') => Quantifier::ZeroOrMore,
                Some('+') => Quantifier::OneOrMore,
                Some('?') => Quantifier::ZeroOrOne,
                _ => Quantifier::One,
            };
            if quantifier != Quantifier::One {
                i += 1;
            }
            terms.push((atom, quantifier));
        }

        Ok(Self {
            terms,
            anchored_start,
            anchored_end,
        })
    }

    /// Returns whether the pattern matches anywhere in `value`, honouring
    /// anchors.
    pub fn is_match(&self, value: &str) -> bool {
        let chars: Vec<char> = value.chars().collect();
        self.matches_chars(&chars)
    }

    fn matches_chars(&self, chars: &[char]) -> bool {
        let last_start = if self.anchored_start { 0 } else { chars.len() };
        (0..=last_start).any(|start| {
            self.match_at(chars, start, 0)
                .is_some_and(|end| !self.anchored_end || end == chars.len())
        })
    }

    /// Returns the end position of a match of `terms[ti..]` at `chars[ci]`.
    fn match_at(&self, chars: &[char], ci: usize, ti: usize) -> Option<usize> {
        let Some((atom, quantifier)) = self.terms.get(ti) else {
            return Some(ci);
        };
        let accepts = |i: usize| i < chars.len() && atom.accepts(chars[i]);
        match quantifier {
            Quantifier::One => {
                if accepts(ci) {
                    self.match_at(chars, ci + 1, ti + 1)
                } else {
                    None
                }
            }
            Quantifier::ZeroOrOne => {
                if accepts(ci) {
                    if let Some(end) = self.match_at(chars, ci + 1, ti + 1) {
                        return Some(end);
                    }
                }
                self.match_at(chars, ci, ti + 1)
            }
            Quantifier::ZeroOrMore | Quantifier::OneOrMore => {
                let min = if *quantifier == Quantifier::OneOrMore { 1 } else { 0 };
                let mut end = ci;
                while accepts(end) {
                    end += 1;
                }
                if end - ci < min {
                    return None;
                }
                // greedy, then backtrack
                (ci + min..=end)
                    .rev()
                    .find_map(|i| self.match_at(chars, i, ti + 1))
            }
        }
    }
}

fn parse_atom(pat: &[char], i: usize) -> Option<(Atom, usize)> {
    match pat[i] {
        '.' => Some((Atom::Any, 1)),
        '\\' if i + 1 < pat.len() => {
            let atom = match pat[i + 1] {
                'd' => Atom::Digit { negate: false },
                'D' => Atom::Digit { negate: true },
                'w' => Atom::Word { negate: false },
                'W' => Atom::Word { negate: true },
                's' => Atom::Space { negate: false },
                'S' => Atom::Space { negate: true },
                c => Atom::Char(c),
            };
            Some((atom, 2))
        }
        '[' => parse_class(pat, i),
        c => Some((Atom::Char(c), 1)),
    }
}

/// Parses `[abc]`, `[a-z]` or `[^abc]` starting at `pat[i]`.
fn parse_class(pat: &[char], i: usize) -> Option<(Atom, usize)> {
    let negate = pat.get(i + 1) == Some(&'^');
    let start = if negate { i + 2 } else { i + 1 };
    let end = start + pat[start..].iter().position(|&c| c == ']')?;

    let class = &pat[start..end];
    let mut items = Vec::new();
    let mut k = 0;
    while k < class.len() {
        if k + 2 < class.len() && class[k + 1] == '-' {
            items.push((class[k], class[k + 2]));
            k += 3;
        } else {
            items.push((class[k], class[k]));
            k += 1;
        }
    }
    Some((Atom::Class { negate, items }, end - i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like(value: &str, pattern: &str) -> bool {
        Pattern::like(pattern).matches(value)
    }

    fn regex(value: &str, pattern: &str) -> bool {
        Pattern::regex(pattern).unwrap().matches(value)
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like("hello", "hello"));
        assert!(!like("hello", "world"));
        assert!(like("hello", "h%"));
        assert!(like("hello", "%llo"));
        assert!(like("hello", "%"));
        assert!(like("", "%"));
        assert!(like("hello", "_ello"));
        assert!(!like("hello", "_llo"));
        assert!(like("hello world", "h_llo%d"));
        assert!(!like("", "_"));
    }

    #[test]
    fn test_regex_classes() {
        assert!(regex("abc123", "\\d+"));
        assert!(!regex("abc", "\\d"));
        assert!(regex("hello_1", "^\\w+$"));
        assert!(regex("a b", "a\\sb"));
        assert!(regex("cat", "[abc]at"));
        assert!(!regex("rat", "^[abc]at"));
        assert!(regex("xat", "^[^abc]at"));
        assert!(regex("m", "^[a-z]$"));
        assert!(!regex("M", "^[a-z]$"));
    }

    #[test]
    fn test_regex_anchors() {
        assert!(!regex("abc123", "^\\d+$"));
        assert!(regex("abc123", "^[a-z]+\\d+$"));
        assert!(regex("Zurich", "^Z"));
        assert!(!regex("aZ", "^Z"));
        assert!(regex("a.b", "^a\\.b$"));
        assert!(!regex("axb", "^a\\.b$"));
    }

    #[test]
    fn test_regex_quantifiers() {
        assert!(regex("color", "^colou?r$"));
        assert!(regex("colour", "^colou?r$"));
        assert!(regex("aaa", "^a+$"));
        assert!(!regex("", "^a+$"));
        assert!(regex("", "^a*$"));
        assert!(regex("abxyzcd", "^ab.*cd$"));
        assert!(regex("anything", ""));
    }

    #[test]
    fn test_unclosed_class() {
        assert!(Pattern::regex("[abc").is_err());
        assert!(Regex::compile("x[").is_err());
    }
}
