//! SQL tokenizer.
//!
//! Tokens are slices of the source text. Whitespace and comments separate
//! tokens; quoted strings keep their quotes. A single token can be pushed
//! back with [`Lexer::unparse`], which is all the parsers need for lookahead.

use strata_core::{Error, Result};

/// A token and its 0-based offset in the source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token text, quotes included.
    pub text: &'a str,
    /// Offset of the first character.
    pub position: usize,
}

impl<'a> Token<'a> {
    /// Returns whether the token equals `keyword`, ignoring case.
    #[inline]
    pub fn is(&self, keyword: &str) -> bool {
        self.text.eq_ignore_ascii_case(keyword)
    }

    /// Returns the first character.
    #[inline]
    pub fn first_char(&self) -> char {
        self.text.chars().next().unwrap_or('\0')
    }

    /// Returns whether the token is a quoted string.
    pub fn is_quoted(&self) -> bool {
        matches!(self.first_char(), '\'' | '"' | '`')
    }
}

const TWO_CHAR_SYMBOLS: [&str; 4] = ["!=", "<=", ">=", "!~"];
const ONE_CHAR_SYMBOLS: &str = "+-*/%^=<>~(),;";

/// Pull tokenizer over a slice of SQL text.
#[derive(Clone, Debug)]
pub struct Lexer<'a> {
    content: &'a str,
    pos: usize,
    hi: usize,
    last: Option<Token<'a>>,
    pushed_back: bool,
    last_position: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the whole of `content`.
    pub fn new(content: &'a str) -> Self {
        Self::with_range(content, 0, content.len())
    }

    /// Creates a lexer over `content[lo..hi]`. Token positions stay relative
    /// to the whole of `content`.
    pub fn with_range(content: &'a str, lo: usize, hi: usize) -> Self {
        let hi = hi.min(content.len());
        Self {
            content,
            pos: lo.min(hi),
            hi,
            last: None,
            pushed_back: false,
            last_position: lo,
        }
    }

    /// Returns the full source text.
    pub fn content(&self) -> &'a str {
        self.content
    }

    /// Position of the most recent token. Stays on the last token at end of input.
    pub fn position(&self) -> usize {
        self.last_position
    }

    /// Offset just past the most recent token.
    pub fn offset(&self) -> usize {
        match (self.pushed_back, self.last) {
            (true, Some(t)) => t.position,
            _ => self.pos,
        }
    }

    /// Pushes the most recent token back. Repeated calls are no-ops.
    pub fn unparse(&mut self) {
        if self.last.is_some() {
            self.pushed_back = true;
        }
    }

    /// Returns the next token, None at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        if self.pushed_back {
            self.pushed_back = false;
            if let Some(t) = self.last {
                self.last_position = t.position;
                return Ok(Some(t));
            }
        }

        self.skip_blanks()?;
        if self.pos >= self.hi {
            return Ok(None);
        }

        let start = self.pos;
        let bytes = self.content.as_bytes();
        let c = bytes[start];

        let end = match c {
            b'\'' | b'"' | b'`' => {
                let close = self.content[start + 1..self.hi]
                    .find(c as char)
                    .ok_or_else(|| Error::lex(start, "unterminated quote"))?;
                start + 1 + close + 1
            }
            _ => {
                if let Some(sym) = TWO_CHAR_SYMBOLS
                    .iter()
                    .find(|s| self.content[start..self.hi].starts_with(**s))
                {
                    start + sym.len()
                } else if ONE_CHAR_SYMBOLS.as_bytes().contains(&c) {
                    start + 1
                } else {
                    self.word_end(start)
                }
            }
        };

        self.pos = end;
        let token = Token {
            text: &self.content[start..end],
            position: start,
        };
        self.last = Some(token);
        self.last_position = start;
        Ok(Some(token))
    }

    fn word_end(&self, start: usize) -> usize {
        let bytes = self.content.as_bytes();
        let mut i = start;
        while i < self.hi {
            let b = bytes[i];
            if b.is_ascii_whitespace()
                || b == b'\''
                || b == b'"'
                || b == b'`'
                || ONE_CHAR_SYMBOLS.as_bytes().contains(&b)
                || b == b'!'
            {
                break;
            }
            i += 1;
        }
        // "t.*" is one token
        if i < self.hi && i > start && bytes[i - 1] == b'.' && bytes[i] == b'*' {
            i += 1;
        }
        if i == start {
            // lone character no other rule accepts
            i = start + self.content[start..].chars().next().map_or(1, char::len_utf8);
        }
        i
    }

    fn skip_blanks(&mut self) -> Result<()> {
        let bytes = self.content.as_bytes();
        loop {
            while self.pos < self.hi && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            let rest = &self.content[self.pos..self.hi];
            if rest.starts_with("--") {
                self.pos = match rest.find('\n') {
                    Some(nl) => self.pos + nl + 1,
                    None => self.hi,
                };
            } else if rest.starts_with("/*") {
                self.skip_block_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let start = self.pos;
        let mut depth = 0usize;
        while self.pos < self.hi {
            let rest = &self.content[self.pos..self.hi];
            if rest.starts_with("/*") {
                depth += 1;
                self.pos += 2;
            } else if rest.starts_with("*/") {
                depth -= 1;
                self.pos += 2;
                if depth == 0 {
                    return Ok(());
                }
            } else {
                self.pos += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
        Err(Error::lex(start, "unterminated comment"))
    }
}

/// Strips matching quotes from a token, if present.
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if matches!(first, b'\'' | b'"' | b'`') && bytes[bytes.len() - 1] == first {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn tokens(sql: &str) -> Vec<&str> {
        let mut lexer = Lexer::new(sql);
        let mut out = Vec::new();
        while let Some(t) = lexer.next_token().unwrap() {
            out.push(t.text);
        }
        out
    }

    #[test]
    fn test_symbols_longest_match() {
        assert_eq!(
            tokens("a>=b!=c<d<=e!~f"),
            ["a", ">=", "b", "!=", "c", "<", "d", "<=", "e", "!~", "f"]
        );
        assert_eq!(tokens("f(x,y);"), ["f", "(", "x", ",", "y", ")", ";"]);
    }

    #[test]
    fn test_quotes_and_dots() {
        assert_eq!(
            tokens("select t.x, 'a b', \"c\" from t"),
            ["select", "t.x", ",", "'a b'", ",", "\"c\"", "from", "t"]
        );
        assert_eq!(tokens("select t.* from t"), ["select", "t.*", "from", "t"]);
        assert_eq!(tokens("a in (`blah blah`)"), ["a", "in", "(", "`blah blah`", ")"]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(tokens("a -- note\n+ b"), ["a", "+", "b"]);
        assert_eq!(tokens("a /* x /* nested */ y */ b"), ["a", "b"]);
        let mut lexer = Lexer::new("a /* open");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.position(), Some(2));
    }

    #[test]
    fn test_unterminated_quote() {
        let mut lexer = Lexer::new("x = 'abc");
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.position(), Some(4));
        assert!(matches!(err, Error::Lex { .. }));
    }

    #[test]
    fn test_unparse_and_position() {
        let mut lexer = Lexer::new("select  x");
        let t = lexer.next_token().unwrap().unwrap();
        assert_eq!(t.position, 0);
        let x = lexer.next_token().unwrap().unwrap();
        assert_eq!(x.position, 8);
        lexer.unparse();
        lexer.unparse();
        assert_eq!(lexer.next_token().unwrap().unwrap().text, "x");
        assert_eq!(lexer.next_token().unwrap(), None);
        assert_eq!(lexer.position(), 8);
    }

    #[test]
    fn test_range() {
        let sql = "with x as (select a from t) x";
        let lo = sql.find('(').unwrap() + 1;
        let hi = sql.find(')').unwrap();
        let mut lexer = Lexer::with_range(sql, lo, hi);
        let first = lexer.next_token().unwrap().unwrap();
        assert_eq!(first.text, "select");
        assert_eq!(first.position, lo);
        let mut count = 1;
        while lexer.next_token().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("abc"), "abc");
        assert_eq!(unquote("'"), "'");
    }
}
