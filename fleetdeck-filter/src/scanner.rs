//! Clause scanner.
//!
//! Splits search text on whitespace, except inside double quotes or
//! parentheses. A clause that runs off the end of the input with an open
//! quote or paren is rescanned as a plain whitespace-delimited word, so one
//! stray `(` cannot swallow the clauses after it.

use std::iter::Peekable;
use std::str::CharIndices;

/// A raw clause and its byte span in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawClause<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Scanner over a search string.
pub struct Scanner<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    /// Byte offset that `chars` indices are relative to.
    base: usize,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            base: 0,
            pos: 0,
        }
    }

    /// Scan the whole source into clauses.
    pub fn clauses(mut self) -> Vec<RawClause<'a>> {
        let mut clauses = Vec::new();
        while let Some(clause) = self.next_clause() {
            clauses.push(clause);
        }
        clauses
    }

    fn next_clause(&mut self) -> Option<RawClause<'a>> {
        self.skip_whitespace();
        let start = self.pos;
        self.peek_char()?;

        let mut depth = 0usize;
        let mut in_quote = false;
        let mut escaped = false;

        while let Some(c) = self.peek_char() {
            if in_quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_quote = false;
                }
            } else {
                match c {
                    '"' => in_quote = true,
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    c if c.is_whitespace() && depth == 0 => break,
                    _ => {}
                }
            }
            self.advance();
        }

        if depth > 0 || in_quote {
            self.rewind_to_word_end(start);
        }

        Some(RawClause {
            text: &self.source[start..self.pos],
            start,
            end: self.pos,
        })
    }

    /// Reposition just past the first whitespace-delimited word at `start`.
    fn rewind_to_word_end(&mut self, start: usize) {
        let word_len = self.source[start..]
            .find(char::is_whitespace)
            .unwrap_or(self.source.len() - start);
        self.pos = start + word_len;
        self.chars = self.source[self.pos..].char_indices().peekable();
        self.base = self.pos;
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) {
        if let Some((i, c)) = self.chars.next() {
            self.pos = self.base + i + c.len_utf8();
        }
    }
}

/// Split `source` into raw clauses.
pub fn scan(source: &str) -> Vec<RawClause<'_>> {
    Scanner::new(source).clauses()
}
