pub mod sexp;

use std::str::Chars;
use thiserror::Error;

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("parse error: {msg} at {pos}")]
pub struct ParseError {
    pub msg: String,
    pub pos: SourcePos,
    /// the input ended before the expression was closed
    incomplete: bool,
}

impl ParseError {
    fn new(msg: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            msg: msg.into(),
            pos,
            incomplete: false,
        }
    }

    fn unexpected_eof(pos: SourcePos) -> Self {
        Self {
            msg: "Unexpected end of input".to_string(),
            pos,
            incomplete: true,
        }
    }

    /// Returns true if more input could turn this error into a successful parse.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }
}

/// Line and column (both 1-based) of a character in the input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SourcePos {
    line: usize,
    column: usize,
}

impl SourcePos {
    fn new() -> Self {
        Self { line: 1, column: 0 }
    }

    fn advance(&mut self, len: usize) {
        self.column += len;
    }

    fn newline(&mut self) {
        self.line += 1;
        self.column = 0;
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

struct CharIterator<'a> {
    chars: Chars<'a>,
    pos: SourcePos,
    next_char: Option<char>,
}

impl<'a> CharIterator<'a> {
    fn new(content: &'a str) -> CharIterator<'a> {
        let mut chars = content.chars();
        CharIterator {
            next_char: chars.next(),
            chars,
            pos: SourcePos::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.next_char
    }

    fn next(&mut self) -> Option<char> {
        match self.next_char {
            None => None,
            Some(c) => {
                if c == '\n' {
                    self.pos.newline()
                } else {
                    self.pos.advance(1)
                }
                self.next_char = self.chars.next();
                Some(c)
            }
        }
    }

    /// Consumes characters up to and including `end`, pushing them to `buf`.
    fn read_until(&mut self, end: char, buf: &mut String) -> Result<(), ParseError> {
        loop {
            match self.next() {
                None => return Err(ParseError::unexpected_eof(self.pos)),
                Some(c) => {
                    buf.push(c);
                    if c == end {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn skip_while<P>(&mut self, predicate: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.next();
        }
    }
}
