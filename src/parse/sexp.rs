//! Reader for SMT-LIB 2 s-expressions.
//!
//! Problem files are split into their top-level commands with [`parse`], solver
//! responses are read one at a time with [`parse_one`]. Atoms keep their source
//! spelling (string literals keep their quotes, quoted symbols keep their bars),
//! so printing an expression yields text the solver accepts again.

use super::{CharIterator, ParseError};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn atom(text: impl Into<String>) -> Self {
        Sexp::Atom(text.into())
    }

    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(text) => Some(text),
            Sexp::List(_) => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::Atom(_) => None,
            Sexp::List(items) => Some(items),
        }
    }

    /// The leading atom of a list, e.g., `assert` for `(assert p)`.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// The atom as a symbol name, with `|quoted|` symbols unquoted.
    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        let text = self.as_atom()?;
        if text.len() >= 2 && text.starts_with('|') && text.ends_with('|') {
            Some(&text[1..text.len() - 1])
        } else {
            Some(text)
        }
    }

    /// The contents of a string literal atom, with `""` escapes resolved.
    #[must_use]
    pub fn string_value(&self) -> Option<String> {
        let text = self.as_atom()?;
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            Some(text[1..text.len() - 1].replace("\"\"", "\""))
        } else {
            None
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(text) => write!(f, "{}", text),
            Sexp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parses every top-level expression in `content`.
pub fn parse(content: &str) -> Result<Vec<Sexp>, ParseError> {
    let mut chars = CharIterator::new(content);
    let mut exprs = Vec::new();
    while let Some(expr) = read_expr(&mut chars)? {
        exprs.push(expr);
    }
    Ok(exprs)
}

/// Parses the first expression in `content` and ignores whatever follows it.
///
/// Input that contains no complete expression yields an error for which
/// [`ParseError::is_incomplete`] holds.
pub fn parse_one(content: &str) -> Result<Sexp, ParseError> {
    let mut chars = CharIterator::new(content);
    match read_expr(&mut chars)? {
        Some(expr) => Ok(expr),
        None => Err(ParseError::unexpected_eof(chars.pos)),
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')' || c == ';' || c == '"' || c == '|'
}

fn skip_layout(chars: &mut CharIterator<'_>) {
    loop {
        chars.skip_while(char::is_whitespace);
        if chars.peek() == Some(';') {
            chars.skip_while(|c| c != '\n');
        } else {
            return;
        }
    }
}

fn read_expr(chars: &mut CharIterator<'_>) -> Result<Option<Sexp>, ParseError> {
    skip_layout(chars);
    let first = match chars.peek() {
        None => return Ok(None),
        Some(c) => c,
    };
    match first {
        '(' => {
            chars.next();
            let mut items = Vec::new();
            loop {
                skip_layout(chars);
                match chars.peek() {
                    None => return Err(ParseError::unexpected_eof(chars.pos)),
                    Some(')') => {
                        chars.next();
                        return Ok(Some(Sexp::List(items)));
                    }
                    Some(_) => {
                        if let Some(item) = read_expr(chars)? {
                            items.push(item);
                        }
                    }
                }
            }
        }
        ')' => {
            chars.next();
            Err(ParseError::new("Unexpected `)`", chars.pos))
        }
        '"' => {
            let mut text = String::new();
            chars.next();
            text.push('"');
            loop {
                chars.read_until('"', &mut text)?;
                // `""` is an escaped quote inside a string literal
                if chars.peek() == Some('"') {
                    chars.next();
                    text.push('"');
                } else {
                    break;
                }
            }
            Ok(Some(Sexp::Atom(text)))
        }
        '|' => {
            let mut text = String::new();
            chars.next();
            text.push('|');
            chars.read_until('|', &mut text)?;
            Ok(Some(Sexp::Atom(text)))
        }
        _ => {
            let mut text = String::new();
            while let Some(c) = chars.peek() {
                if is_delimiter(c) {
                    break;
                }
                text.push(c);
                chars.next();
            }
            Ok(Some(Sexp::Atom(text)))
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_commands() {
        let content = "; a comment\n(set-logic QF_LIA)\n(declare-const x Int)\n(assert (= x 1)) ; trailing\n(check-sat)\n";
        let commands = parse(content).unwrap();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0].head(), Some("set-logic"));
        assert_eq!(commands[2].to_string(), "(assert (= x 1))");
        assert_eq!(commands[3].head(), Some("check-sat"));
    }

    #[test]
    fn test_string_and_quoted_symbols() {
        let content = "(echo \"a ) \"\"quoted\"\" (\") (declare-const |x y| Bool)";
        let commands = parse(content).unwrap();
        assert_eq!(commands.len(), 2);
        let string = &commands[0].as_list().unwrap()[1];
        assert_eq!(string.string_value().unwrap(), "a ) \"quoted\" (");
        let symbol = &commands[1].as_list().unwrap()[1];
        assert_eq!(symbol.as_atom(), Some("|x y|"));
        assert_eq!(symbol.symbol_name(), Some("x y"));
    }

    #[test]
    fn test_incomplete() {
        let err = parse("(assert (and a b)").unwrap_err();
        assert!(err.is_incomplete());
        let err = parse_one("  \n").unwrap_err();
        assert!(err.is_incomplete());
        let err = parse("(echo \"open").unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_unbalanced() {
        let err = parse("(check-sat))").unwrap_err();
        assert!(!err.is_incomplete());
        assert_eq!(err.pos.line(), 1);
        assert_eq!(err.pos.column(), 12);
    }

    #[test]
    fn test_multiline_response() {
        let response = "(\n  (define-fun x () Int\n    1)\n  (define-fun y () Int\n    (- 2))\n)\n";
        let model = parse_one(response).unwrap();
        let decls = model.as_list().unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].to_string(), "(define-fun y () Int (- 2))");
    }

    #[test]
    fn test_parse_one_ignores_rest() {
        assert_eq!(parse_one("sat\nunsat").unwrap(), Sexp::atom("sat"));
    }
}
