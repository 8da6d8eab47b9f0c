//! Token type for the EDL lexer.
//!
//! A token is a borrowed slice of the source buffer plus its 1-based
//! line/column. Tokens are polymorphic at the lexical level: whether one
//! is a name, an integer, a string literal, or punctuation is decided by
//! inspection, not by a kind tag.

use edger8r_types::ast::Ident;
use edger8r_types::Span;
use std::fmt;

/// A single token produced by the EDL lexer.
///
/// Borrows the source buffer; tokens outlive the lexer but not the
/// source. End-of-file is the zero-length token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub line: u32,
    pub col: u32,
    text: &'src str,
}

impl<'src> Token<'src> {
    /// Create a new token over `text`.
    pub fn new(line: u32, col: u32, text: &'src str) -> Self {
        Self { line, col, text }
    }

    /// The synthetic zero-length end-of-file token.
    pub fn eof(line: u32, col: u32) -> Self {
        Self {
            line,
            col,
            text: "",
        }
    }

    /// The token's text.
    pub fn as_str(&self) -> &'src str {
        self.text
    }

    /// Returns `true` for the end-of-file token.
    pub fn is_eof(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns `true` if this token is a name (`[_A-Za-z][_A-Za-z0-9]*`).
    pub fn is_name(&self) -> bool {
        matches!(
            self.text.bytes().next(),
            Some(b) if b.is_ascii_alphabetic() || b == b'_'
        )
    }

    /// Returns `true` if this token is an integer literal.
    pub fn is_int(&self) -> bool {
        matches!(self.text.bytes().next(), Some(b) if b.is_ascii_digit())
    }

    /// Returns `true` if this token is a double-quoted string literal.
    pub fn is_string_literal(&self) -> bool {
        self.text.starts_with('"')
    }

    /// The token's location as a point span.
    pub fn span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    /// Capture the token as an owned spanned identifier for the AST.
    pub fn to_ident(&self) -> Ident {
        Ident::new(self.text, self.span())
    }

    /// The string literal's content, without the surrounding quotes.
    pub fn unquoted(&self) -> &'src str {
        self.text
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(self.text)
    }
}

impl PartialEq<&str> for Token<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl PartialEq<char> for Token<'_> {
    fn eq(&self, other: &char) -> bool {
        let mut chars = self.text.chars();
        chars.next() == Some(*other) && chars.next().is_none()
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eof() {
            f.write_str("end of file")
        } else {
            f.write_str(self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Token::new(1, 1, "enclave").is_name());
        assert!(Token::new(1, 1, "_tag").is_name());
        assert!(!Token::new(1, 1, "42").is_name());
        assert!(Token::new(1, 1, "42").is_int());
        assert!(Token::new(1, 1, "\"stdio.h\"").is_string_literal());
        assert!(Token::eof(3, 1).is_eof());
    }

    #[test]
    fn test_str_and_char_equality() {
        let t = Token::new(1, 1, "trusted");
        assert!(t == "trusted");
        assert!(t != "untrusted");
        let p = Token::new(1, 1, "{");
        assert!(p == '{');
        assert!(p != '}');
        // A multi-character token never equals a single char.
        assert!(t != 't');
    }

    #[test]
    fn test_unquoted() {
        let t = Token::new(1, 1, "\"other.edl\"");
        assert_eq!(t.unquoted(), "other.edl");
    }

    #[test]
    fn test_to_ident() {
        let t = Token::new(4, 9, "count");
        let id = t.to_ident();
        assert_eq!(id.name, "count");
        assert_eq!(id.span, Span::point(4, 9));
    }

    #[test]
    fn test_display() {
        assert_eq!(Token::new(1, 1, ";").to_string(), ";");
        assert_eq!(Token::eof(1, 1).to_string(), "end of file");
    }
}
