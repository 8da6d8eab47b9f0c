//! Core EDL lexer: a pull-style cursor over one source buffer.
//!
//! One operation: produce the next token. Whitespace and `//` / `/* */`
//! comments are skipped (a tab advances the column by four); the
//! single-character tokens are `{ } ( ) [ ] * , ; = #`; names, integers
//! and double-quoted single-line string literals are the multi-character
//! tokens. The lexer never allocates per token: every token borrows the
//! source buffer.
//!
//! Unterminated strings and unterminated block comments are fatal with a
//! located diagnostic.

use edger8r_types::{EdlError, Result, SourceFile, Span};

use crate::token::Token;

/// The EDL lexer.
pub struct Lexer<'src> {
    source_file: &'src SourceFile,
    /// The full source text as bytes.
    source: &'src [u8],
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source file.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            source_file,
            source: source_file.source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn error(&self, line: u32, col: u32, message: impl Into<String>) -> EdlError {
        let source_line = self.source_file.line(line).unwrap_or("").to_string();
        EdlError::new(
            &self.source_file.name,
            message,
            Span::point(line, col),
            source_line,
        )
    }

    /// Skip whitespace and comments. `\t` advances the column by four;
    /// `\r`, `\b` and `\v` advance nothing.
    fn skip_ws(&mut self) -> Result<()> {
        while let Some(ch) = self.peek() {
            match ch {
                b'\t' => {
                    self.col += 4;
                    self.pos += 1;
                    continue;
                }
                b' ' => {
                    self.col += 1;
                    self.pos += 1;
                    continue;
                }
                b'\n' => {
                    self.line += 1;
                    self.col = 1;
                    self.pos += 1;
                    continue;
                }
                b'\r' | 0x08 | 0x0b => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }

            if ch == b'/' && self.peek_at(1) == Some(b'/') {
                // Single line comment.
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                continue;
            }
            if ch == b'/' && self.peek_at(1) == Some(b'*') {
                let (start_line, start_col) = (self.line, self.col);
                self.pos += 2;
                self.col += 2;
                loop {
                    match (self.peek(), self.peek_at(1)) {
                        (Some(b'*'), Some(b'/')) => {
                            self.pos += 2;
                            self.col += 2;
                            break;
                        }
                        (Some(b'\n'), _) => {
                            self.line += 1;
                            self.col = 1;
                            self.pos += 1;
                        }
                        (Some(_), _) => {
                            self.col += 1;
                            self.pos += 1;
                        }
                        (None, _) => {
                            return Err(self.error(
                                start_line,
                                start_col,
                                "end of file while looking for `*/`",
                            ));
                        }
                    }
                }
                continue;
            }
            break;
        }
        Ok(())
    }

    fn slice(&self, start: usize) -> &'src str {
        &self.source_file.source[start..self.pos]
    }

    /// Produce the next token.
    pub fn next(&mut self) -> Result<Token<'src>> {
        self.skip_ws()?;

        let (line, col) = (self.line, self.col);
        let start = self.pos;

        let ch = match self.peek() {
            None => return Ok(Token::eof(line, col)),
            Some(ch) => ch,
        };

        match ch {
            b'{' | b'}' | b'(' | b')' | b'[' | b']' | b'*' | b',' | b';' | b'=' | b'#' => {
                self.pos += 1;
                self.col += 1;
                return Ok(Token::new(line, col, self.slice(start)));
            }
            _ => {}
        }

        if ch.is_ascii_alphabetic() || ch == b'_' {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                self.pos += 1;
            }
            self.col += (self.pos - start) as u32;
            return Ok(Token::new(line, col, self.slice(start)));
        }

        if ch.is_ascii_digit() {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
            self.col += (self.pos - start) as u32;
            return Ok(Token::new(line, col, self.slice(start)));
        }

        if ch == b'"' {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c != b'"' && c != b'\n') {
                self.pos += 1;
            }
            if self.peek() != Some(b'"') {
                return Err(self.error(line, col, "expecting `\"`"));
            }
            self.pos += 1;
            self.col += (self.pos - start) as u32;
            return Ok(Token::new(line, col, self.slice(start)));
        }

        Err(self.error(
            line,
            col,
            format!("unexpected character `{}`", ch as char),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<String> {
        let sf = SourceFile::new("test.edl", source);
        let mut lexer = Lexer::new(&sf);
        let mut out = Vec::new();
        loop {
            let t = lexer.next().expect("lex error");
            if t.is_eof() {
                break;
            }
            out.push(t.as_str().to_string());
        }
        out
    }

    #[test]
    fn test_punctuation_and_names() {
        let toks = lex_all("enclave { trusted { }; };");
        assert_eq!(
            toks,
            vec!["enclave", "{", "trusted", "{", "}", ";", "}", ";"]
        );
    }

    #[test]
    fn test_pointer_chain() {
        let toks = lex_all("char** p;");
        assert_eq!(toks, vec!["char", "*", "*", "p", ";"]);
    }

    #[test]
    fn test_comments_skipped() {
        let toks = lex_all("int // line comment\n/* block\ncomment */ x");
        assert_eq!(toks, vec!["int", "x"]);
    }

    #[test]
    fn test_string_literal_keeps_quotes() {
        let toks = lex_all("include \"my_header.h\";");
        assert_eq!(toks, vec!["include", "\"my_header.h\"", ";"]);
    }

    #[test]
    fn test_line_and_column_tracking() {
        let sf = SourceFile::new("test.edl", "enclave\n    trusted");
        let mut lexer = Lexer::new(&sf);
        let a = lexer.next().unwrap();
        assert_eq!((a.line, a.col), (1, 1));
        let b = lexer.next().unwrap();
        assert_eq!((b.line, b.col), (2, 5));
    }

    #[test]
    fn test_tab_advances_four_columns() {
        let sf = SourceFile::new("test.edl", "\tx");
        let mut lexer = Lexer::new(&sf);
        let t = lexer.next().unwrap();
        assert_eq!(t.col, 5);
    }

    #[test]
    fn test_eof_is_sticky() {
        let sf = SourceFile::new("test.edl", "x");
        let mut lexer = Lexer::new(&sf);
        assert!(!lexer.next().unwrap().is_eof());
        assert!(lexer.next().unwrap().is_eof());
        assert!(lexer.next().unwrap().is_eof());
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let sf = SourceFile::new("test.edl", "include \"oops\n;");
        let mut lexer = Lexer::new(&sf);
        let _ = lexer.next().unwrap();
        let err = lexer.next().unwrap_err();
        assert!(err.message.contains("expecting `\"`"));
        assert_eq!(err.span.start_line, 1);
    }

    #[test]
    fn test_unterminated_block_comment_is_fatal() {
        let sf = SourceFile::new("test.edl", "/* never closed");
        let mut lexer = Lexer::new(&sf);
        let err = lexer.next().unwrap_err();
        assert!(err.message.contains("*/"));
    }

    #[test]
    fn test_unexpected_character_is_fatal() {
        let sf = SourceFile::new("test.edl", "@");
        let mut lexer = Lexer::new(&sf);
        let err = lexer.next().unwrap_err();
        assert!(err.message.contains("unexpected character"));
    }
}
