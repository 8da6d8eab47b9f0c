use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location span.
///
/// All line/column values are 1-based for human-readable error messages.
/// Line 0 marks a file-level location with no position (e.g. "file not
/// found", "recursive import detected").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// A span with no position at all (file-level diagnostics).
    pub fn file_level() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Returns `true` if this span carries no position.
    pub fn is_file_level(&self) -> bool {
        self.start_line == 0
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        let start_line = self.start_line.min(other.start_line);
        let start_col = if self.start_line < other.start_line {
            self.start_col
        } else if other.start_line < self.start_line {
            other.start_col
        } else {
            self.start_col.min(other.start_col)
        };

        let end_line = self.end_line.max(other.end_line);
        let end_col = if self.end_line > other.end_line {
            self.end_col
        } else if other.end_line > self.end_line {
            other.end_col
        } else {
            self.end_col.max(other.end_col)
        };

        Span::new(start_line, start_col, end_line, end_col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Holds the source text of one EDL file for lexing and error reporting.
///
/// The lexer and parser borrow this; tokens are slices into `source`.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Cached line start byte offsets for fast line lookup.
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Extract a source line by 1-based line number.
    ///
    /// Returns `None` if the line number is out of range.
    pub fn line(&self, line_number: u32) -> Option<&str> {
        let idx = line_number.checked_sub(1)? as usize;
        if idx >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&s| s.saturating_sub(1)) // strip the \n
            .unwrap_or(self.source.len());
        let line = &self.source[start..end];
        Some(line.trim_end_matches('\r'))
    }

    /// Get the total number of lines.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_point() {
        let s = Span::point(3, 7);
        assert_eq!(s.start_line, 3);
        assert_eq!(s.start_col, 7);
        assert_eq!(s.end_line, 3);
        assert_eq!(s.end_col, 7);
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(1, 5, 1, 10);
        let b = Span::new(2, 3, 2, 8);
        let merged = a.merge(b);
        assert_eq!(merged.start_line, 1);
        assert_eq!(merged.start_col, 5);
        assert_eq!(merged.end_line, 2);
        assert_eq!(merged.end_col, 8);
    }

    #[test]
    fn test_span_display() {
        assert_eq!(format!("{}", Span::point(12, 4)), "12:4");
    }

    #[test]
    fn test_file_level_span() {
        assert!(Span::file_level().is_file_level());
        assert!(!Span::point(1, 1).is_file_level());
    }

    #[test]
    fn test_source_file_line_extraction() {
        let src = SourceFile::new("test.edl", "enclave {\n    trusted {\n};");
        assert_eq!(src.line(1), Some("enclave {"));
        assert_eq!(src.line(2), Some("    trusted {"));
        assert_eq!(src.line(3), Some("};"));
        assert_eq!(src.line(0), None);
        assert_eq!(src.line(4), None);
    }

    #[test]
    fn test_source_file_crlf() {
        let src = SourceFile::new("test.edl", "enclave {\r\n};\r\n");
        assert_eq!(src.line(1), Some("enclave {"));
        assert_eq!(src.line(2), Some("};"));
    }

    #[test]
    fn test_source_file_empty() {
        let src = SourceFile::new("test.edl", "");
        assert_eq!(src.line_count(), 1);
        assert_eq!(src.line(1), Some(""));
    }
}
