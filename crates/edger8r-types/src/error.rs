use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A located fatal generator error.
///
/// The generator never recovers: the first `EdlError` aborts the current
/// input and surfaces as exit code 1 with a `file:line:col: message`
/// diagnostic on standard error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdlError {
    /// Source file name (full resolved path once known).
    pub file: String,
    /// Human-readable error message.
    pub message: String,
    /// Source location; may be file-level (no position).
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context, when available.
    pub source_line: String,
}

impl EdlError {
    /// Create a new located error.
    pub fn new(
        file: impl Into<String>,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
            span,
            source_line: source_line.into(),
        }
    }

    /// Create a file-level error with no source position
    /// (file not found, recursive import, unterminated directive).
    pub fn file_level(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
            span: Span::file_level(),
            source_line: String::new(),
        }
    }
}

impl fmt::Display for EdlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_file_level() {
            write!(f, "{}: {}", self.file, self.message)
        } else {
            write!(f, "{}:{}: {}", self.file, self.span, self.message)
        }
    }
}

impl std::error::Error for EdlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_display() {
        let err = EdlError::new(
            "enc.edl",
            "expecting `;` got `}`",
            Span::point(14, 9),
            "    public void f(void)",
        );
        assert_eq!(err.to_string(), "enc.edl:14:9: expecting `;` got `}`");
    }

    #[test]
    fn test_file_level_display() {
        let err = EdlError::file_level("missing.edl", "file not found within search paths");
        assert_eq!(
            err.to_string(),
            "missing.edl: file not found within search paths"
        );
    }

    #[test]
    fn test_json_round_trip() {
        let err = EdlError::new(
            "enc.edl",
            "unknown attribute: `inout'",
            Span::point(3, 21),
            "        public void f([inout] int* p);",
        );
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"message\""));
        assert!(json.contains("\"source_line\""));

        let back: EdlError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message, err.message);
        assert_eq!(back.span, err.span);
    }
}
