//! Shared types for the EDL edge-routine generator.
//!
//! This crate defines the AST node types, source spans, the located
//! fatal-error type, and the warning policy model used across all
//! generator stages.

pub mod ast;
mod error;
mod span;
mod warnings;

pub use error::EdlError;
pub use span::{SourceFile, Span};
pub use warnings::{Resolution, Warning, WarningPolicy, WarningState};

/// Result type used throughout the generator. The first fatal error
/// aborts the current input; there is no recovery.
pub type Result<T> = std::result::Result<T, EdlError>;
