//! Line-oriented text building and deterministic file output.
//!
//! Each output file is built fully in memory, written once, and reported
//! with its content hash so determinism across runs is directly
//! checkable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the file-writing edge of the emitters.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One emitted output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    /// SHA-256 of the file contents (hex-encoded).
    pub sha256: String,
}

/// The outputs produced for one EDL document, JSON-serializable so
/// build harnesses can consume the file list and verify determinism
/// across runs by hash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Basename of the EDL document.
    pub edl: String,
    pub files: Vec<GeneratedFile>,
}

impl GenerationReport {
    pub fn new(edl: impl Into<String>) -> Self {
        Self {
            edl: edl.into(),
            files: Vec::new(),
        }
    }

    pub fn extend(&mut self, files: Vec<GeneratedFile>) {
        self.files.extend(files);
    }
}

/// A growable buffer of output lines.
///
/// `line` appends one line and returns `&mut self` so emission sites read
/// as a chain of lines, mirroring the shape of the generated text.
#[derive(Debug, Default)]
pub(crate) struct CodeWriter {
    buf: String,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line (a `\n` is added).
    pub fn line(&mut self, s: impl AsRef<str>) -> &mut Self {
        self.buf.push_str(s.as_ref());
        self.buf.push('\n');
        self
    }

    /// Append an empty line.
    pub fn blank(&mut self) -> &mut Self {
        self.buf.push('\n');
        self
    }

    /// Write the accumulated text to `dir/name` and report it.
    pub fn write_to(self, dir: &Path, name: &str) -> Result<GeneratedFile, EmitError> {
        let path = dir.join(name);
        std::fs::write(&path, self.buf.as_bytes()).map_err(|source| EmitError::Write {
            path: path.clone(),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(self.buf.as_bytes());
        let digest = hasher.finalize();
        let mut sha256 = String::with_capacity(64);
        for b in digest {
            write!(sha256, "{b:02x}").expect("writing to String cannot fail");
        }

        tracing::debug!("emitted {} ({})", path.display(), sha256);
        Ok(GeneratedFile { path, sha256 })
    }
}

/// The preamble every generated file begins with.
pub(crate) fn emit_preamble(out: &mut CodeWriter) {
    out.line("/*")
        .line(" *  This file is auto generated by oeedger8r. DO NOT EDIT.")
        .line(" */");
}

/// Preamble plus opening include guard.
pub(crate) fn emit_guard_open(out: &mut CodeWriter, guard: &str) {
    emit_preamble(out);
    out.line(format!("#ifndef {guard}"))
        .line(format!("#define {guard}"));
}

/// Closing include guard.
pub(crate) fn emit_guard_close(out: &mut CodeWriter, guard: &str) {
    out.line(format!("#endif // {guard}"));
}
