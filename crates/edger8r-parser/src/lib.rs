//! EDL parser: recursive descent with two-token lookahead over the
//! directive-filtered token stream.
//!
//! Entry point is [`parse_file`], which resolves the path against the
//! context's search paths, detects recursive imports, and interns parsed
//! documents in the per-run cache so re-imports share one [`Edl`] by
//! reference.

mod attrs;
mod checks;
mod context;
mod parser;
mod types;

pub use context::ParseContext;

use edger8r_types::ast::Edl;
use edger8r_types::{EdlError, Result, SourceFile};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use parser::Parser;

/// Resolve `path` against the context's search paths: the path itself
/// first, then each search directory in order; the first existing file
/// wins.
fn resolve_path(path: &Path, ctx: &ParseContext) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    ctx.search_paths
        .iter()
        .map(|dir| dir.join(path))
        .find(|p| p.is_file())
}

/// Parse one EDL file (and, recursively, everything it imports).
///
/// A cache hit returns the previously parsed document by reference; a
/// file currently being parsed further up the stack is a fatal recursive
/// import.
pub fn parse_file(path: &Path, ctx: &mut ParseContext) -> Result<Rc<Edl>> {
    let resolved = resolve_path(path, ctx).ok_or_else(|| {
        EdlError::file_level(
            path.display().to_string(),
            "file not found within search paths",
        )
    })?;
    let canonical = resolved.canonicalize().unwrap_or(resolved);

    // Detect recursive imports, listing the whole in-progress stack.
    if ctx.stack().contains(&canonical) {
        let mut message = String::from("recursive import detected\n");
        for frame in ctx.stack().iter().rev() {
            message.push_str(&frame.display().to_string());
            message.push('\n');
        }
        message.push_str(&canonical.display().to_string());
        return Err(EdlError::file_level(
            canonical.display().to_string(),
            message,
        ));
    }

    // Re-importing an already parsed file returns the cached document.
    if let Some(edl) = ctx.cached(&canonical) {
        return Ok(edl);
    }

    let file_name = canonical.display().to_string();
    let source = std::fs::read_to_string(&canonical)
        .map_err(|e| EdlError::file_level(&file_name, format!("cannot open file: {e}")))?;
    let source_file = SourceFile::new(&file_name, source);

    let basename = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());

    ctx.push(canonical.clone());
    let result = Parser::new(&source_file, basename, ctx).and_then(Parser::parse);
    ctx.pop();

    let edl = Rc::new(result?);
    ctx.intern(canonical, edl.clone());
    Ok(edl)
}
