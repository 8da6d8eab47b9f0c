//! Per-run parse context: configuration plus the import stack and the
//! document cache.
//!
//! Kept explicit and threaded by `&mut` (not process-wide state) so that
//! independent generator runs are isolated.

use edger8r_types::ast::Edl;
use edger8r_types::WarningPolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Everything one generator run threads through its parsers.
#[derive(Debug, Default)]
pub struct ParseContext {
    /// Directories searched for imported EDL files, in order.
    pub search_paths: Vec<PathBuf>,
    /// `-D` names for the directive filter.
    pub defines: Vec<String>,
    /// Warning policy folded from the command line.
    pub policy: WarningPolicy,
    /// `--experimental` gate.
    pub experimental: bool,
    /// Documents already parsed, keyed by canonical path.
    cache: HashMap<PathBuf, Rc<Edl>>,
    /// Files currently being parsed, outermost first.
    stack: Vec<PathBuf>,
}

impl ParseContext {
    pub fn new(
        search_paths: Vec<PathBuf>,
        defines: Vec<String>,
        policy: WarningPolicy,
        experimental: bool,
    ) -> Self {
        Self {
            search_paths,
            defines,
            policy,
            experimental,
            cache: HashMap::new(),
            stack: Vec::new(),
        }
    }

    pub(crate) fn cached(&self, path: &Path) -> Option<Rc<Edl>> {
        self.cache.get(path).cloned()
    }

    pub(crate) fn intern(&mut self, path: PathBuf, edl: Rc<Edl>) {
        self.cache.insert(path, edl);
    }

    pub(crate) fn stack(&self) -> &[PathBuf] {
        &self.stack
    }

    pub(crate) fn push(&mut self, path: PathBuf) {
        self.stack.push(path);
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }
}
