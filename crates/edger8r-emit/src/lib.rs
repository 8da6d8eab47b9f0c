//! Code emitters for the EDL edge-routine generator.
//!
//! # Architecture
//!
//! The emitters consume a finalised [`edger8r_types::ast::Edl`] and write
//! plain ASCII C files into a caller-supplied directory; they never
//! re-parse. For an input `<name>.edl` the outputs are:
//!
//! - `<name>_args.h`: user types shared by both sides
//! - `<name>_t.h` / `<name>_t.c`: trusted side, with the ECALL forwarders,
//!   ECALL table, OCALL wrappers
//! - `<name>_u.h` / `<name>_u.c`: untrusted side, with the ECALL wrappers, the
//!   ECALL name table, OCALL forwarders and the OCALL table, plus
//!   `oe_create_<name>_enclave`
//!
//! A single marshalling protocol underlies the wrapper/forwarder pair:
//! one flat buffer carrying an args struct plus aligned sub-buffers for
//! each pointer payload, sized with the overflow-checked
//! `OE_ADD_SIZE`/`OE_ADD_ARG_SIZE`/`OE_COMPUTE_SIZE` discipline, and a
//! separate out-of-band deepcopy-out buffer for dynamically sized
//! outputs. The emitters are parameterised by direction (caller/callee)
//! and side (trusted/untrusted) rather than duplicated per combination.
//!
//! Declaration order follows the document, so re-running the generator on
//! the same inputs produces byte-identical files.

mod args_h;
mod ctype;
mod forwarder;
mod header;
mod source;
mod wrapper;
mod writer;

pub use writer::{EmitError, GeneratedFile, GenerationReport};

use edger8r_types::ast::Edl;
use std::path::Path;

/// Emit the trusted-side outputs: `<name>_args.h`, `<name>_t.h`, and
/// (unless `header_only`) `<name>_t.c`.
pub fn emit_trusted(
    edl: &Edl,
    dir: &Path,
    header_only: bool,
) -> Result<Vec<GeneratedFile>, EmitError> {
    let mut files = vec![
        args_h::emit(edl, dir)?,
        header::emit(edl, dir, true, "")?,
    ];
    if !header_only {
        files.push(source::emit_trusted(edl, dir)?);
    }
    Ok(files)
}

/// Emit the untrusted-side outputs: `<name>_args.h`, `<name>_u.h`, and
/// (unless `header_only`) `<name>_u.c`. `prefix` is the `--use-prefix`
/// symbol prefix (empty when disabled).
pub fn emit_untrusted(
    edl: &Edl,
    dir: &Path,
    prefix: &str,
    header_only: bool,
) -> Result<Vec<GeneratedFile>, EmitError> {
    let mut files = vec![
        args_h::emit(edl, dir)?,
        header::emit(edl, dir, false, prefix)?,
    ];
    if !header_only {
        files.push(source::emit_untrusted(edl, dir, prefix)?);
    }
    Ok(files)
}
