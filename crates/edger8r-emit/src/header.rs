//! Side headers `<name>_t.h` / `<name>_u.h`: function-ID enums,
//! per-function marshalling structs, and prototypes for both call
//! directions.

use edger8r_types::ast::{Edl, Function};
use std::path::Path;

use crate::ctype::{create_prototype, mdecl_str, prototype, upper};
use crate::writer::{emit_guard_close, emit_guard_open, CodeWriter, EmitError, GeneratedFile};

pub(crate) fn emit(
    edl: &Edl,
    dir: &Path,
    gen_t: bool,
    prefix: &str,
) -> Result<GeneratedFile, EmitError> {
    let side = if gen_t { "t" } else { "u" };
    let guard = format!("EDGER8R_{}_{}_H", upper(&edl.name), upper(side));
    let include = if gen_t { "enclave" } else { "host" };
    let mut out = CodeWriter::new();

    emit_guard_open(&mut out, &guard);
    out.blank()
        .line(format!("#include <openenclave/{include}.h>"))
        .blank()
        .line(format!("#include \"{}_args.h\"", edl.name))
        .blank()
        .line("OE_EXTERNC_BEGIN")
        .blank();

    if !gen_t {
        out.line(format!("{};", create_prototype(&edl.name))).blank();
    }

    out.line("/**** Trusted function IDs ****/");
    function_ids(&mut out, edl, true);
    out.line("/**** ECALL marshalling structs. ****/");
    marshalling_structs(&mut out, &edl.trusted_funcs);
    out.line("/**** ECALL prototypes. ****/");
    // The --use-prefix prefix applies to untrusted-side ECALL wrappers only.
    prototypes(&mut out, &edl.trusted_funcs, true, gen_t, prefix);
    out.line("/**** Untrusted function IDs. ****/");
    function_ids(&mut out, edl, false);
    out.line("/**** OCALL marshalling structs. ****/");
    marshalling_structs(&mut out, &edl.untrusted_funcs);
    out.line("/**** OCALL prototypes. ****/");
    prototypes(&mut out, &edl.untrusted_funcs, false, gen_t, "");

    out.line("OE_EXTERNC_END").blank();
    emit_guard_close(&mut out, &guard);

    out.write_to(dir, &format!("{}_{side}.h", edl.name))
}

fn function_ids(out: &mut CodeWriter, edl: &Edl, trusted: bool) {
    let (funcs, max_tag) = if trusted {
        (&edl.trusted_funcs, "trusted_call_id_max")
    } else {
        (&edl.untrusted_funcs, "untrusted_call_max")
    };
    out.line("enum").line("{");
    let pfx = format!("    {}_fcn_id_", edl.name);
    for (idx, f) in funcs.iter().enumerate() {
        out.line(format!("{pfx}{} = {idx},", f.name));
    }
    out.line(format!("{pfx}{max_tag} = OE_ENUM_MAX"))
        .line("};")
        .blank();
}

fn marshalling_structs(out: &mut CodeWriter, funcs: &[std::rc::Rc<Function>]) {
    for f in funcs {
        marshalling_struct(out, f);
    }
}

/// One `<fn>_args_t` struct: result slot, return value, one member per
/// parameter (plus `_len` for strings), optional errno slot, and the
/// deepcopy-out buffer pair.
fn marshalling_struct(out: &mut CodeWriter, f: &Function) {
    out.line(format!("typedef struct _{}_args_t", f.name))
        .line("{")
        .line("    oe_result_t _result;");
    if !f.rtype.is_void() {
        out.line(format!("    {} _retval;", f.rtype));
    }
    for p in &f.params {
        out.line(format!("    {};", mdecl_str(p)));
        if p.attrs
            .as_ref()
            .is_some_and(|a| a.string || a.wstring)
        {
            out.line(format!("    size_t {}_len;", p.name));
        }
    }
    if f.errno {
        out.line("    int _ocall_errno;");
    }
    out.line("    void* deepcopy_out_buffer;")
        .line("    size_t deepcopy_out_buffer_size;")
        .line(format!("}} {}_args_t;", f.name))
        .blank();
}

fn prototypes(
    out: &mut CodeWriter,
    funcs: &[std::rc::Rc<Function>],
    ecall: bool,
    gen_t: bool,
    prefix: &str,
) {
    for f in funcs {
        out.line(format!("{};", prototype(f, ecall, gen_t, prefix)))
            .blank();
    }
    if funcs.is_empty() {
        out.blank();
    }
}
