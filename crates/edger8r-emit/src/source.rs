//! Source files `<name>_t.c` / `<name>_u.c`: forwarders and their call
//! table on the native side, wrappers for the opposite side, the ECALL
//! name table, and the `oe_create_<name>_enclave` implementation.

use edger8r_types::ast::Edl;
use std::path::Path;

use crate::ctype::create_prototype;
use crate::forwarder::ForwarderEmitter;
use crate::wrapper::WrapperEmitter;
use crate::writer::{emit_preamble, CodeWriter, EmitError, GeneratedFile};

pub(crate) fn emit_trusted(edl: &Edl, dir: &Path) -> Result<GeneratedFile, EmitError> {
    let mut out = CodeWriter::new();
    emit_preamble(&mut out);
    out.line(format!("#include \"{}_t.h\"", edl.name))
        .blank()
        .line("#include <openenclave/edger8r/enclave.h>")
        .blank()
        .line("OE_EXTERNC_BEGIN")
        .blank()
        .line("/**** ECALL functions. ****/")
        .blank();
    for f in &edl.trusted_funcs {
        ForwarderEmitter::new(edl, &mut out, true).emit(f);
    }
    out.line("/**** ECALL function table. ****/").blank();
    ecalls_table(&mut out, edl);
    out.line("/**** OCALL function wrappers. ****/").blank();
    for f in &edl.untrusted_funcs {
        WrapperEmitter::new(edl, &mut out, false).emit(f, "");
    }
    if edl.untrusted_funcs.is_empty() {
        out.line("/* There were no ocalls. */");
    }
    out.line("OE_EXTERNC_END");

    out.write_to(dir, &format!("{}_t.c", edl.name))
}

pub(crate) fn emit_untrusted(
    edl: &Edl,
    dir: &Path,
    prefix: &str,
) -> Result<GeneratedFile, EmitError> {
    let mut out = CodeWriter::new();
    emit_preamble(&mut out);
    out.line(format!("#include \"{}_u.h\"", edl.name))
        .blank()
        .line("#include <openenclave/edger8r/host.h>")
        .blank()
        .line("OE_EXTERNC_BEGIN")
        .blank()
        .line("/**** ECALL info table. ****/")
        .blank();
    ecall_info_table(&mut out, edl);
    out.line("/**** ECALL function wrappers. ****/").blank();
    for f in &edl.trusted_funcs {
        WrapperEmitter::new(edl, &mut out, true).emit(f, prefix);
    }
    out.line("/**** OCALL functions. ****/").blank();
    for f in &edl.untrusted_funcs {
        ForwarderEmitter::new(edl, &mut out, false).emit(f);
    }
    if edl.untrusted_funcs.is_empty() {
        out.line("/* There were no ocalls. */").blank();
    }
    out.line("/**** OCALL function table. ****/").blank();
    ocalls_table(&mut out, edl);
    out.line(create_prototype(&edl.name))
        .line("{")
        .line("    return oe_create_enclave(")
        .line("               path,")
        .line("               type,")
        .line("               flags,")
        .line("               settings,")
        .line("               setting_count,")
        .line(format!(
            "               __{}_ocall_function_table,",
            edl.name
        ))
        .line(format!(
            "               {},",
            edl.untrusted_funcs.len()
        ))
        .line("               enclave);")
        .line("}")
        .blank()
        .line("OE_EXTERNC_END");

    out.write_to(dir, &format!("{}_u.c", edl.name))
}

fn ecalls_table(out: &mut CodeWriter, edl: &Edl) {
    out.line("oe_ecall_func_t __oe_ecalls_table[] = {");
    let count = edl.trusted_funcs.len();
    for (idx, f) in edl.trusted_funcs.iter().enumerate() {
        let comma = if idx + 1 < count { "," } else { "" };
        out.line(format!("    (oe_ecall_func_t) ecall_{}{comma}", f.name));
    }
    out.line("};")
        .blank()
        .line("size_t __oe_ecalls_table_size = OE_COUNTOF(__oe_ecalls_table);")
        .blank();
}

/// The host-side dispatch table mapping function IDs to ECALL symbol
/// names; wrappers resolve their `global_id` through it.
fn ecall_info_table(out: &mut CodeWriter, edl: &Edl) {
    out.line(format!(
        "static oe_ecall_info_t _{}_ecall_info_table[] = {{",
        edl.name
    ));
    let count = edl.trusted_funcs.len();
    for (idx, f) in edl.trusted_funcs.iter().enumerate() {
        let comma = if idx + 1 < count { "," } else { "" };
        out.line(format!("    {{ \"{}\" }}{comma}", f.name));
    }
    out.line("};").blank();
}

fn ocalls_table(out: &mut CodeWriter, edl: &Edl) {
    out.line(format!(
        "static oe_ocall_func_t __{}_ocall_function_table[] = {{",
        edl.name
    ));
    for f in &edl.untrusted_funcs {
        out.line(format!("    (oe_ocall_func_t) ocall_{},", f.name));
    }
    out.line("    NULL").line("};").blank();
}
