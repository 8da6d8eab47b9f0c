//! `<name>_args.h`: user includes and user-defined types, shared by both
//! sides.

use edger8r_types::ast::{Edl, TypeTag, UserType};
use std::path::Path;

use crate::ctype::{decl_str, upper};
use crate::writer::{emit_guard_close, emit_guard_open, CodeWriter, EmitError, GeneratedFile};

pub(crate) fn emit(edl: &Edl, dir: &Path) -> Result<GeneratedFile, EmitError> {
    let guard = format!("EDGER8R_{}_ARGS_H", upper(&edl.name));
    let mut out = CodeWriter::new();

    emit_guard_open(&mut out, &guard);
    out.blank()
        .line("#include <openenclave/bits/result.h>")
        .blank()
        .line("/**** User includes. ****/");
    user_includes(&mut out, edl);
    out.line("/**** User defined types in EDL. ****/");
    user_types(&mut out, edl);
    emit_guard_close(&mut out, &guard);

    out.write_to(dir, &format!("{}_args.h", edl.name))
}

fn user_includes(out: &mut CodeWriter, edl: &Edl) {
    if edl.includes.is_empty() {
        out.line("/* There were no user includes. */");
    } else {
        for inc in &edl.includes {
            out.line(format!("#include {inc}"));
        }
    }
    out.blank();
}

fn user_types(out: &mut CodeWriter, edl: &Edl) {
    if edl.types.is_empty() {
        out.line("/* There were no user defined types. */").blank();
        return;
    }
    for t in &edl.types {
        if t.tag == TypeTag::Enum {
            enum_type(out, t);
        } else {
            struct_or_union_type(out, t);
        }
    }
}

fn enum_type(out: &mut CodeWriter, t: &UserType) {
    let uname = upper(&t.name);
    out.line(format!("#ifndef EDGER8R_ENUM_{uname}"))
        .line(format!("#define EDGER8R_ENUM_{uname}"))
        .line(format!("typedef enum {}", t.name))
        .line("{");
    let last = t.items.len().saturating_sub(1);
    for (i, v) in t.items.iter().enumerate() {
        let value = v
            .value
            .as_ref()
            .map(|val| format!(" = {}", val.name))
            .unwrap_or_default();
        let comma = if i < last { "," } else { "" };
        out.line(format!("    {}{value}{comma}", v.name));
    }
    out.line(format!("}} {};", t.name)).line("#endif").blank();
}

fn struct_or_union_type(out: &mut CodeWriter, t: &UserType) {
    let tag = if t.tag == TypeTag::Struct {
        "struct"
    } else {
        "union"
    };
    let utag = upper(tag);
    let uname = upper(&t.name);
    out.line(format!("#ifndef EDGER8R_{utag}_{uname}"))
        .line(format!("#define EDGER8R_{utag}_{uname}"))
        .line(format!("typedef {tag} {}", t.name))
        .line("{");
    for f in &t.fields {
        out.line(format!(
            "    {};",
            decl_str(&f.name, &f.ty, f.dims.as_deref())
        ));
    }
    out.line(format!("}} {};", t.name)).line("#endif").blank();
}
