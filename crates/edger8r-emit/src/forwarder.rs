//! Callee-side forwarder emission.
//!
//! For each function, one C function with the uniform
//! `(input_buffer, input_buffer_size, output_buffer, output_buffer_size,
//! output_bytes_written)` prototype that validates the buffers, relocates
//! in/in-out/out pointers into them, checks string null terminators (with
//! a speculative-load fence on the trusted side), invokes the user
//! function, serialises the deepcopy-out buffer, and reports the result.

use edger8r_types::ast::{Edl, Function, TypeTag};

use crate::ctype::{
    access_op, count_attr_str, decl_str, deep_copy_type, deep_copyable_fields,
    has_deep_copy_out, mtype_str, pcount, psize,
};
use crate::writer::CodeWriter;

pub(crate) struct ForwarderEmitter<'a> {
    edl: &'a Edl,
    out: &'a mut CodeWriter,
    /// Emitting an ECALL forwarder (runs on the trusted side) rather
    /// than an OCALL forwarder (runs on the untrusted side).
    ecall: bool,
    deep_copy_out: bool,
}

impl<'a> ForwarderEmitter<'a> {
    pub fn new(edl: &'a Edl, out: &'a mut CodeWriter, ecall: bool) -> Self {
        Self {
            edl,
            out,
            ecall,
            deep_copy_out: false,
        }
    }

    pub fn emit(&mut self, f: &Function) {
        self.deep_copy_out = has_deep_copy_out(self.edl, f);
        let pfx = if self.ecall { "ecall_" } else { "ocall_" };
        let args_t = format!("{}_args_t", f.name);

        self.out
            .line(format!("static void {pfx}{}(", f.name))
            .line("    uint8_t* input_buffer,")
            .line("    size_t input_buffer_size,")
            .line("    uint8_t* output_buffer,")
            .line("    size_t output_buffer_size,")
            .line("    size_t* output_bytes_written)")
            .line("{")
            .line("    oe_result_t _result = OE_FAILURE;");
        if !self.ecall {
            self.out.line("    OE_UNUSED(input_buffer_size);");
        }
        self.out
            .blank()
            .line("    /* Prepare parameters. */")
            .line(format!(
                "    {args_t}* _pargs_in = ({args_t}*)input_buffer;"
            ))
            .line(format!(
                "    {args_t}* _pargs_out = ({args_t}*)output_buffer;"
            ))
            .blank();
        if self.deep_copy_out {
            self.out
                .line("    uint8_t* _deepcopy_out_buffer = NULL;")
                .line("    size_t _deepcopy_out_buffer_offset = 0;")
                .line("    size_t _deepcopy_out_buffer_size = 0;")
                .blank();
        }
        self.out
            .line("    size_t _input_buffer_offset = 0;")
            .line("    size_t _output_buffer_offset = 0;")
            .line("    OE_ADD_SIZE(_input_buffer_offset, sizeof(*_pargs_in));")
            .line("    OE_ADD_SIZE(_output_buffer_offset, sizeof(*_pargs_out));")
            .blank()
            .line("    if (input_buffer_size < sizeof(*_pargs_in) || output_buffer_size < sizeof(*_pargs_in))")
            .line("        goto done;")
            .blank();
        if self.ecall {
            self.ecall_buffer_checks();
        } else {
            self.ocall_buffer_checks();
        }
        self.out.line("    /* Set in and in-out pointers. */");
        self.set_in_in_out_pointers(f);
        self.out
            .line("    /* Set out and in-out pointers. */")
            .line("    /* In-out parameters are copied to output buffer. */");
        self.set_out_in_out_pointers(f);
        if self.ecall {
            self.out
                .line("    /* Check that in/in-out strings are null terminated. */");
            self.check_null_terminators(f);
            self.out
                .line("    /* lfence after checks. */")
                .line("    oe_lfence();")
                .blank();
        }
        self.out.line("    /* Call user function. */");
        self.call_user_function(f);
        if self.deep_copy_out {
            self.out
                .line("    /* Compute the size for the deep-copy out buffer. */");
            self.compute_buffer_size_deep_copy_out(f);
            self.out
                .blank()
                .line("    if (_deepcopy_out_buffer_size)")
                .line("    {")
                .line("        _deepcopy_out_buffer = (uint8_t*) oe_malloc(_deepcopy_out_buffer_size);")
                .line("        if (!_deepcopy_out_buffer)")
                .line("        {")
                .line("            _result = OE_OUT_OF_MEMORY;")
                .line("            goto done;")
                .line("        }")
                .line("    }")
                .blank()
                .line("    /* Serialize the deep-copied content into the buffer. */");
            self.serialize_buffer_deep_copy_out(f);
            self.out
                .line("    if (_deepcopy_out_buffer_offset != _deepcopy_out_buffer_size)")
                .line("    {")
                .line("        _result = OE_FAILURE;")
                .line("        goto done;")
                .line("    }")
                .blank()
                .line("    /* Publish the deepcopy-out buffer through _pargs_out. */")
                .line("    _pargs_out->deepcopy_out_buffer = _deepcopy_out_buffer;")
                .line("    _pargs_out->deepcopy_out_buffer_size = _deepcopy_out_buffer_size;")
                .blank();
        } else {
            self.out
                .line("    /* There is no deep-copyable out parameter. */")
                .line("    _pargs_out->deepcopy_out_buffer = NULL;")
                .line("    _pargs_out->deepcopy_out_buffer_size = 0;")
                .blank();
        }
        self.propagate_errno(f);
        self.out
            .line("    /* Success. */")
            .line("    _result = OE_OK;")
            .line("    *output_bytes_written = _output_buffer_offset;")
            .blank()
            .line("done:");
        if self.deep_copy_out {
            self.out
                .line("    /* Free _pargs_out->deepcopy_out_buffer on failure. */")
                .line("    if (_result != OE_OK)")
                .line("    {")
                .line("        oe_free(_pargs_out->deepcopy_out_buffer);")
                .line("        _pargs_out->deepcopy_out_buffer = NULL;")
                .line("        _pargs_out->deepcopy_out_buffer_size = 0;")
                .line("    }")
                .blank()
                .line("    /* Free nested buffers allocated by the user function. */");
            self.free_deep_copy_out(f);
            self.out.blank();
        }
        self.write_result();
        self.out.line("}").blank();
    }

    fn ecall_buffer_checks(&mut self) {
        self.out
            .line("    /* Make sure input and output buffers lie within the enclave. */")
            .line("    /* oe_is_within_enclave explicitly checks if buffers are null or not. */")
            .line("    if (!oe_is_within_enclave(input_buffer, input_buffer_size))")
            .line("        goto done;")
            .blank()
            .line("    if (!oe_is_within_enclave(output_buffer, output_buffer_size))")
            .line("        goto done;")
            .blank();
    }

    fn ocall_buffer_checks(&mut self) {
        self.out
            .line("    /* Make sure input and output buffers are valid. */")
            .line("    if (!input_buffer || !output_buffer) {")
            .line("        _result = OE_INVALID_PARAMETER;")
            .line("        goto done;")
            .line("    }")
            .blank();
    }

    fn set_in_in_out_pointers(&mut self, f: &Function) {
        let mut empty = true;
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.is_in() => attrs,
                _ => continue,
            };
            let argcount = pcount(p, "_pargs_in->");
            let argsize = psize(p, "_pargs_in->");
            let cmd = if attrs.is_inout() {
                "OE_SET_IN_OUT_POINTER"
            } else {
                "OE_SET_IN_POINTER"
            };
            self.out
                .line(format!("    if (_pargs_in->{})", p.name))
                .line(format!(
                    "        {cmd}({}, {argcount}, {argsize}, {});",
                    p.name,
                    mtype_str(p)
                ));
            empty = false;

            if deep_copy_type(self.edl, p).is_none() {
                continue;
            }

            let count = count_attr_str(attrs.count.as_ref(), "_pargs_in->");
            let cond = format!("_pargs_in->{}", p.name);
            if count == "1" {
                self.set_pointers_deep_copy(&cond, &p.name, cmd, p, 2, "    ");
            } else {
                let expr = format!("{}[_i_1]", p.name);
                self.out
                    .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                    .line("    {");
                self.set_pointers_deep_copy(&cond, &expr, cmd, p, 2, "        ");
                self.out.line("    }");
            }
        }
        if empty {
            self.out.line("    /* There were no in nor in-out parameters. */");
        }
        self.out.blank();
    }

    fn set_out_in_out_pointers(&mut self, f: &Function) {
        let mut empty = true;
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.is_out() => attrs,
                _ => continue,
            };
            let argcount = pcount(p, "_pargs_in->");
            let argsize = psize(p, "_pargs_in->");
            let cmd = if attrs.is_inout() {
                "OE_COPY_AND_SET_IN_OUT_POINTER"
            } else {
                "OE_SET_OUT_POINTER"
            };
            self.out
                .line(format!("    if (_pargs_in->{})", p.name))
                .line(format!(
                    "        {cmd}({}, {argcount}, {argsize}, {});",
                    p.name,
                    mtype_str(p)
                ));
            empty = false;

            // Out-only deep copies are handled through the deepcopy-out
            // buffer after the call; only in-out walks relocate here.
            if deep_copy_type(self.edl, p).is_none() || attrs.is_out_only() {
                continue;
            }

            let count = count_attr_str(attrs.count.as_ref(), "_pargs_in->");
            let cond = format!("_pargs_in->{}", p.name);
            if count == "1" {
                self.set_pointers_deep_copy(&cond, &p.name, cmd, p, 2, "    ");
            } else {
                let expr = format!("{}[_i_1]", p.name);
                self.out
                    .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                    .line("    {");
                self.set_pointers_deep_copy(&cond, &expr, cmd, p, 2, "        ");
                self.out.line("    }");
            }
        }
        if empty {
            self.out.line("    /* There were no out nor in-out parameters. */");
        }
        self.out.blank();
    }

    fn set_pointers_deep_copy(
        &mut self,
        parent_condition: &str,
        parent_expr: &str,
        cmd: &str,
        parent_prop: &edger8r_types::ast::Decl,
        level: u32,
        indent: &str,
    ) {
        let ut = match deep_copy_type(self.edl, parent_prop) {
            Some(ut) => ut,
            None => return,
        };
        for prop in deep_copyable_fields(ut) {
            let op = access_op(parent_expr);
            let expr = format!("{parent_expr}{op}{}", prop.name);
            let prefix = format!("_pargs_in->{parent_expr}{op}");
            let argcount = pcount(prop, &prefix);
            let argsize = psize(prop, &prefix);
            let cond = format!("{parent_condition} && _pargs_in->{expr}");
            let mt = mtype_str(prop);
            self.out
                .line(format!("{indent}if ({cond})"))
                .line(format!(
                    "{indent}    {cmd}({expr}, {argcount}, {argsize}, {mt});"
                ));

            if deep_copy_type(self.edl, prop).is_none() {
                continue;
            }

            let count = count_attr_str(
                prop.attrs.as_ref().and_then(|a| a.count.as_ref()),
                &prefix,
            );
            if count == "1" {
                self.set_pointers_deep_copy(&cond, &expr, cmd, prop, level + 1, indent);
            } else {
                let idx = format!("_i_{level}");
                let item = format!("{parent_expr}{op}{}[{idx}]", prop.name);
                let loop_cond = format!("{parent_condition} && {prefix}{}", prop.name);
                self.out
                    .line(format!(
                        "{indent}for (size_t {idx} = 0; {idx} < {count}; {idx}++)"
                    ))
                    .line(format!("{indent}{{"));
                self.set_pointers_deep_copy(
                    &loop_cond,
                    &item,
                    cmd,
                    prop,
                    level + 1,
                    &format!("{indent}    "),
                );
                self.out.line(format!("{indent}}}"));
            }
        }
    }

    fn check_null_terminators(&mut self, f: &Function) {
        let mut strs = false;
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.string || attrs.wstring => attrs,
                _ => continue,
            };
            let check = if attrs.wstring {
                "OE_CHECK_NULL_TERMINATOR_WIDE"
            } else {
                "OE_CHECK_NULL_TERMINATOR"
            };
            self.out.line(format!(
                "    {check}(_pargs_in->{}, _pargs_in->{}_len);",
                p.name, p.name
            ));
            strs = true;
        }
        if !strs {
            self.out
                .line("    /* There were no in nor in-out string parameters. */");
        }
        self.out.blank();
    }

    fn call_user_function(&mut self, f: &Function) {
        let retstr = if !f.rtype.is_void() {
            "_pargs_out->_retval = "
        } else {
            ""
        };
        self.out.line(format!("    {retstr}{}(", f.name));
        let count = f.params.len();
        for (idx, p) in f.params.iter().enumerate() {
            let cast = if p.dims.as_ref().is_some_and(|d| !d.is_empty()) {
                // Cast the relocated pointer back to the declared array
                // shape and dereference it.
                let ty = decl_str("(*)", &p.ty, p.dims.as_deref());
                format!("*({ty})")
            } else if p.ty.tag == TypeTag::Foreign
                && p.attrs.as_ref().is_some_and(|a| a.isary)
            {
                format!("/* foreign array */ *({}*)", p.ty.name)
            } else if p.ty.is_ptr() {
                let s = p.ty.to_string();
                if s.contains("const ") {
                    format!("({s})")
                } else {
                    String::new()
                }
            } else {
                String::new()
            };
            let terminator = if idx + 1 < count { "," } else { ");" };
            self.out.line(format!(
                "        {cast}_pargs_in->{}{terminator}",
                p.name
            ));
        }
        if count == 0 {
            self.out.line("    );");
        }
        self.out.blank();
    }

    fn compute_buffer_size_deep_copy_out(&mut self, f: &Function) {
        let prefix = "_pargs_in->";
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.is_out_only() => attrs,
                _ => continue,
            };
            if deep_copy_type(self.edl, p).is_none() {
                continue;
            }

            let count = count_attr_str(attrs.count.as_ref(), prefix);
            let cond = format!("{prefix}{}", p.name);
            if count == "1" {
                let expr = format!("{prefix}{}", p.name);
                self.add_size_deep_copy(&cond, &expr, "_deepcopy_out_buffer_size", p, 2, "    ");
            } else {
                let expr = format!("{prefix}{}[_i_1]", p.name);
                self.out
                    .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                    .line("    {");
                self.add_size_deep_copy(
                    &cond,
                    &expr,
                    "_deepcopy_out_buffer_size",
                    p,
                    2,
                    "        ",
                );
                self.out.line("    }");
            }
        }
    }

    /// Size the deepcopy-out payloads. Driver values are read from the
    /// *input* args struct, not from anything the callee may have
    /// written.
    fn add_size_deep_copy(
        &mut self,
        parent_condition: &str,
        parent_expr: &str,
        buffer_size: &str,
        parent_prop: &edger8r_types::ast::Decl,
        level: u32,
        indent: &str,
    ) {
        let ut = match deep_copy_type(self.edl, parent_prop) {
            Some(ut) => ut,
            None => return,
        };
        for prop in deep_copyable_fields(ut) {
            let op = access_op(parent_expr);
            let expr = format!("{parent_expr}{op}{}", prop.name);
            let prefix = format!("{parent_expr}{op}");
            let argcount = pcount(prop, &prefix);
            let argsize = psize(prop, &prefix);
            let cond = format!("{parent_condition} && {expr}");
            self.out
                .line(format!("{indent}if ({cond})"))
                .line(format!(
                    "{indent}    OE_ADD_ARG_SIZE({buffer_size}, {argcount}, {argsize});"
                ));

            if deep_copy_type(self.edl, prop).is_none() {
                continue;
            }

            let count = count_attr_str(
                prop.attrs.as_ref().and_then(|a| a.count.as_ref()),
                &prefix,
            );
            if count == "1" {
                self.add_size_deep_copy(&cond, &expr, buffer_size, prop, level + 1, indent);
            } else {
                let idx = format!("_i_{level}");
                let item = format!("{parent_expr}{op}{}[{idx}]", prop.name);
                self.out
                    .line(format!(
                        "{indent}for (size_t {idx} = 0; {idx} < {count}; {idx}++)"
                    ))
                    .line(format!("{indent}{{"));
                self.add_size_deep_copy(
                    &cond,
                    &item,
                    buffer_size,
                    prop,
                    level + 1,
                    &format!("{indent}    "),
                );
                self.out.line(format!("{indent}}}"));
            }
        }
    }

    fn serialize_buffer_deep_copy_out(&mut self, f: &Function) {
        let prefix = "_pargs_in->";
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.is_out_only() => attrs,
                _ => continue,
            };
            if deep_copy_type(self.edl, p).is_none() {
                continue;
            }

            let cmd = "OE_WRITE_DEEPCOPY_OUT_PARAM";
            let count = count_attr_str(attrs.count.as_ref(), prefix);
            let cond = format!("{prefix}{}", p.name);
            if count == "1" {
                let expr = format!("{prefix}{}", p.name);
                self.serialize_pointers_deep_copy(&cond, &expr, cmd, p, 2, "    ");
            } else {
                let expr = format!("{prefix}{}[_i_1]", p.name);
                self.out
                    .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                    .line("    {");
                self.serialize_pointers_deep_copy(&cond, &expr, cmd, p, 2, "        ");
                self.out.line("    }");
            }
        }
        self.out.blank();
    }

    fn serialize_pointers_deep_copy(
        &mut self,
        parent_condition: &str,
        parent_expr: &str,
        cmd: &str,
        parent_prop: &edger8r_types::ast::Decl,
        level: u32,
        indent: &str,
    ) {
        let ut = match deep_copy_type(self.edl, parent_prop) {
            Some(ut) => ut,
            None => return,
        };
        for prop in deep_copyable_fields(ut) {
            let op = access_op(parent_expr);
            let expr = format!("{parent_expr}{op}{}", prop.name);
            let prefix = format!("{parent_expr}{op}");
            let argcount = pcount(prop, &prefix);
            let argsize = psize(prop, &prefix);
            let cond = format!("{parent_condition} && {expr}");
            self.out
                .line(format!("{indent}if ({cond})"))
                .line(format!(
                    "{indent}    {cmd}({expr}, {argcount}, {argsize});"
                ));

            if deep_copy_type(self.edl, prop).is_none() {
                continue;
            }

            let count = count_attr_str(
                prop.attrs.as_ref().and_then(|a| a.count.as_ref()),
                &prefix,
            );
            if count == "1" {
                self.serialize_pointers_deep_copy(&cond, &expr, cmd, prop, level + 1, indent);
            } else {
                let idx = format!("_i_{level}");
                let item = format!("{parent_expr}{op}{}[{idx}]", prop.name);
                self.out
                    .line(format!(
                        "{indent}for (size_t {idx} = 0; {idx} < {count}; {idx}++)"
                    ))
                    .line(format!("{indent}{{"));
                self.serialize_pointers_deep_copy(
                    &cond,
                    &item,
                    cmd,
                    prop,
                    level + 1,
                    &format!("{indent}    "),
                );
                self.out.line(format!("{indent}}}"));
            }
        }
    }

    /// Free the nested out-only allocations the user function made; the
    /// payloads now live in the deepcopy-out buffer (or the call failed).
    fn free_deep_copy_out(&mut self, f: &Function) {
        for p in &f.params {
            if !p.attrs.as_ref().is_some_and(|a| a.is_out_only()) {
                continue;
            }
            if deep_copy_type(self.edl, p).is_none() {
                continue;
            }
            self.free_pointers_deep_copy(p, "_pargs_in->", "_pargs_in->", "    ", 1);
        }
    }

    fn free_pointers_deep_copy(
        &mut self,
        p: &edger8r_types::ast::Decl,
        parent_lhs_expr: &str,
        parent_rhs_expr: &str,
        indent: &str,
        level: u32,
    ) {
        let lhs_expr = format!("{parent_lhs_expr}{}", p.name);
        let rhs_expr = format!("{parent_rhs_expr}{}", p.name);
        let ut = match deep_copy_type(self.edl, p) {
            Some(ut) => ut,
            None => return,
        };

        self.out
            .line(format!("{indent}if ({lhs_expr})"))
            .line(format!("{indent}{{"));

        let count = pcount(p, parent_rhs_expr);
        let idx = format!("_i_{level}");
        self.out
            .line(format!(
                "{indent}    for (size_t {idx} = 0; {idx} < {count}; {idx}++)"
            ))
            .line(format!("{indent}    {{"));

        for field in &ut.fields {
            let attrs = match &field.attrs {
                Some(attrs) => attrs,
                None => continue,
            };
            if !field.ty.is_ptr() || attrs.user_check || attrs.is_size_or_count {
                continue;
            }
            let lhs_val = format!("{lhs_expr}[{idx}].{}", field.name);
            if deep_copy_type(self.edl, field).is_some() {
                // Free the nested pointers first.
                self.free_pointers_deep_copy(
                    field,
                    &format!("{lhs_expr}[{idx}]."),
                    &format!("{rhs_expr}[{idx}]."),
                    &format!("{indent}        "),
                    level + 1,
                );
            }
            self.out.line(format!("{indent}        free({lhs_val});"));
        }
        self.out
            .line(format!("{indent}    }}"))
            .line(format!("{indent}}}"));
    }

    fn propagate_errno(&mut self, f: &Function) {
        if self.ecall {
            return;
        }
        self.out.line("    /* Propagate errno back to enclave. */");
        if f.errno {
            self.out.line("    _pargs_out->_ocall_errno = errno;");
        } else {
            self.out.line("    /* Errno propagation not enabled. */");
        }
        self.out.blank();
    }

    fn write_result(&mut self) {
        let check = "output_buffer_size >= sizeof(*_pargs_out)";
        if self.ecall {
            self.out
                .line(format!("    if ({check} &&"))
                .line("        oe_is_within_enclave(_pargs_out, output_buffer_size))");
        } else {
            self.out.line(format!("    if (_pargs_out && {check})"));
        }
        self.out.line("        _pargs_out->_result = _result;");
    }
}
