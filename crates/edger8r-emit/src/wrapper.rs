//! Caller-side wrapper emission.
//!
//! For each function, one C function that fills the args struct, sizes
//! the input/output buffer with overflow-checked arithmetic, serialises
//! in/in-out payloads (recursing into deep-copied structs), dispatches
//! through the side-appropriate allocator/call pair, verifies the
//! callee-reported output size, unmarshals outputs, and walks the
//! deepcopy-out buffer for dynamically sized outputs.

use edger8r_types::ast::{Edl, Function};

use crate::ctype::{
    access_op, count_attr_str, deep_copy_type, deep_copyable_fields, has_deep_copy_out,
    mcast_str, mtype_str, pcount, prototype, psize,
};
use crate::writer::CodeWriter;

pub(crate) struct WrapperEmitter<'a> {
    edl: &'a Edl,
    out: &'a mut CodeWriter,
    /// Emitting an ECALL wrapper (runs on the untrusted side) rather
    /// than an OCALL wrapper (runs on the trusted side).
    ecall: bool,
    deep_copy_out: bool,
}

impl<'a> WrapperEmitter<'a> {
    pub fn new(edl: &'a Edl, out: &'a mut CodeWriter, ecall: bool) -> Self {
        Self {
            edl,
            out,
            ecall,
            deep_copy_out: false,
        }
    }

    /// Generating trusted-side code: true for OCALL wrappers.
    fn gen_t(&self) -> bool {
        !self.ecall
    }

    /// The four-way allocator/dispatcher choice.
    fn dispatch_functions(&self, f: &Function) -> (&'static str, &'static str, &'static str) {
        match (f.switchless, self.ecall) {
            (true, false) => (
                "oe_allocate_switchless_ocall_buffer",
                "oe_free_switchless_ocall_buffer",
                "oe_switchless_call_host_function",
            ),
            (true, true) => ("oe_malloc", "oe_free", "oe_switchless_call_enclave_function"),
            (false, false) => (
                "oe_allocate_ocall_buffer",
                "oe_free_ocall_buffer",
                "oe_call_host_function",
            ),
            (false, true) => ("oe_malloc", "oe_free", "oe_call_enclave_function"),
        }
    }

    pub fn emit(&mut self, f: &Function, prefix: &str) {
        self.deep_copy_out = has_deep_copy_out(self.edl, f);
        let (alloc_fcn, free_fcn, call) = self.dispatch_functions(f);
        let other = if self.ecall { "enclave" } else { "host" };
        let fcn_id = format!("{}_fcn_id_{}", self.edl.name, f.name);
        let args_t = format!("{}_args_t", f.name);

        // ECALL wrappers get a per-document symbol plus a weak alias, so
        // two enclaves declaring the same ECALL can link into one host.
        let emitted_prefix = if self.ecall {
            format!("{}_{prefix}", self.edl.name)
        } else {
            prefix.to_string()
        };

        self.out
            .line(prototype(f, self.ecall, self.gen_t(), &emitted_prefix))
            .line("{")
            .line("    oe_result_t _result = OE_FAILURE;")
            .blank();
        if self.ecall {
            self.out
                .line("    static uint64_t global_id = OE_GLOBAL_ECALL_ID_NULL;")
                .blank();
        }
        self.enclave_status_check();
        self.out
            .line("    /* Marshalling struct. */")
            .line(format!(
                "    {args_t} _args, *_pargs_in = NULL, *_pargs_out = NULL;"
            ))
            .line("    /* Marshalling buffer and sizes. */")
            .line("    size_t _input_buffer_size = 0;")
            .line("    size_t _output_buffer_size = 0;")
            .line("    size_t _total_buffer_size = 0;")
            .line("    uint8_t* _buffer = NULL;")
            .line("    uint8_t* _input_buffer = NULL;")
            .line("    uint8_t* _output_buffer = NULL;")
            .line("    size_t _input_buffer_offset = 0;")
            .line("    size_t _output_buffer_offset = 0;")
            .line("    size_t _output_bytes_written = 0;");
        if self.deep_copy_out {
            self.out
                .line("    uint8_t* _deepcopy_out_buffer = NULL;")
                .line("    size_t _deepcopy_out_buffer_size = 0;")
                .line("    size_t _deepcopy_out_buffer_offset = 0;");
        }
        self.out
            .blank()
            .line("    /* Fill marshalling struct. */")
            .line("    memset(&_args, 0, sizeof(_args));");
        self.fill_marshalling_struct(f);
        self.out
            .blank()
            .line("    /* Compute input buffer size. Include in and in-out parameters. */");
        self.compute_buffer_size(f, true);
        self.out
            .blank()
            .line("    /* Compute output buffer size. Include out and in-out parameters. */");
        self.compute_buffer_size(f, false);
        self.out
            .blank()
            .line("    /* Allocate marshalling buffer. */")
            .line("    _total_buffer_size = _input_buffer_size;")
            .line("    OE_ADD_SIZE(_total_buffer_size, _output_buffer_size);")
            .line(format!(
                "    _buffer = (uint8_t*){alloc_fcn}(_total_buffer_size);"
            ))
            .line("    _input_buffer = _buffer;")
            .line("    _output_buffer = _buffer + _input_buffer_size;")
            .line("    if (_buffer == NULL)")
            .line("    {")
            .line("        _result = OE_OUT_OF_MEMORY;")
            .line("        goto done;")
            .line("    }")
            .blank()
            .line("    /* Serialize buffer inputs (in and in-out parameters). */");
        self.serialize_buffer_inputs(f);
        self.out
            .blank()
            .line("    /* Copy args structure (now filled) to input buffer. */")
            .line("    memcpy(_pargs_in, &_args, sizeof(*_pargs_in));")
            .blank()
            .line(format!("    /* Call {other} function. */"))
            .line(format!("    if ((_result = {call}("));
        if self.ecall {
            self.out
                .line("             enclave,")
                .line("             &global_id,")
                .line(format!(
                    "             _{}_ecall_info_table[{fcn_id}].name,",
                    self.edl.name
                ));
        } else {
            self.out.line(format!("             {fcn_id},"));
        }
        self.out
            .line("             _input_buffer,")
            .line("             _input_buffer_size,")
            .line("             _output_buffer,")
            .line("             _output_buffer_size,")
            .line("             &_output_bytes_written)) != OE_OK)")
            .line("        goto done;")
            .blank()
            .line("    /* Setup output arg struct pointer. */")
            .line(format!("    _pargs_out = ({args_t}*)_output_buffer;"))
            .line("    OE_ADD_SIZE(_output_buffer_offset, sizeof(*_pargs_out));")
            .blank()
            .line("    /* Check if the call succeeded. */")
            .line("    if ((_result = _pargs_out->_result) != OE_OK)")
            .line("        goto done;")
            .blank()
            .line("    /* Currently exactly _output_buffer_size bytes must be written. */")
            .line("    if (_output_bytes_written != _output_buffer_size)")
            .line("    {")
            .line("        _result = OE_FAILURE;")
            .line("        goto done;")
            .line("    }")
            .blank()
            .line("    /* Unmarshal return value and out, in-out parameters. */");
        if !f.rtype.is_void() {
            self.out.line("    *_retval = _pargs_out->_retval;");
        } else {
            self.out.line("    /* No return value. */");
        }
        self.out.blank();
        if self.deep_copy_out {
            self.out
                .line("    _deepcopy_out_buffer = _pargs_out->deepcopy_out_buffer;")
                .line("    _deepcopy_out_buffer_size = _pargs_out->deepcopy_out_buffer_size;");
            if self.gen_t() {
                self.out
                    .line("    if (_deepcopy_out_buffer && _deepcopy_out_buffer_size &&")
                    .line("        !oe_is_within_enclave(_deepcopy_out_buffer, _deepcopy_out_buffer_size))")
                    .line("    {")
                    .line("        _result = OE_FAILURE;")
                    .line("        goto done;")
                    .line("    }");
            }
            self.out.blank();
        }
        self.unmarshal_outputs(f);
        self.out.blank();
        if self.deep_copy_out {
            self.out
                .line("    if (_deepcopy_out_buffer_offset != _deepcopy_out_buffer_size)")
                .line("    {")
                .line("        _result = OE_FAILURE;")
                .line("        goto done;")
                .line("    }")
                .blank();
        }
        self.propagate_errno(f);
        self.out
            .line("    _result = OE_OK;")
            .blank()
            .line("done:")
            .line("    if (_buffer)")
            .line(format!("        {free_fcn}(_buffer);"))
            .blank();
        if self.deep_copy_out {
            self.out
                .line("    if (_deepcopy_out_buffer)")
                .line("        oe_free(_deepcopy_out_buffer);")
                .blank();
        }
        self.out.line("    return _result;").line("}").blank();
        if self.ecall {
            self.out
                .line(format!(
                    "OE_WEAK_ALIAS({emitted_prefix}{}, {prefix}{});",
                    f.name, f.name
                ))
                .blank();
        }
    }

    /// New OCALLs must fail immediately while the enclave is crashing.
    fn enclave_status_check(&mut self) {
        if self.gen_t() {
            self.out
                .line("    /* If the enclave is in crashing/crashed status, new OCALL should fail")
                .line("       immediately. */")
                .line("    if (oe_get_enclave_status() != OE_OK)")
                .line("        return oe_get_enclave_status();")
                .blank();
        }
    }

    fn fill_marshalling_struct(&mut self, f: &Function) {
        for p in &f.params {
            let lhs = format!("    _args.{} = ", p.name);
            if let Some(attrs) = &p.attrs {
                self.out.line(format!("{lhs}{}{};", mcast_str(p), p.name));
                if attrs.string || attrs.wstring {
                    let strlen = if attrs.wstring { "oe_wcslen" } else { "oe_strlen" };
                    self.out.line(format!(
                        "    _args.{}_len = ({}) ? ({strlen}({}) + 1) : 0;",
                        p.name, p.name, p.name
                    ));
                }
            } else {
                self.out.line(format!("{lhs}{};", p.name));
            }
        }
    }

    fn compute_buffer_size(&mut self, f: &Function, input: bool) {
        let buffer_size = if input {
            "_input_buffer_size"
        } else {
            "_output_buffer_size"
        };
        self.out.line(format!(
            "    OE_ADD_SIZE({buffer_size}, sizeof({}_args_t));",
            f.name
        ));
        let mut empty = true;
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) => attrs,
                None => continue,
            };
            if !(if input { attrs.is_in() } else { attrs.is_out() }) {
                continue;
            }

            let argcount = pcount(p, "_args.");
            let argsize = psize(p, "_args.");
            self.out
                .line(format!("    if ({})", p.name))
                .line(format!(
                    "        OE_ADD_ARG_SIZE({buffer_size}, {argcount}, {argsize});"
                ));
            empty = false;

            // Skip the nested pointers if the parameter is not
            // deep-copyable or has the out-only attribute.
            if deep_copy_type(self.edl, p).is_none() || attrs.is_out_only() {
                continue;
            }

            let count = count_attr_str(attrs.count.as_ref(), "_args.");
            if count == "1" {
                self.add_size_deep_copy(&p.name, &p.name, buffer_size, p, 2, "    ");
            } else {
                let expr = format!("{}[_i_1]", p.name);
                self.out
                    .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                    .line("    {");
                self.add_size_deep_copy(&p.name, &expr, buffer_size, p, 2, "        ");
                self.out.line("    }");
            }
        }
        if empty {
            self.out.line("    /* There were no corresponding parameters. */");
        }
    }

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
            let prefix = format!("_args.{parent_expr}{op}");
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

    fn serialize_buffer_inputs(&mut self, f: &Function) {
        self.out
            .line(format!("    _pargs_in = ({}_args_t*)_input_buffer;", f.name))
            .line("    OE_ADD_SIZE(_input_buffer_offset, sizeof(*_pargs_in));");
        let mut empty = true;
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.is_in() => attrs,
                _ => continue,
            };
            let mt = mtype_str(p);
            let argcount = pcount(p, "_args.");
            let argsize = psize(p, "_args.");
            let cmd = if attrs.is_inout() {
                "OE_WRITE_IN_OUT_PARAM"
            } else {
                "OE_WRITE_IN_PARAM"
            };
            self.out
                .line(format!("    if ({})", p.name))
                .line(format!(
                    "        {cmd}({}, {argcount}, {argsize}, {mt});",
                    p.name
                ));
            empty = false;

            if deep_copy_type(self.edl, p).is_none() {
                continue;
            }

            let count = count_attr_str(attrs.count.as_ref(), "_args.");
            if count == "1" {
                self.serialize_pointers_deep_copy(&p.name, &p.name, cmd, p, 2, "    ");
            } else {
                let expr = format!("{}[_i_1]", p.name);
                self.out
                    .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                    .line("    {");
                self.serialize_pointers_deep_copy(&p.name, &expr, cmd, p, 2, "        ");
                self.out.line("    }");
            }
        }
        if empty {
            self.out.line("    /* There were no in nor in-out parameters. */");
        }
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
            let prefix = format!("_args.{parent_expr}{op}");
            let argcount = pcount(prop, &prefix);
            let argsize = psize(prop, &prefix);
            let cond = format!("{parent_condition} && {expr}");
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

    fn unmarshal_outputs(&mut self, f: &Function) {
        let mut empty = true;
        for p in &f.params {
            let attrs = match &p.attrs {
                Some(attrs) if attrs.is_out() => attrs,
                _ => continue,
            };
            empty = false;
            let argcount = pcount(p, "_args.");
            let argsize = psize(p, "_args.");
            let cmd = if attrs.is_inout() {
                "OE_READ_IN_OUT_PARAM"
            } else {
                "OE_READ_OUT_PARAM"
            };
            let ut = deep_copy_type(self.edl, p);
            if ut.is_none() {
                self.out.line(format!(
                    "    {cmd}({}, {argcount}, {argsize});",
                    p.name
                ));
            }
            if attrs.string || attrs.wstring {
                let check = if attrs.wstring {
                    "OE_CHECK_NULL_TERMINATOR_WIDE"
                } else {
                    "OE_CHECK_NULL_TERMINATOR"
                };
                self.out.line(format!(
                    "    {check}({}, _args.{}_len);",
                    p.name, p.name
                ));
            }

            if ut.is_some() {
                if attrs.is_inout() {
                    self.unmarshal_deep_copy(p, "", "    ", cmd, 1);
                } else {
                    // Out-only: read the top-level array back, then
                    // allocate and fill nested payloads from the
                    // deepcopy-out buffer.
                    self.out.line(format!(
                        "    OE_READ_OUT_PARAM({}, {argcount}, {argsize});",
                        p.name
                    ));
                    self.unmarshal_deep_copy_out(p);
                }
            }
        }
        if empty {
            self.out.line("    /* There were no out nor in-out parameters. */");
        }
    }

    /// In-out deep copy: unmarshal field by field, never overwriting
    /// `is-size-or-count` drivers, and failing when the callee reports a
    /// driver value larger than the caller supplied.
    fn unmarshal_deep_copy(
        &mut self,
        p: &edger8r_types::ast::Decl,
        parent_expr: &str,
        indent: &str,
        cmd: &str,
        level: u32,
    ) {
        let expr = format!("{parent_expr}{}", p.name);
        let ut = match deep_copy_type(self.edl, p) {
            Some(ut) => ut,
            None => return,
        };

        self.out
            .line(format!("{indent}if ({expr})"))
            .line(format!("{indent}{{"));

        let argcount = pcount(p, parent_expr);
        let argsize = psize(p, parent_expr);
        let p_type = p.ty.to_string();
        self.out
            .line(format!(
                "{indent}    {p_type} _rhs = ({p_type}) (_output_buffer + _output_buffer_offset); (void)_rhs;"
            ))
            .line(format!(
                "{indent}    OE_ADD_ARG_SIZE(_output_buffer_offset, {argcount}, {argsize});"
            ));

        let idx = format!("_i_{level}");
        self.out
            .line(format!(
                "{indent}    for (size_t {idx} = 0; {idx} < {argcount}; {idx}++)"
            ))
            .line(format!("{indent}    {{"));

        // First pass: scalar members and drivers.
        for field in &ut.fields {
            let lhs_val = format!("{expr}[{idx}].{}", field.name);
            let rhs_val = format!("_rhs[{idx}].{}", field.name);
            if field.attrs.as_ref().is_some_and(|a| a.is_size_or_count) {
                // Drivers are never updated from the callee's value, but
                // a reported value larger than the supplied one is an
                // error the caller must see.
                self.out
                    .line(format!("{indent}        if ({lhs_val} < {rhs_val})"))
                    .line(format!("{indent}        {{"))
                    .line(format!("{indent}            _result = OE_FAILURE;"))
                    .line(format!("{indent}            goto done;"))
                    .line(format!("{indent}        }}"));
                continue;
            }
            let is_marshalled_ptr =
                field.ty.is_ptr() && field.attrs.as_ref().is_some_and(|a| !a.user_check);
            if !is_marshalled_ptr {
                self.out
                    .line(format!("{indent}        {lhs_val} = {rhs_val};"));
            }
        }

        // Second pass: marshalled pointer members.
        for field in &ut.fields {
            let attrs = match &field.attrs {
                Some(attrs) => attrs,
                None => continue,
            };
            if !field.ty.is_ptr() || attrs.user_check || attrs.is_size_or_count {
                continue;
            }
            let item_prefix = format!("{expr}[{idx}].");
            let prop_val = format!("{item_prefix}{}", field.name);
            if deep_copy_type(self.edl, field).is_none() {
                let argcount = pcount(field, &item_prefix);
                let argsize = psize(field, &item_prefix);
                self.out.line(format!(
                    "{indent}        {cmd}({prop_val}, {argcount}, {argsize});"
                ));
            } else {
                self.unmarshal_deep_copy(
                    field,
                    &item_prefix,
                    &format!("{indent}        "),
                    cmd,
                    level + 1,
                );
            }
        }
        self.out
            .line(format!("{indent}    }}"))
            .line(format!("{indent}}}"));
    }

    /// Out-only deep copy: allocate caller-side memory for each nested
    /// payload recorded in the deepcopy-out buffer.
    fn unmarshal_deep_copy_out(&mut self, p: &edger8r_types::ast::Decl) {
        let cmd = "OE_SET_DEEPCOPY_OUT_PARAM";
        let count = count_attr_str(
            p.attrs.as_ref().and_then(|a| a.count.as_ref()),
            "",
        );
        if count == "1" {
            self.unserialize_pointers_deep_copy(&p.name, &p.name, cmd, p, 2, "    ");
        } else {
            let expr = format!("{}[_i_1]", p.name);
            self.out
                .line(format!("    for (size_t _i_1 = 0; _i_1 < {count}; _i_1++)"))
                .line("    {");
            self.unserialize_pointers_deep_copy(&p.name, &expr, cmd, p, 2, "        ");
            self.out.line("    }");
        }
    }

    fn unserialize_pointers_deep_copy(
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
                self.unserialize_pointers_deep_copy(&cond, &expr, cmd, prop, level + 1, indent);
            } else {
                let idx = format!("_i_{level}");
                let item = format!("{parent_expr}{op}{}[{idx}]", prop.name);
                let loop_cond = format!("{parent_condition} && {parent_expr}{op}{}", prop.name);
                self.out
                    .line(format!(
                        "{indent}for (size_t {idx} = 0; {idx} < {count}; {idx}++)"
                    ))
                    .line(format!("{indent}{{"));
                self.unserialize_pointers_deep_copy(
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

    fn propagate_errno(&mut self, f: &Function) {
        if !self.gen_t() {
            return;
        }
        self.out.line("    /* Retrieve propagated errno from OCALL. */");
        if f.errno {
            self.out
                .line("    oe_errno = _pargs_out->_ocall_errno;")
                .blank();
        } else {
            self.out.line("    /* Errno propagation not enabled. */");
        }
        self.out.blank();
    }
}
