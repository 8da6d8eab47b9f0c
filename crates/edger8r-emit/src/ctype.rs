//! C renderings of AST nodes and the deep-copy queries shared by the
//! emitters: declaration strings, marshalling member types, prototypes,
//! and the count/size argument expressions used in the overflow-checked
//! size arithmetic.

use edger8r_types::ast::{
    user_type_for_deep_copy, Decl, Edl, Function, Ident, Type, TypeTag, UserType,
};

pub(crate) fn upper(s: &str) -> String {
    s.to_ascii_uppercase()
}

/// `<type> <name>[dims]` in C syntax.
pub(crate) fn decl_str(name: &str, ty: &Type, dims: Option<&[Ident]>) -> String {
    let mut s = format!("{ty} {name}");
    if let Some(dims) = dims {
        for d in dims {
            s.push('[');
            s.push_str(&d.name);
            s.push(']');
        }
    }
    s
}

/// Rebuild a pointer type with every `const` qualifier dropped, so the
/// callee-side forwarder can write through relocated pointers.
fn deconst(ty: &Type) -> Type {
    match ty.tag {
        TypeTag::Ptr => Type::wrap(
            TypeTag::Ptr,
            deconst(ty.inner.as_deref().expect("ptr has inner type")),
        ),
        TypeTag::Const => deconst(ty.inner.as_deref().expect("const has inner type")),
        _ => ty.clone(),
    }
}

/// The marshalling-struct member type for a declarator.
///
/// `isptr`/`isary` foreign types marshal as an opaque pointer-sized
/// value; writable (out / in-out) pointers lose their `const` qualifiers.
pub(crate) fn mtype_str(d: &Decl) -> String {
    if d.ty.tag == TypeTag::Foreign {
        if let Some(attrs) = &d.attrs {
            if attrs.isary {
                return format!("/* foreign array of type {} */ void*", d.ty.name);
            }
            if attrs.isptr {
                return format!("/* foreign pointer of type {} */ void*", d.ty.name);
            }
        }
    }
    if d.ty.is_ptr() && d.attrs.as_ref().is_some_and(|a| a.is_out()) {
        deconst(&d.ty).to_string()
    } else {
        d.ty.to_string()
    }
}

/// The marshalling-struct member declaration for a declarator.
pub(crate) fn mdecl_str(d: &Decl) -> String {
    let mut s = format!("{} {}", mtype_str(d), d.name);
    if let Some(dims) = &d.dims {
        for dim in dims {
            s.push('[');
            s.push_str(&dim.name);
            s.push(']');
        }
    }
    s
}

/// The cast applied when storing a parameter into its args-struct slot.
pub(crate) fn mcast_str(d: &Decl) -> String {
    let ty = mtype_str(d);
    if ty.starts_with('/') {
        ty.replace("void*", "(void*)")
    } else {
        format!("({ty})")
    }
}

fn render_prototype(ret: &str, name: &str, params: &[String]) -> String {
    if params.is_empty() {
        format!("{ret} {name}(void)")
    } else {
        format!("{ret} {name}(\n    {})", params.join(",\n    "))
    }
}

/// The prototype for one function on one side.
///
/// Wrappers (the caller side: ECALLs on the untrusted side, OCALLs on the
/// trusted side) return `oe_result_t`, take the enclave handle for
/// ECALLs, and return the user value through `_retval`. The opposite side
/// declares the user implementation unchanged.
pub(crate) fn prototype(f: &Function, ecall: bool, gen_t: bool, prefix: &str) -> String {
    let wrapper = ecall != gen_t;
    let name = format!("{prefix}{}", f.name);
    let mut params = Vec::new();

    if wrapper {
        if ecall {
            params.push("oe_enclave_t* enclave".to_string());
        }
        if !f.rtype.is_void() {
            params.push(format!("{}* _retval", f.rtype));
        }
        for p in &f.params {
            params.push(decl_str(&p.name, &p.ty, p.dims.as_deref()));
        }
        render_prototype("oe_result_t", &name, &params)
    } else {
        for p in &f.params {
            params.push(decl_str(&p.name, &p.ty, p.dims.as_deref()));
        }
        render_prototype(&f.rtype.to_string(), &name, &params)
    }
}

/// The `oe_create_<name>_enclave` prototype.
pub(crate) fn create_prototype(name: &str) -> String {
    format!(
        "oe_result_t oe_create_{name}_enclave(\n    \
         const char* path,\n    \
         oe_enclave_type_t type,\n    \
         uint32_t flags,\n    \
         const oe_enclave_setting_t* settings,\n    \
         uint32_t setting_count,\n    \
         oe_enclave_t** enclave)"
    )
}

/// Render a `size=`/`count=` attribute value: an integer literal stands
/// alone, a name is read from the prefixed expression (`_args.`,
/// `_pargs_in->`, or a deep-copy member path).
pub(crate) fn count_attr_str(value: Option<&Ident>, prefix: &str) -> String {
    match value {
        None => "1".to_string(),
        Some(v) if v.is_int() => v.name.clone(),
        Some(v) => format!("{prefix}{}", v.name),
    }
}

/// The element-count expression for a declarator.
pub(crate) fn pcount(d: &Decl, prefix: &str) -> String {
    if let Some(attrs) = &d.attrs {
        if attrs.count.is_some() {
            return count_attr_str(attrs.count.as_ref(), prefix);
        }
    }
    if let Some(dims) = &d.dims {
        if !dims.is_empty() {
            return dims
                .iter()
                .map(|d| d.name.clone())
                .collect::<Vec<_>>()
                .join(" * ");
        }
    }
    "1".to_string()
}

/// The per-element size expression for a declarator.
pub(crate) fn psize(d: &Decl, prefix: &str) -> String {
    if let Some(attrs) = &d.attrs {
        if attrs.size.is_some() {
            return count_attr_str(attrs.size.as_ref(), prefix);
        }
        if attrs.string {
            return format!("({prefix}{}_len * sizeof(char))", d.name);
        }
        if attrs.wstring {
            return format!("({prefix}{}_len * sizeof(wchar_t))", d.name);
        }
    }
    let elem = d.ty.pointee().unwrap_or(&d.ty);
    format!("sizeof({elem})")
}

/// Resolve the deep-copy struct for a declarator against the document.
pub(crate) fn deep_copy_type<'a>(edl: &'a Edl, d: &Decl) -> Option<&'a UserType> {
    user_type_for_deep_copy(&edl.types, d).map(|rc| rc.as_ref())
}

/// The pointer fields of a deep-copied struct that the marshallers must
/// follow (attributed, not `user_check`).
pub(crate) fn deep_copyable_fields(ut: &UserType) -> impl Iterator<Item = &Decl> {
    ut.fields.iter().filter(|f| {
        f.ty.is_ptr() && f.attrs.as_ref().is_some_and(|a| !a.user_check)
    })
}

/// Whether any parameter is an out-only pointer to a deep-copied struct,
/// requiring the secondary deepcopy-out buffer.
pub(crate) fn has_deep_copy_out(edl: &Edl, f: &Function) -> bool {
    f.params.iter().any(|p| {
        p.attrs.as_ref().is_some_and(|a| a.is_out_only()) && deep_copy_type(edl, p).is_some()
    })
}

/// The member access operator after a deep-copy path expression:
/// indexed expressions are values, everything else is a pointer.
pub(crate) fn access_op(expr: &str) -> &'static str {
    if expr.ends_with(']') {
        "."
    } else {
        "->"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edger8r_types::ast::Attrs;
    use edger8r_types::Span;

    fn ptr_to(tag: TypeTag) -> Type {
        Type::wrap(TypeTag::Ptr, Type::plain(tag))
    }

    fn decl(name: &str, ty: Type, attrs: Option<Attrs>) -> Decl {
        Decl {
            name: name.into(),
            ty,
            dims: None,
            attrs,
        }
    }

    #[test]
    fn test_decl_str_with_dims() {
        let dims = vec![Ident::new("4", Span::point(1, 1)), Ident::new("n", Span::point(1, 1))];
        assert_eq!(
            decl_str("arr", &Type::plain(TypeTag::Int), Some(&dims)),
            "int arr[4][n]"
        );
    }

    #[test]
    fn test_mtype_strips_const_on_writable_pointers() {
        // [in] const char* keeps const; [in, out] loses it.
        let in_only = decl(
            "msg",
            Type::wrap(
                TypeTag::Ptr,
                Type::wrap(TypeTag::Const, Type::plain(TypeTag::Char)),
            ),
            Some(Attrs {
                direction: Some(edger8r_types::ast::Direction::In),
                ..Attrs::default()
            }),
        );
        assert_eq!(mtype_str(&in_only), "const char*");

        let inout = decl(
            "msg",
            Type::wrap(
                TypeTag::Ptr,
                Type::wrap(TypeTag::Const, Type::plain(TypeTag::Char)),
            ),
            Some(Attrs {
                direction: Some(edger8r_types::ast::Direction::InOut),
                ..Attrs::default()
            }),
        );
        assert_eq!(mtype_str(&inout), "char*");
    }

    #[test]
    fn test_mtype_foreign_isptr() {
        let d = decl(
            "p",
            Type::named(TypeTag::Foreign, "MyType"),
            Some(Attrs {
                isptr: true,
                direction: Some(edger8r_types::ast::Direction::In),
                ..Attrs::default()
            }),
        );
        assert_eq!(mtype_str(&d), "/* foreign pointer of type MyType */ void*");
        assert_eq!(mcast_str(&d), "/* foreign pointer of type MyType */ (void*)");
    }

    #[test]
    fn test_prototype_wrapper_vs_impl() {
        let f = Function {
            name: "enc_hello".into(),
            rtype: Type::plain(TypeTag::Int),
            params: vec![decl("out_val", ptr_to(TypeTag::Int), None)],
            switchless: false,
            errno: false,
        };
        // Host-side ECALL wrapper.
        let w = prototype(&f, true, false, "");
        assert!(w.starts_with("oe_result_t enc_hello("));
        assert!(w.contains("oe_enclave_t* enclave"));
        assert!(w.contains("int* _retval"));
        // Enclave-side user implementation.
        let i = prototype(&f, true, true, "");
        assert!(i.starts_with("int enc_hello("));
        assert!(!i.contains("enclave"));
    }

    #[test]
    fn test_prototype_void_params() {
        let f = Function {
            name: "f".into(),
            rtype: Type::plain(TypeTag::Void),
            params: Vec::new(),
            switchless: false,
            errno: false,
        };
        assert_eq!(prototype(&f, true, true, ""), "void f(void)");
        assert_eq!(prototype(&f, false, true, ""), "oe_result_t f(void)");
    }

    #[test]
    fn test_pcount_psize() {
        let span = Span::point(1, 1);
        let d = decl(
            "p",
            ptr_to(TypeTag::UInt64),
            Some(Attrs {
                count: Some(Ident::new("count", span)),
                direction: Some(edger8r_types::ast::Direction::In),
                ..Attrs::default()
            }),
        );
        assert_eq!(pcount(&d, "_args."), "_args.count");
        assert_eq!(psize(&d, "_args."), "sizeof(uint64_t)");

        let lit = decl(
            "p",
            ptr_to(TypeTag::Int),
            Some(Attrs {
                count: Some(Ident::new("8", span)),
                ..Attrs::default()
            }),
        );
        assert_eq!(pcount(&lit, "_args."), "8");

        let s = decl(
            "msg",
            Type::wrap(
                TypeTag::Ptr,
                Type::wrap(TypeTag::Const, Type::plain(TypeTag::Char)),
            ),
            Some(Attrs {
                string: true,
                direction: Some(edger8r_types::ast::Direction::In),
                ..Attrs::default()
            }),
        );
        assert_eq!(psize(&s, "_args."), "(_args.msg_len * sizeof(char))");
        assert_eq!(pcount(&s, "_args."), "1");
    }

    #[test]
    fn test_access_op() {
        assert_eq!(access_op("s"), "->");
        assert_eq!(access_op("s[_i_1]"), ".");
    }
}
