//! Edge-case parser tests: grammar corners, nested deep copy, lookahead
//! behaviour, and pathological inputs.

use edger8r_parser::{parse_file, ParseContext};
use edger8r_types::ast::{Direction, Edl, TypeTag};
use edger8r_types::EdlError;
use std::rc::Rc;
use tempfile::TempDir;

fn parse(content: &str) -> Result<Rc<Edl>, EdlError> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edge.edl");
    std::fs::write(&path, content).unwrap();
    let mut ctx = ParseContext::default();
    parse_file(&path, &mut ctx)
}

fn parse_ok(content: &str) -> Rc<Edl> {
    match parse(content) {
        Ok(edl) => edl,
        Err(e) => panic!("unexpected parse error: {e}"),
    }
}

fn parse_err(content: &str) -> EdlError {
    match parse(content) {
        Ok(_) => panic!("expected a parse error"),
        Err(e) => e,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Grammar corners
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_input_is_fatal() {
    let e = parse_err("");
    assert!(e.message.contains("expecting `enclave`"));
}

#[test]
fn test_missing_enclave_keyword() {
    let e = parse_err("trusted { };");
    assert!(e.message.contains("expecting `enclave`"));
}

#[test]
fn test_unclosed_enclave_block() {
    let e = parse_err("enclave { trusted { public void f(void); };");
    assert!(e.message.contains("expecting `}`"));
}

#[test]
fn test_anonymous_enum() {
    let edl = parse_ok("enclave { enum { A, B }; };");
    assert_eq!(edl.types.len(), 1);
    assert_eq!(edl.types[0].items.len(), 2);
    assert!(edl.types[0].name.is_empty());
}

#[test]
fn test_empty_trusted_block() {
    let edl = parse_ok("enclave { trusted { }; untrusted { }; };");
    assert!(edl.trusted_funcs.is_empty());
    assert!(edl.untrusted_funcs.is_empty());
}

#[test]
fn test_comments_everywhere() {
    let edl = parse_ok(
        "enclave { // trailing\n/* block */ trusted /* mid */ {\n\
         public void f(void); // done\n}; };",
    );
    assert_eq!(edl.trusted_funcs.len(), 1);
}

#[test]
fn test_many_functions_keep_declaration_order() {
    let edl = parse_ok(
        r#"enclave {
    trusted {
        public void first(void);
        public void second(void);
        public void third(void);
    };
};"#,
    );
    let names: Vec<&str> = edl.trusted_funcs.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[test]
fn test_function_name_collision_in_same_file() {
    let e = parse_err(
        r#"enclave {
    trusted { public void f(void); };
    untrusted { void f(void); };
};"#,
    );
    assert!(e.message.contains("duplicate function definition"));
}

#[test]
fn test_type_name_collision_in_same_file() {
    let e = parse_err("enclave { struct S { int x; }; struct S { int y; }; };");
    assert!(e.message.contains("duplicate type definition"));
}

#[test]
fn test_void_pointer_with_size() {
    let edl = parse_ok(
        "enclave { trusted { public void f([in, size=len] void* buf, size_t len); }; };",
    );
    let p = &edl.trusted_funcs[0].params[0];
    assert_eq!(p.ty.pointee().unwrap().tag, TypeTag::Void);
    assert_eq!(
        p.attrs.as_ref().unwrap().size.as_ref().unwrap().name,
        "len"
    );
}

#[test]
fn test_literal_size_and_count_values() {
    let edl = parse_ok(
        "enclave { trusted { public void f([in, count=16] int* p, [out, size=256] void* q); }; };",
    );
    let attrs = edl.trusted_funcs[0].params[0].attrs.as_ref().unwrap();
    assert_eq!(attrs.count.as_ref().unwrap().name, "16");
    assert!(attrs.count.as_ref().unwrap().is_int());
}

#[test]
fn test_named_array_dimension() {
    let edl = parse_ok("enclave { trusted { public void f([in] int arr[DIM]); }; };");
    let dims = edl.trusted_funcs[0].params[0].dims.as_ref().unwrap();
    assert_eq!(dims[0].name, "DIM");
    assert!(!dims[0].is_int());
}

#[test]
fn test_wstring_parameter() {
    let edl = parse_ok(
        "enclave { trusted { public void f([in, wstring] const wchar_t* msg); }; };",
    );
    let attrs = edl.trusted_funcs[0].params[0].attrs.as_ref().unwrap();
    assert!(attrs.wstring && !attrs.string);
}

#[test]
fn test_return_type_combinations() {
    let edl = parse_ok(
        r#"enclave {
    trusted {
        public unsigned long long a(void);
        public size_t b(void);
        public struct S c(void);
    };
};"#,
    );
    assert_eq!(edl.trusted_funcs[0].rtype.tag, TypeTag::Unsigned);
    assert_eq!(
        edl.trusted_funcs[0].rtype.inner.as_ref().unwrap().tag,
        TypeTag::LLong
    );
    assert_eq!(edl.trusted_funcs[1].rtype.tag, TypeTag::SizeT);
    assert_eq!(edl.trusted_funcs[2].rtype.tag, TypeTag::Struct);
}

#[test]
fn test_unsigned_long_double_is_fatal() {
    let e = parse_err("enclave { trusted { public unsigned long double f(void); }; };");
    assert!(e.message.contains("invalid double following unsigned"));
}

#[test]
fn test_error_location_points_at_token() {
    let e = parse_err("enclave {\n    bogus\n};");
    assert_eq!(e.span.start_line, 2);
    assert_eq!(e.span.start_col, 5);
    assert_eq!(e.source_line, "    bogus");
}

// ─────────────────────────────────────────────────────────────────────
// Deep copy shapes
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_nested_deep_copy_structs() {
    let edl = parse_ok(
        r#"enclave {
    struct Inner {
        size_t n;
        [count=n] uint64_t* data;
    };
    struct Outer {
        size_t inner_count;
        [count=inner_count] Inner* inners;
    };
    trusted {
        public void f([in, out] Outer* o);
    };
};"#,
    );
    let outer = edl.user_type("Outer").unwrap();
    assert!(outer.fields[0].attrs.as_ref().unwrap().is_size_or_count);
    let inner = edl.user_type("Inner").unwrap();
    assert!(inner.fields[0].attrs.as_ref().unwrap().is_size_or_count);
}

#[test]
fn test_driver_declared_after_reference() {
    // The driver member appears after the annotation that uses it; the
    // retroactive pass must still mark it.
    let edl = parse_ok(
        r#"enclave {
    struct S {
        [count=n] int* p;
        size_t n;
    };
};"#,
    );
    let ut = edl.user_type("S").unwrap();
    assert!(ut.fields[1].attrs.as_ref().unwrap().is_size_or_count);
}

#[test]
fn test_plain_struct_by_value_is_allowed() {
    // No attributed fields: passing by value is flat-copyable.
    let edl = parse_ok(
        r#"enclave {
    struct Plain { int x; int y; };
    trusted { public void f(Plain p); };
};"#,
    );
    assert_eq!(edl.trusted_funcs.len(), 1);
}

#[test]
fn test_size_on_deep_copy_pointer_is_fatal() {
    let e = parse_err(
        r#"enclave {
    struct DC {
        size_t n;
        [count=n] int* p;
    };
    trusted { public void f([in, size=100] DC* d); };
};"#,
    );
    assert!(e.message.contains("size attributes are invalid"));
}

#[test]
fn test_size_count_referent_struct_is_fatal() {
    let e = parse_err(
        r#"enclave {
    struct S { int x; };
    trusted { public void f([in, count=s] int* p, struct S s); };
};"#,
    );
    assert!(e.message.contains("invalid type"));
}

#[test]
fn test_size_count_referent_array_is_fatal() {
    let e = parse_err(
        "enclave { trusted { public void f([in, count=n] int* p, [in] size_t n[4]); }; };",
    );
    assert!(e.message.contains("invalid type"));
}

#[test]
fn test_unsigned_driver_accepted_silently() {
    let edl = parse_ok(
        r#"enclave {
    trusted {
        public void f(
            [in, count=a] int* p,
            size_t a,
            [in, count=b] int* q,
            uint32_t b,
            [in, count=c] int* r,
            unsigned int c);
    };
};"#,
    );
    assert_eq!(edl.trusted_funcs[0].params.len(), 6);
}

// ─────────────────────────────────────────────────────────────────────
// Directions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_out_then_in_is_inout() {
    let edl = parse_ok("enclave { trusted { public void f([out, in] int* p); }; };");
    assert_eq!(
        edl.trusted_funcs[0].params[0].attrs.as_ref().unwrap().direction,
        Some(Direction::InOut)
    );
}

#[test]
fn test_inout_string_is_legal() {
    let edl = parse_ok("enclave { trusted { public void f([in, out, string] char* s); }; };");
    let attrs = edl.trusted_funcs[0].params[0].attrs.as_ref().unwrap();
    assert!(attrs.string);
    assert_eq!(attrs.direction, Some(Direction::InOut));
}

#[test]
fn test_out_on_const_pointer() {
    // Grammatically accepted; the emitter strips const on writable
    // members.
    let edl = parse_ok("enclave { trusted { public void f([in, out] const int* p); }; };");
    assert_eq!(
        edl.trusted_funcs[0].params[0].attrs.as_ref().unwrap().direction,
        Some(Direction::InOut)
    );
}

// ─────────────────────────────────────────────────────────────────────
// Directive stress
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_nested_directives() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edge.edl");
    std::fs::write(
        &path,
        r#"enclave {
#ifdef A
#ifdef B
    trusted { public void both(void); };
#else
    trusted { public void only_a(void); };
#endif
#endif
};"#,
    )
    .unwrap();

    let mut ctx = ParseContext::new(
        Vec::new(),
        vec!["A".to_string()],
        Default::default(),
        false,
    );
    let edl = parse_file(&path, &mut ctx).unwrap();
    assert_eq!(edl.trusted_funcs[0].name, "only_a");

    let mut ctx = ParseContext::new(
        Vec::new(),
        vec!["A".to_string(), "B".to_string()],
        Default::default(),
        false,
    );
    let edl = parse_file(&path, &mut ctx).unwrap();
    assert_eq!(edl.trusted_funcs[0].name, "both");
}

#[test]
fn test_directive_inside_function_list() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edge.edl");
    std::fs::write(
        &path,
        r#"enclave {
    trusted {
        public void always(void);
#ifdef EXTRA
        public void extra(void);
#endif
    };
};"#,
    )
    .unwrap();

    let mut ctx = ParseContext::default();
    let edl = parse_file(&path, &mut ctx).unwrap();
    assert_eq!(edl.trusted_funcs.len(), 1);

    let mut ctx = ParseContext::new(
        Vec::new(),
        vec!["EXTRA".to_string()],
        Default::default(),
        false,
    );
    let edl = parse_file(&path, &mut ctx).unwrap();
    assert_eq!(edl.trusted_funcs.len(), 2);
}

#[test]
fn test_unsupported_directive_is_fatal() {
    let e = parse_err("enclave {\n#define FOO\n};");
    assert!(e.message.contains("unsupported directive"));
}

// ─────────────────────────────────────────────────────────────────────
// Three-file import chains
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_transitive_import_chain() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("base.edl"),
        "enclave { struct B { int x; }; trusted { public void base_fn(void); }; };",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("mid.edl"),
        "enclave { import \"base.edl\"; untrusted { void mid_fn(void); }; };",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("top.edl"),
        "enclave { import \"mid.edl\"; };",
    )
    .unwrap();

    let mut ctx = ParseContext::new(
        vec![dir.path().to_path_buf()],
        Vec::new(),
        Default::default(),
        false,
    );
    let edl = parse_file(&dir.path().join("top.edl"), &mut ctx).unwrap();
    assert!(edl.user_type("B").is_some());
    assert_eq!(edl.trusted_funcs[0].name, "base_fn");
    assert_eq!(edl.untrusted_funcs[0].name, "mid_fn");
}

#[test]
fn test_self_import_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("selfie.edl");
    std::fs::write(&path, "enclave { import \"selfie.edl\"; };").unwrap();
    let mut ctx = ParseContext::new(
        vec![dir.path().to_path_buf()],
        Vec::new(),
        Default::default(),
        false,
    );
    let e = parse_file(&path, &mut ctx).unwrap_err();
    assert!(e.message.contains("recursive import detected"));
}

#[test]
fn test_from_import_star() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lib.edl"),
        r#"enclave {
    trusted { public void t1(void); public void t2(void); };
    untrusted { void u1(void); };
};"#,
    )
    .unwrap();
    let top = dir.path().join("top.edl");
    std::fs::write(&top, "enclave { from \"lib.edl\" import *; };").unwrap();

    let mut ctx = ParseContext::new(
        vec![dir.path().to_path_buf()],
        Vec::new(),
        Default::default(),
        false,
    );
    let edl = parse_file(&top, &mut ctx).unwrap();
    assert_eq!(edl.trusted_funcs.len(), 2);
    assert_eq!(edl.untrusted_funcs.len(), 1);
}

#[test]
fn test_from_import_multiple_names() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lib.edl"),
        r#"enclave {
    trusted { public void t1(void); };
    untrusted { void u1(void); void u2(void); };
};"#,
    )
    .unwrap();
    let top = dir.path().join("top.edl");
    std::fs::write(&top, "enclave { from \"lib.edl\" import t1, u2; };").unwrap();

    let mut ctx = ParseContext::new(
        vec![dir.path().to_path_buf()],
        Vec::new(),
        Default::default(),
        false,
    );
    let edl = parse_file(&top, &mut ctx).unwrap();
    assert_eq!(edl.trusted_funcs[0].name, "t1");
    assert_eq!(edl.untrusted_funcs.len(), 1);
    assert_eq!(edl.untrusted_funcs[0].name, "u2");
}
