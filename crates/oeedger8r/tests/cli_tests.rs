//! End-to-end tests driving the oeedger8r binary: exit codes, file
//! outputs, and flag behaviour.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_oeedger8r"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("failed to run oeedger8r")
}

fn write_edl(dir: &TempDir, name: &str, content: &str) {
    std::fs::write(dir.path().join(name), content).unwrap();
}

const BASIC: &str = r#"enclave {
    trusted {
        public int enc_hello([in, string] const char* msg, [out] int* out_val);
    };
    untrusted {
        int host_hello([in, string] const char* msg, [out] int* out_val);
    };
};"#;

#[test]
fn test_generates_all_five_files() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(&["hello.edl"], dir.path());
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    for name in ["hello_args.h", "hello_t.h", "hello_t.c", "hello_u.h", "hello_u.c"] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Generating edge routine"));
    assert!(stdout.contains("Success."));
}

#[test]
fn test_side_restriction_flags() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(&["--trusted", "hello.edl"], dir.path());
    assert!(out.status.success());
    assert!(dir.path().join("hello_t.c").exists());
    assert!(!dir.path().join("hello_u.c").exists());
}

#[test]
fn test_header_only() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(&["--header-only", "hello.edl"], dir.path());
    assert!(out.status.success());
    assert!(dir.path().join("hello_t.h").exists());
    assert!(!dir.path().join("hello_t.c").exists());
    assert!(!dir.path().join("hello_u.c").exists());
}

#[test]
fn test_output_directories_are_created() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(
        &[
            "--trusted-dir",
            "enclave/gen",
            "--untrusted-dir",
            "host/gen",
            "hello.edl",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(dir.path().join("enclave/gen/hello_t.c").exists());
    assert!(dir.path().join("host/gen/hello_u.c").exists());
    // The two directories are independent.
    assert!(!dir.path().join("enclave/gen/hello_u.c").exists());
}

#[test]
fn test_parse_error_exits_one_with_location() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "bad.edl", "enclave {\n    bogus\n};");
    let out = run(&["bad.edl"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("bad.edl:2:5"));
    assert!(stderr.contains("unexpected token"));
}

#[test]
fn test_recursive_import_exits_one() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "a.edl", "enclave { import \"b.edl\"; };");
    write_edl(&dir, "b.edl", "enclave { import \"a.edl\"; };");
    let out = run(&["--search-path", ".", "a.edl"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("recursive import detected"));
    // No partial output.
    assert!(!dir.path().join("a_t.h").exists());
}

#[test]
fn test_missing_file_exits_one() {
    let dir = TempDir::new().unwrap();
    let out = run(&["nope.edl"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("file not found"));
}

#[test]
fn test_no_arguments_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let out = run(&[], dir.path());
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_define_gates_function() {
    let dir = TempDir::new().unwrap();
    write_edl(
        &dir,
        "gated.edl",
        "enclave {\n#ifdef FOO\n    trusted { public void f(void); };\n#endif\n    untrusted { void u(void); };\n};",
    );

    let out = run(&["-DFOO", "gated.edl"], dir.path());
    assert!(out.status.success());
    let t_h = std::fs::read_to_string(dir.path().join("gated_t.h")).unwrap();
    assert!(t_h.contains("void f(void);"));

    let dir2 = TempDir::new().unwrap();
    write_edl(
        &dir2,
        "gated.edl",
        "enclave {\n#ifdef FOO\n    trusted { public void f(void); };\n#endif\n    untrusted { void u(void); };\n};",
    );
    let out = run(&["gated.edl"], dir2.path());
    assert!(out.status.success());
    let t_h = std::fs::read_to_string(dir2.path().join("gated_t.h")).unwrap();
    assert!(!t_h.contains("void f(void);"));
}

#[test]
fn test_werror_promotes_signed_count() {
    let dir = TempDir::new().unwrap();
    write_edl(
        &dir,
        "signed.edl",
        "enclave { trusted { public void f([in, count=n] int* p, int n); }; };",
    );

    // Warning by default: succeeds, diagnostic on stderr.
    let out = run(&["signed.edl"], dir.path());
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("should not be signed"));

    // Promoted to an error: fails.
    let out = run(&["-Werror=signed-size-or-count", "signed.edl"], dir.path());
    assert_eq!(out.status.code(), Some(1));

    // Suppressed: succeeds silently.
    let out = run(&["-Wno-signed-size-or-count", "signed.edl"], dir.path());
    assert!(out.status.success());
    assert!(!String::from_utf8_lossy(&out.stderr).contains("should not be signed"));
}

#[test]
fn test_invalid_werror_form_is_usage_error() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(&["-Werror=all", "hello.edl"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid option"));
}

#[test]
fn test_unknown_warning_is_usage_error() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(&["-Wbogus", "hello.edl"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown warning option"));
}

#[test]
fn test_use_prefix_renames_untrusted_symbols() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    let out = run(&["--use-prefix", "hello.edl"], dir.path());
    assert!(out.status.success());
    let u_h = std::fs::read_to_string(dir.path().join("hello_u.h")).unwrap();
    assert!(u_h.contains("oe_result_t hello_enc_hello("));
    let t_h = std::fs::read_to_string(dir.path().join("hello_t.h")).unwrap();
    // The trusted side is unaffected.
    assert!(t_h.contains("int enc_hello("));
    assert!(!t_h.contains("hello_enc_hello"));
}

#[test]
fn test_rerun_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "hello.edl", BASIC);
    assert!(run(&["hello.edl"], dir.path()).status.success());
    let first = std::fs::read(dir.path().join("hello_t.c")).unwrap();
    assert!(run(&["hello.edl"], dir.path()).status.success());
    let second = std::fs::read(dir.path().join("hello_t.c")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_multiple_input_files() {
    let dir = TempDir::new().unwrap();
    write_edl(&dir, "one.edl", "enclave { trusted { public void f1(void); }; };");
    write_edl(&dir, "two.edl", "enclave { trusted { public void f2(void); }; };");
    let out = run(&["one.edl", "two.edl"], dir.path());
    assert!(out.status.success());
    assert!(dir.path().join("one_t.h").exists());
    assert!(dir.path().join("two_t.h").exists());
}
