//! Lexer integration tests over complete EDL snippets.

use edger8r_lexer::{Directive, Lexer, Preprocessor, Token};
use edger8r_types::SourceFile;

fn lex_all(source: &str) -> Vec<Token<'_>> {
    // Leak is fine in tests: tokens borrow the source file.
    let sf = Box::leak(Box::new(SourceFile::new("test.edl", source)));
    let mut lexer = Lexer::new(sf);
    let mut out = Vec::new();
    loop {
        let t = lexer.next().expect("lex error");
        let eof = t.is_eof();
        out.push(t);
        if eof {
            break;
        }
    }
    out
}

#[test]
fn test_full_edl_token_stream() {
    let toks = lex_all(
        r#"enclave {
    trusted {
        public int enc_hello([in, string] const char* msg);
    };
};"#,
    );
    let texts: Vec<&str> = toks.iter().map(|t| t.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "enclave", "{", "trusted", "{", "public", "int", "enc_hello", "(", "[", "in", ",",
            "string", "]", "const", "char", "*", "msg", ")", ";", "}", ";", "}", ";", "",
        ]
    );
}

#[test]
fn test_directive_tokens_surface_as_hash() {
    let toks = lex_all("#ifdef FOO\nint\n#endif\n");
    let texts: Vec<&str> = toks.iter().map(|t| t.as_str()).collect();
    assert_eq!(texts, vec!["#", "ifdef", "FOO", "int", "#", "endif", ""]);
}

#[test]
fn test_lexer_and_preprocessor_drop_excluded_tokens() {
    // Simulate the parser's pump: feed directives to the filter, drop
    // tokens while excluded.
    let sf = SourceFile::new("test.edl", "#ifdef FOO\nhidden\n#endif\nvisible");
    let mut lexer = Lexer::new(&sf);
    let mut pp = Preprocessor::new(&[]);
    let mut kept = Vec::new();

    let mut t = lexer.next().unwrap();
    loop {
        if t == '#' {
            let directive = lexer.next().unwrap();
            match directive.as_str() {
                "ifdef" => {
                    let name = lexer.next().unwrap();
                    pp.process(Directive::Ifdef, Some(name.as_str()));
                }
                "endif" => {
                    pp.process(Directive::Endif, None);
                }
                other => panic!("unexpected directive {other}"),
            }
            t = lexer.next().unwrap();
            if !pp.is_included() {
                while t != '#' && !t.is_eof() {
                    t = lexer.next().unwrap();
                }
            }
            continue;
        }
        if t.is_eof() {
            break;
        }
        kept.push(t.as_str().to_string());
        t = lexer.next().unwrap();
    }

    assert_eq!(kept, vec!["visible"]);
    assert!(pp.is_closed());
}

#[test]
fn test_spans_survive_comments() {
    let toks = lex_all("/* header\ncomment */ enclave");
    assert_eq!(toks[0].as_str(), "enclave");
    assert_eq!(toks[0].line, 2);
}
