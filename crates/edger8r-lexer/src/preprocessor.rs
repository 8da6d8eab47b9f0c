//! Directive filter for `#ifdef` / `#ifndef` / `#else` / `#endif`.
//!
//! Sits between the lexer and the parser. The parser's token pump hands
//! each directive here and, while [`Preprocessor::is_included`] is false,
//! drops tokens until the next `#`. At the close of a document the frame
//! stack must be empty ([`Preprocessor::is_closed`]).

use std::collections::HashSet;

/// The four recognised directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Ifdef,
    Ifndef,
    Else,
    Endif,
}

/// One conditional frame: the directive that opened it and whether its
/// condition holds.
#[derive(Debug, Clone, Copy)]
struct Frame {
    directive: Directive,
    condition: bool,
}

/// The directive filter state: the `-D` name set and the frame stack.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    defines: HashSet<String>,
    stack: Vec<Frame>,
}

impl Preprocessor {
    /// Create a filter over the given `-D` defined names.
    pub fn new(defines: &[String]) -> Self {
        Self {
            defines: defines.iter().cloned().collect(),
            stack: Vec::new(),
        }
    }

    /// Process one directive. `name` is required for `ifdef`/`ifndef`.
    ///
    /// Returns `false` when the directive is ill-formed at this point
    /// (`else` without an open `ifdef`/`ifndef`, `endif` without anything
    /// open); the caller turns that into a located fatal error.
    pub fn process(&mut self, directive: Directive, name: Option<&str>) -> bool {
        match directive {
            Directive::Ifdef | Directive::Ifndef => {
                let name = match name {
                    Some(n) => n,
                    None => return false,
                };
                let defined = self.defines.contains(name);
                let condition = if directive == Directive::Ifdef {
                    defined
                } else {
                    !defined
                };
                self.stack.push(Frame {
                    directive,
                    condition,
                });
                true
            }
            Directive::Else => match self.stack.last_mut() {
                Some(frame)
                    if matches!(frame.directive, Directive::Ifdef | Directive::Ifndef) =>
                {
                    frame.condition = !frame.condition;
                    frame.directive = Directive::Else;
                    true
                }
                _ => false,
            },
            Directive::Endif => self.stack.pop().is_some(),
        }
    }

    /// The aggregate included flag: true iff every open frame's condition
    /// holds.
    pub fn is_included(&self) -> bool {
        self.stack.iter().all(|f| f.condition)
    }

    /// Returns `true` when no conditional is left open.
    pub fn is_closed(&self) -> bool {
        self.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pp(defines: &[&str]) -> Preprocessor {
        let defines: Vec<String> = defines.iter().map(|s| s.to_string()).collect();
        Preprocessor::new(&defines)
    }

    #[test]
    fn test_ifdef_defined() {
        let mut p = pp(&["FOO"]);
        assert!(p.process(Directive::Ifdef, Some("FOO")));
        assert!(p.is_included());
        assert!(p.process(Directive::Endif, None));
        assert!(p.is_closed());
    }

    #[test]
    fn test_ifdef_undefined() {
        let mut p = pp(&[]);
        assert!(p.process(Directive::Ifdef, Some("FOO")));
        assert!(!p.is_included());
        assert!(p.process(Directive::Endif, None));
        assert!(p.is_included());
    }

    #[test]
    fn test_ifndef() {
        let mut p = pp(&["FOO"]);
        assert!(p.process(Directive::Ifndef, Some("FOO")));
        assert!(!p.is_included());
    }

    #[test]
    fn test_else_flips() {
        let mut p = pp(&[]);
        p.process(Directive::Ifdef, Some("FOO"));
        assert!(!p.is_included());
        assert!(p.process(Directive::Else, None));
        assert!(p.is_included());
    }

    #[test]
    fn test_double_else_rejected() {
        let mut p = pp(&[]);
        p.process(Directive::Ifdef, Some("FOO"));
        assert!(p.process(Directive::Else, None));
        assert!(!p.process(Directive::Else, None));
    }

    #[test]
    fn test_else_without_if_rejected() {
        let mut p = pp(&[]);
        assert!(!p.process(Directive::Else, None));
    }

    #[test]
    fn test_endif_without_if_rejected() {
        let mut p = pp(&[]);
        assert!(!p.process(Directive::Endif, None));
    }

    #[test]
    fn test_nested_conjunction() {
        let mut p = pp(&["A"]);
        p.process(Directive::Ifdef, Some("A"));
        assert!(p.is_included());
        p.process(Directive::Ifdef, Some("B"));
        // Inner condition false: the aggregate is false.
        assert!(!p.is_included());
        p.process(Directive::Endif, None);
        assert!(p.is_included());
        p.process(Directive::Endif, None);
        assert!(p.is_closed());
    }

    #[test]
    fn test_unterminated_detected() {
        let mut p = pp(&[]);
        p.process(Directive::Ifdef, Some("FOO"));
        assert!(!p.is_closed());
    }
}
