//! Attribute parsing and shape validation.
//!
//! Attributes are collected in source order so that violation diagnostics
//! point at the offending attribute token, then cross-checked against the
//! declarator's shape (pointer vs array, directions, base types).

use edger8r_types::ast::{Attrs, Decl, Direction, Ident, TypeTag};
use edger8r_types::Result;

use crate::parser::Parser;

/// One attribute keyword, as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrTok {
    In,
    Out,
    Count,
    Size,
    IsAry,
    IsPtr,
    String,
    Wstring,
    UserCheck,
}

impl<'src, 'ctx> Parser<'src, 'ctx> {
    fn check_attribute(&mut self, name: &str) -> Result<AttrTok> {
        Ok(match name {
            "in" => AttrTok::In,
            "out" => AttrTok::Out,
            "count" => AttrTok::Count,
            "size" => AttrTok::Size,
            "isptr" => AttrTok::IsPtr,
            "isary" => AttrTok::IsAry,
            "string" => AttrTok::String,
            "wstring" => AttrTok::Wstring,
            "user_check" => AttrTok::UserCheck,
            "sizefunc" => {
                return Err(self.err(
                    "the attribute 'sizefunc' is deprecated, use the 'size' attribute instead",
                ))
            }
            _ => return Err(self.err(format!("unknown attribute: `{name}'"))),
        })
    }

    /// Parse `[attr, attr=value, ...]` if present. Returns the attribute
    /// record plus the attribute tokens in source order for validation.
    pub(crate) fn parse_attributes(&mut self) -> Result<(Option<Attrs>, Vec<(AttrTok, Ident)>)> {
        if self.peek() != '[' {
            return Ok((None, Vec::new()));
        }
        self.next()?;

        let mut attrs = Attrs::default();
        let mut toks: Vec<(AttrTok, Ident)> = Vec::new();
        loop {
            let t = self.next()?;
            let atok = self.check_attribute(t.as_str())?;

            // Only count and size attributes are valid for struct members.
            if self.in_struct && !matches!(atok, AttrTok::Count | AttrTok::Size) {
                return Err(self.err(
                    "only `count' and `size' attributes can be specified for struct properties",
                ));
            }

            if toks.iter().any(|(k, _)| *k == atok) {
                return Err(self.err(format!("duplicated attribute: `{t}'")));
            }
            toks.push((atok, t.to_ident()));

            match atok {
                AttrTok::Count | AttrTok::Size => {
                    self.expect("=")?;
                    let v = self.next()?;
                    if !v.is_name() && !v.is_int() {
                        return Err(self.err("expecting integer"));
                    }
                    if atok == AttrTok::Count {
                        attrs.count = Some(v.to_ident());
                    } else {
                        attrs.size = Some(v.to_ident());
                    }
                }
                AttrTok::UserCheck => attrs.user_check = true,
                AttrTok::In => {
                    attrs.direction = Some(match attrs.direction {
                        Some(Direction::Out) | Some(Direction::InOut) => Direction::InOut,
                        _ => Direction::In,
                    });
                }
                AttrTok::Out => {
                    attrs.direction = Some(match attrs.direction {
                        Some(Direction::In) | Some(Direction::InOut) => Direction::InOut,
                        _ => Direction::Out,
                    });
                }
                AttrTok::String => attrs.string = true,
                AttrTok::Wstring => attrs.wstring = true,
                AttrTok::IsPtr => attrs.isptr = true,
                AttrTok::IsAry => attrs.isary = true,
            }

            if self.peek() != ']' {
                self.expect(",")?;
            }
            if self.peek() == ']' {
                break;
            }
        }
        self.expect("]")?;

        Ok((Some(attrs), toks))
    }

    /// Cross-check the attribute set against the declarator's shape.
    /// Violations are fatal, located at the offending attribute token.
    pub(crate) fn validate_attributes(
        &self,
        d: &Decl,
        toks: &[(AttrTok, Ident)],
    ) -> Result<()> {
        let attrs = match d.attrs.as_ref() {
            Some(attrs) => attrs,
            None => return Ok(()),
        };

        let isptr = d.ty.is_ptr();
        let isary = d.dims.as_ref().is_some_and(|dims| !dims.is_empty());
        let base = d.ty.pointee();

        for (atok, tok) in toks {
            match atok {
                AttrTok::String | AttrTok::Wstring => {
                    if attrs.direction == Some(Direction::Out) {
                        return Err(self.err_span(
                            tok.span,
                            "string/wstring attribute should be used with an `in' attribute",
                        ));
                    }
                    if !attrs.is_in() {
                        return Err(self.err_span(
                            tok.span,
                            "string/wstring attributes must be used with pointer direction",
                        ));
                    }
                    if attrs.count.is_some() || attrs.size.is_some() {
                        return Err(self.err_span(
                            tok.span,
                            "size attributes are mutually exclusive with (w)string attribute",
                        ));
                    }
                    if attrs.string && attrs.wstring {
                        return Err(self.err_span(
                            tok.span,
                            "`string' and `wstring' are mutually exclusive",
                        ));
                    }
                    if *atok == AttrTok::String
                        && !(isptr && base.map(|b| b.tag) == Some(TypeTag::Char))
                    {
                        return Err(self.err_span(
                            tok.span,
                            format!(
                                "invalid `string' attribute - `{}' is not char pointer",
                                d.name
                            ),
                        ));
                    }
                    if *atok == AttrTok::Wstring
                        && !(isptr && base.map(|b| b.tag) == Some(TypeTag::WChar))
                    {
                        return Err(self.err_span(
                            tok.span,
                            format!(
                                "invalid `wstring' attribute - `{}' is not wchar_t pointer",
                                d.name
                            ),
                        ));
                    }
                }

                AttrTok::IsAry | AttrTok::IsPtr => {
                    let tokstr = if *atok == AttrTok::IsAry {
                        "`isary'"
                    } else {
                        "`isptr'"
                    };
                    if attrs.isary && attrs.isptr {
                        return Err(self.err_span(
                            tok.span,
                            "`isary' cannot be used with `isptr' together",
                        ));
                    }
                    if attrs.direction.is_none() && !attrs.user_check {
                        return Err(self.err_span(
                            tok.span,
                            format!("{tokstr} should have direction attribute or `user_check'"),
                        ));
                    }
                    if d.ty.tag != TypeTag::Foreign {
                        return Err(self.err_span(
                            tok.span,
                            format!(
                                "{tokstr} attribute is only valid for user defined type, not for `{}'",
                                d.ty
                            ),
                        ));
                    }
                    if *atok == AttrTok::IsPtr && d.dims.is_some() {
                        return Err(self.err_span(
                            tok.span,
                            format!("invalid parameter - `{}' is a pointer array", d.name),
                        ));
                    }
                }

                AttrTok::Count | AttrTok::Size => {
                    if self.in_function && attrs.direction.is_none() {
                        return Err(self.err_span(
                            tok.span,
                            "size/count attributes must be used with pointer direction",
                        ));
                    }
                    if !isptr && !attrs.isptr && !isary && !attrs.isary {
                        return Err(self.plain_type_error(d, tok, match atok {
                            AttrTok::Count => "count",
                            _ => "size",
                        }));
                    }
                }

                AttrTok::In | AttrTok::Out => {
                    if !isptr && !attrs.isptr && !isary && !attrs.isary {
                        return Err(self.plain_type_error(d, tok, match atok {
                            AttrTok::In => "in",
                            _ => "out",
                        }));
                    }
                    if d.ty.is_ptr() {
                        if let Some(ut) =
                            edger8r_types::ast::user_type_for_deep_copy(&self.types, d)
                        {
                            if attrs.size.is_some() {
                                return Err(self.err_span(
                                    tok.span,
                                    format!(
                                        "size attributes are invalid for the pointer of an user-defined type `{}'",
                                        ut.name
                                    ),
                                ));
                            }
                        }
                        if d.dims.is_some() {
                            return Err(self.err_span(
                                tok.span,
                                format!("invalid parameter - `{}' is a pointer array", d.name),
                            ));
                        }
                    }
                }

                AttrTok::UserCheck => {
                    if attrs.direction.is_some() {
                        return Err(self.err_span(
                            tok.span,
                            "pointer direction and `user_check' are mutually exclusive",
                        ));
                    }
                    if !attrs.isptr && !attrs.isary && !isary && !isptr {
                        return Err(self.err_span(
                            tok.span,
                            format!(
                                "`user_check' attribute is invalid for plain type `{}'",
                                d.ty
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// The error for a pointer-shaped attribute on a non-pointer,
    /// non-array declarator.
    fn plain_type_error(
        &self,
        d: &Decl,
        tok: &Ident,
        attr_name: &str,
    ) -> edger8r_types::EdlError {
        if d.ty.tag == TypeTag::Foreign {
            self.err_span(
                tok.span,
                format!("`{attr_name}' is invalid for plain type `{}'", d.ty),
            )
        } else {
            self.err_span(
                tok.span,
                format!("unexpected pointer attributes for `{}'", d.ty),
            )
        }
    }
}
