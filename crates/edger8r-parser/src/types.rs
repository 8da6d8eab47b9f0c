//! Type parsing: `const` prefix, integral combinations, tagged and
//! canonical base types, and the trailing-`*` pointer spine.

use edger8r_lexer::Token;
use edger8r_types::ast::{Ident, Type, TypeTag};
use edger8r_types::Result;

use crate::parser::Parser;

impl<'src, 'ctx> Parser<'src, 'ctx> {
    /// Parse a complete type: optional `const`, a base type, then zero
    /// or more trailing `*` building a left-leaning `Ptr` spine.
    pub(crate) fn parse_atype(&mut self) -> Result<Type> {
        let mut t = self.next()?;
        let is_const = t == "const";
        if is_const {
            t = self.next()?;
        }

        let base = match self.parse_atype1(t)? {
            Some(ty) => Some(ty),
            None => self.parse_atype2(t)?,
        };
        let base = match base {
            Some(ty) => ty,
            None => return Err(self.err(format!("expecting typename, got `{t}`"))),
        };

        let mut ty = if is_const {
            Type::wrap(TypeTag::Const, base)
        } else {
            base
        };
        while self.peek() == '*' {
            self.next()?;
            ty = Type::wrap(TypeTag::Ptr, ty);
        }
        Ok(ty)
    }

    /// Multi-token integral types: `unsigned`, `long`, `short`, `char`,
    /// `int` and their combinations.
    fn parse_atype1(&mut self, t: Token<'src>) -> Result<Option<Type>> {
        let mut t = t;
        let mut unsigned = false;
        if t == "unsigned" {
            unsigned = true;
            let p = self.peek();
            if p == "char" || p == "short" || p == "int" || p == "long" {
                t = self.next()?;
            } else {
                // Bare `unsigned` is `unsigned int`.
                return Ok(Some(Type::wrap(TypeTag::Unsigned, Type::plain(TypeTag::Int))));
            }
        }

        let ty = if t == "long" {
            let p = self.peek();
            if p == "int" {
                self.next()?;
                Some(Type::plain(TypeTag::Long))
            } else if p == "long" {
                self.next()?;
                Some(Type::plain(TypeTag::LLong))
            } else if p == "double" {
                if unsigned {
                    return Err(self.err("invalid double following unsigned"));
                }
                self.next()?;
                Some(Type::plain(TypeTag::LDouble))
            } else {
                Some(Type::plain(TypeTag::Long))
            }
        } else if t == "short" || t == "char" {
            let ty = Type::plain(if t == "short" {
                TypeTag::Short
            } else {
                TypeTag::Char
            });
            if self.peek() == "int" {
                self.next()?;
            }
            Some(ty)
        } else if t == "int" {
            Some(Type::plain(TypeTag::Int))
        } else {
            None
        };

        Ok(match ty {
            Some(ty) if unsigned => Some(Type::wrap(TypeTag::Unsigned, ty)),
            other => other,
        })
    }

    /// Tagged types (`struct X`), canonical size-named types, and named
    /// identifiers as opaque `Foreign` types.
    fn parse_atype2(&mut self, t: Token<'src>) -> Result<Option<Type>> {
        if t == "struct" || t == "enum" || t == "union" {
            let name = self.next()?;
            if !name.is_name() {
                return Err(self.err(format!("expecting struct/enum/union name, got `{name}`")));
            }
            let tag = match t.as_str() {
                "enum" => TypeTag::Enum,
                "union" => TypeTag::Union,
                _ => TypeTag::Struct,
            };
            return Ok(Some(Type::named(tag, name.as_str())));
        }

        let tag = match t.as_str() {
            "bool" => TypeTag::Bool,
            "void" => TypeTag::Void,
            "wchar_t" => TypeTag::WChar,
            "size_t" => TypeTag::SizeT,
            "int8_t" => TypeTag::Int8,
            "int16_t" => TypeTag::Int16,
            "int32_t" => TypeTag::Int32,
            "int64_t" => TypeTag::Int64,
            "uint8_t" => TypeTag::UInt8,
            "uint16_t" => TypeTag::UInt16,
            "uint32_t" => TypeTag::UInt32,
            "uint64_t" => TypeTag::UInt64,
            "float" => TypeTag::Float,
            "double" => TypeTag::Double,
            _ => {
                return Ok(if t.is_name() {
                    Some(Type::named(TypeTag::Foreign, t.as_str()))
                } else {
                    None
                });
            }
        };
        Ok(Some(Type::plain(tag)))
    }

    /// Array dimensions: one or more `[int-or-name]` suffixes.
    pub(crate) fn parse_dims(&mut self) -> Result<Option<Vec<Ident>>> {
        if self.peek() != '[' {
            return Ok(None);
        }
        let mut dims = Vec::new();
        while self.peek() == '[' {
            self.next()?;
            let t = self.next()?;
            if !t.is_int() && !t.is_name() {
                return Err(self.err(format!("expecting array dimension, got `{t}`")));
            }
            dims.push(t.to_ident());
            self.expect("]")?;
        }
        Ok(Some(dims))
    }
}
