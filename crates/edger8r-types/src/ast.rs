//! AST node types for the EDL language.
//!
//! Nodes are created during parse and outlive the parser. Imported
//! documents share their [`UserType`] and [`Function`] nodes by `Rc`;
//! the merger deduplicates by name and detects genuine duplicates by
//! pointer identity ([`Rc::ptr_eq`]).

use crate::Span;
use std::fmt;
use std::rc::Rc;

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier or integer literal captured from the token stream.
///
/// Used where the grammar accepts "a name or an integer": `size=`/`count=`
/// values, array dimensions, and explicit enum values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// Returns `true` if this is an integer literal rather than a name.
    pub fn is_int(&self) -> bool {
        !self.name.is_empty() && self.name.bytes().all(|b| b.is_ascii_digit())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

/// The closed set of EDL type constructors.
///
/// `Ptr` and `Const` are unary constructors carrying an inner type;
/// `Unsigned` wraps an integral base; `Foreign` names an unresolved
/// identifier treated as an opaque user type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    Char,
    Short,
    Int,
    Long,
    LLong,
    Float,
    Double,
    LDouble,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Void,
    WChar,
    SizeT,
    Struct,
    Union,
    Enum,
    Foreign,
    Ptr,
    Const,
    Unsigned,
}

/// An EDL type: a tag, an optional inner type (for `Ptr`/`Const`/`Unsigned`),
/// and a name (for `Struct`/`Union`/`Enum`/`Foreign`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub tag: TypeTag,
    pub inner: Option<Box<Type>>,
    pub name: String,
}

impl Type {
    /// A plain type with no inner type and no name.
    pub fn plain(tag: TypeTag) -> Self {
        Self {
            tag,
            inner: None,
            name: String::new(),
        }
    }

    /// A tagged or foreign type referring to `name`.
    pub fn named(tag: TypeTag, name: impl Into<String>) -> Self {
        Self {
            tag,
            inner: None,
            name: name.into(),
        }
    }

    /// Wrap `inner` in a unary constructor (`Ptr`, `Const`, `Unsigned`).
    pub fn wrap(tag: TypeTag, inner: Type) -> Self {
        Self {
            tag,
            inner: Some(Box::new(inner)),
            name: String::new(),
        }
    }

    pub fn is_ptr(&self) -> bool {
        self.tag == TypeTag::Ptr
    }

    pub fn is_void(&self) -> bool {
        self.tag == TypeTag::Void
    }

    /// Strip a leading `Const`, if present.
    pub fn strip_const(&self) -> &Type {
        match self.tag {
            TypeTag::Const => self.inner.as_deref().unwrap_or(self),
            _ => self,
        }
    }

    /// The pointee of a `Ptr`, with any `Const` stripped.
    ///
    /// Returns `None` for non-pointer types.
    pub fn pointee(&self) -> Option<&Type> {
        match self.tag {
            TypeTag::Ptr => self.inner.as_deref().map(Type::strip_const),
            _ => None,
        }
    }

    /// Returns `true` if this is a signed integral scalar
    /// (the signed-size-or-count diagnostic set).
    pub fn is_signed_integral(&self) -> bool {
        matches!(
            self.tag,
            TypeTag::Char
                | TypeTag::Short
                | TypeTag::Int
                | TypeTag::Long
                | TypeTag::LLong
                | TypeTag::Int8
                | TypeTag::Int16
                | TypeTag::Int32
                | TypeTag::Int64
        )
    }

    /// Returns `true` if this is an unsigned integral scalar.
    pub fn is_unsigned_integral(&self) -> bool {
        matches!(
            self.tag,
            TypeTag::Unsigned
                | TypeTag::UInt8
                | TypeTag::UInt16
                | TypeTag::UInt32
                | TypeTag::UInt64
                | TypeTag::SizeT
        )
    }
}

impl fmt::Display for Type {
    /// Render the type in C syntax (`const char*`, `unsigned long`,
    /// `struct options`, `uint32_t`). Used by diagnostics and by the
    /// emitters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.as_deref();
        match self.tag {
            TypeTag::Const => write!(f, "const {}", inner.expect("const has inner type")),
            TypeTag::Ptr => write!(f, "{}*", inner.expect("ptr has inner type")),
            TypeTag::Unsigned => match inner {
                Some(inner) => write!(f, "unsigned {inner}"),
                None => f.write_str("unsigned int"),
            },
            TypeTag::Struct => write!(f, "struct {}", self.name),
            TypeTag::Union => write!(f, "union {}", self.name),
            TypeTag::Enum => write!(f, "enum {}", self.name),
            TypeTag::Foreign => f.write_str(&self.name),
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::Char => f.write_str("char"),
            TypeTag::Short => f.write_str("short"),
            TypeTag::Int => f.write_str("int"),
            TypeTag::Long => f.write_str("long"),
            TypeTag::LLong => f.write_str("long long"),
            TypeTag::Float => f.write_str("float"),
            TypeTag::Double => f.write_str("double"),
            TypeTag::LDouble => f.write_str("long double"),
            TypeTag::Int8 => f.write_str("int8_t"),
            TypeTag::Int16 => f.write_str("int16_t"),
            TypeTag::Int32 => f.write_str("int32_t"),
            TypeTag::Int64 => f.write_str("int64_t"),
            TypeTag::UInt8 => f.write_str("uint8_t"),
            TypeTag::UInt16 => f.write_str("uint16_t"),
            TypeTag::UInt32 => f.write_str("uint32_t"),
            TypeTag::UInt64 => f.write_str("uint64_t"),
            TypeTag::Void => f.write_str("void"),
            TypeTag::WChar => f.write_str("wchar_t"),
            TypeTag::SizeT => f.write_str("size_t"),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Attributes
// ══════════════════════════════════════════════════════════════════════════════

/// Pointer direction across the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// The attribute record attached to a declarator.
///
/// Absence of a direction is `direction: None`; at most one of
/// `string`/`wstring`/`isptr`/`isary` may be set; `user_check` is
/// mutually exclusive with any direction; `size` and `count` are
/// mutually exclusive with each other.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attrs {
    pub direction: Option<Direction>,
    pub string: bool,
    pub wstring: bool,
    pub isptr: bool,
    pub isary: bool,
    pub user_check: bool,
    /// Set retroactively on struct members referenced by a sibling's
    /// `size=`/`count=` attribute: the marshalling layer must not
    /// overwrite these on deep-copy unmarshal.
    pub is_size_or_count: bool,
    pub size: Option<Ident>,
    pub count: Option<Ident>,
}

impl Attrs {
    /// `in` or `in-out`.
    pub fn is_in(&self) -> bool {
        matches!(self.direction, Some(Direction::In) | Some(Direction::InOut))
    }

    /// `out` or `in-out`.
    pub fn is_out(&self) -> bool {
        matches!(self.direction, Some(Direction::Out) | Some(Direction::InOut))
    }

    pub fn is_inout(&self) -> bool {
        self.direction == Some(Direction::InOut)
    }

    /// `out` only (not `in-out`).
    pub fn is_out_only(&self) -> bool {
        self.direction == Some(Direction::Out)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

/// A declarator: function parameter or struct/union member.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: String,
    pub ty: Type,
    /// Array dimensions, when the declarator is an array. Each dimension
    /// is an integer literal or the name of a constant.
    pub dims: Option<Vec<Ident>>,
    pub attrs: Option<Attrs>,
}

impl Decl {
    /// Returns `true` if this declarator carries a `size=` or `count=`
    /// attribute.
    pub fn has_size_or_count(&self) -> bool {
        self.attrs
            .as_ref()
            .is_some_and(|a| a.size.is_some() || a.count.is_some())
    }
}

/// One enumerator of a user-defined enum, with an optional explicit value.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVal {
    pub name: String,
    pub value: Option<Ident>,
}

/// A user-defined `struct`, `union`, or `enum`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserType {
    pub name: String,
    /// `Struct`, `Union`, or `Enum`.
    pub tag: TypeTag,
    /// Struct/union members.
    pub fields: Vec<Decl>,
    /// Enumerators.
    pub items: Vec<EnumVal>,
}

impl UserType {
    /// Returns `true` if any field carries attributes, which makes the
    /// type deep-copyable (and illegal to pass by value).
    pub fn has_attributed_fields(&self) -> bool {
        self.fields.iter().any(|f| f.attrs.is_some())
    }
}

/// A function declared in a `trusted` or `untrusted` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub rtype: Type,
    pub params: Vec<Decl>,
    /// `transition_using_threads` trailer.
    pub switchless: bool,
    /// `propagate_errno` trailer (untrusted-side only).
    pub errno: bool,
}

// ══════════════════════════════════════════════════════════════════════════════
// Document
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed EDL document with all imports merged in.
#[derive(Debug, Clone)]
pub struct Edl {
    /// Basename of the source file, without extension.
    pub name: String,
    /// Verbatim (quote-preserving) user include tokens.
    pub includes: Vec<String>,
    pub types: Vec<Rc<UserType>>,
    /// ECALLs: callable from host into enclave.
    pub trusted_funcs: Vec<Rc<Function>>,
    /// OCALLs: callable from enclave into host.
    pub untrusted_funcs: Vec<Rc<Function>>,
}

impl Edl {
    /// Look up a user-defined type by name.
    pub fn user_type(&self, name: &str) -> Option<&Rc<UserType>> {
        self.types.iter().find(|t| t.name == name)
    }
}

/// Resolve the user-defined struct a declarator deep-copies through.
///
/// Returns the struct when the declarator is an attributed pointer whose
/// pointee (after stripping `const`) is a locally defined struct with at
/// least one attributed field, which is the condition under which the marshallers
/// must follow nested pointers instead of copying flat bytes.
pub fn user_type_for_deep_copy<'a>(
    types: &'a [Rc<UserType>],
    decl: &Decl,
) -> Option<&'a Rc<UserType>> {
    decl.attrs.as_ref()?;
    let base = decl.ty.pointee()?;
    if !matches!(base.tag, TypeTag::Struct | TypeTag::Foreign) {
        return None;
    }
    let ut = types.iter().find(|t| t.name == base.name)?;
    if ut.tag == TypeTag::Struct && ut.has_attributed_fields() {
        Some(ut)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_is_int() {
        let span = Span::point(1, 1);
        assert!(Ident::new("42", span).is_int());
        assert!(!Ident::new("count", span).is_int());
        assert!(!Ident::new("4n", span).is_int());
        assert!(!Ident::new("", span).is_int());
    }

    #[test]
    fn test_type_strip_const() {
        let t = Type::wrap(TypeTag::Const, Type::plain(TypeTag::Char));
        assert_eq!(t.strip_const().tag, TypeTag::Char);
        let plain = Type::plain(TypeTag::Int);
        assert_eq!(plain.strip_const().tag, TypeTag::Int);
    }

    #[test]
    fn test_type_pointee() {
        // const char*
        let t = Type::wrap(
            TypeTag::Ptr,
            Type::wrap(TypeTag::Const, Type::plain(TypeTag::Char)),
        );
        assert_eq!(t.pointee().unwrap().tag, TypeTag::Char);
        assert_eq!(Type::plain(TypeTag::Int).pointee(), None);
    }

    #[test]
    fn test_direction_helpers() {
        let mut a = Attrs::default();
        assert!(!a.is_in() && !a.is_out());
        a.direction = Some(Direction::InOut);
        assert!(a.is_in() && a.is_out() && a.is_inout() && !a.is_out_only());
        a.direction = Some(Direction::Out);
        assert!(!a.is_in() && a.is_out() && a.is_out_only());
    }

    #[test]
    fn test_signed_integral_set() {
        assert!(Type::plain(TypeTag::Int64).is_signed_integral());
        assert!(Type::plain(TypeTag::Char).is_signed_integral());
        assert!(!Type::plain(TypeTag::UInt32).is_signed_integral());
        assert!(!Type::plain(TypeTag::SizeT).is_signed_integral());
        assert!(Type::plain(TypeTag::SizeT).is_unsigned_integral());
    }

    #[test]
    fn test_type_display_c_syntax() {
        let t = Type::wrap(
            TypeTag::Ptr,
            Type::wrap(TypeTag::Const, Type::plain(TypeTag::Char)),
        );
        assert_eq!(t.to_string(), "const char*");
        let t = Type::wrap(TypeTag::Ptr, Type::wrap(TypeTag::Ptr, Type::plain(TypeTag::Int)));
        assert_eq!(t.to_string(), "int**");
        let t = Type::wrap(TypeTag::Unsigned, Type::plain(TypeTag::Long));
        assert_eq!(t.to_string(), "unsigned long");
        assert_eq!(Type::named(TypeTag::Struct, "options").to_string(), "struct options");
        assert_eq!(Type::named(TypeTag::Foreign, "MyType").to_string(), "MyType");
        assert_eq!(Type::plain(TypeTag::LDouble).to_string(), "long double");
    }

    #[test]
    fn test_user_type_attributed_fields() {
        let mut ut = UserType {
            name: "CountParamStruct".into(),
            tag: TypeTag::Struct,
            fields: vec![Decl {
                name: "count".into(),
                ty: Type::plain(TypeTag::SizeT),
                dims: None,
                attrs: None,
            }],
            items: Vec::new(),
        };
        assert!(!ut.has_attributed_fields());
        ut.fields.push(Decl {
            name: "ptr".into(),
            ty: Type::wrap(TypeTag::Ptr, Type::plain(TypeTag::UInt64)),
            dims: None,
            attrs: Some(Attrs {
                count: Some(Ident::new("count", Span::point(1, 1))),
                ..Attrs::default()
            }),
        });
        assert!(ut.has_attributed_fields());
    }
}
