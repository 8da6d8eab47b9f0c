//! Semantic checks that run after a declarator, struct, or function is
//! fully parsed: size/count cross-reference resolution, deep-copy
//! legality, and the policy-gated portability and security diagnostics.

use edger8r_types::ast::{Attrs, Decl, Function, Ident, TypeTag};
use edger8r_types::{Resolution, Result, Span, Warning};

use crate::parser::Parser;

impl<'src, 'ctx> Parser<'src, 'ctx> {
    /// Route a diagnostic through the warning policy: suppressed, printed
    /// as a warning, or promoted to a fatal error.
    fn warn_or_err(&self, warning: Warning, span: Option<Span>, message: String) -> Result<()> {
        match self.ctx.policy.resolve(warning) {
            Resolution::Off => Ok(()),
            Resolution::Warn => {
                match span {
                    Some(span) => tracing::warn!(
                        "{}:{}:{} {}",
                        self.file_name,
                        span.start_line,
                        span.start_col,
                        message
                    ),
                    None => tracing::warn!("{} {}", self.file_name, message),
                }
                Ok(())
            }
            Resolution::Error => Err(match span {
                Some(span) => self.err_span(span, message),
                None => self.err(message),
            }),
        }
    }

    pub(crate) fn warn_unsupported_allow(&self, fname: &str) -> Result<()> {
        self.warn_or_err(
            Warning::UnsupportedAllow,
            None,
            format!(
                "Function `{fname}': the `allow' syntax is currently unsupported. \
                 Ignored [-Wunsupported-allow]."
            ),
        )
    }

    pub(crate) fn warn_function_return_ptr(&self, fname: &str) -> Result<()> {
        self.warn_or_err(
            Warning::ReturnPtr,
            None,
            format!(
                "Function `{fname}': The function returns a pointer, which could expose \
                 memory addresses across the host-enclave boundary. Consider passing the \
                 pointer as an out parameter instead [-Wreturn-ptr]."
            ),
        )
    }

    pub(crate) fn warn_ptr_in_local_struct(&self, sname: &str, d: &Decl) -> Result<()> {
        self.warn_or_err(
            Warning::PtrInStruct,
            None,
            format!(
                "struct `{sname}': The member `{}' is a pointer that is not serializable. \
                 Consider annotating the member with the `count' or `size' attribute \
                 [-Wptr-in-struct].",
                d.name
            ),
        )
    }

    /// Non-portable parameter types: `wchar_t`, `long double`, `long`,
    /// `unsigned long` (after stripping `const` and `*`).
    pub(crate) fn check_non_portable_type(&self, f: &Function) -> Result<()> {
        for p in &f.params {
            let mut t = &p.ty;
            while let (TypeTag::Const | TypeTag::Ptr, Some(inner)) = (t.tag, t.inner.as_deref()) {
                t = inner;
            }

            let type_name = match t.tag {
                TypeTag::WChar => "wchar_t",
                TypeTag::LDouble => "long double",
                TypeTag::Long => "long",
                TypeTag::Unsigned
                    if t.inner.as_deref().map(|i| i.tag) == Some(TypeTag::Long) =>
                {
                    "unsigned long"
                }
                _ => continue,
            };

            self.warn_or_err(
                Warning::NonPortableType,
                None,
                format!(
                    "Function `{}': `{type_name}' has different sizes on Windows and Linux. \
                     This enclave cannot be built in Linux and then safely loaded in Windows \
                     [-Wnon-portable-type].",
                    f.name
                ),
            )?;
        }
        Ok(())
    }

    /// Pointer parameters without any annotation, and pointers of types
    /// with no local definition.
    pub(crate) fn check_function_param(&self, fname: &str, d: &Decl) -> Result<()> {
        if d.attrs.as_ref().is_some_and(|a| a.user_check) {
            return Ok(());
        }
        if !d.ty.is_ptr() {
            return Ok(());
        }

        if d.attrs.is_none() {
            self.warn_or_err(
                Warning::PtrInFunction,
                None,
                format!(
                    "Function `{fname}': `{}' is a pointer that is not serializable. \
                     Consider annotating the parameter with the direction annotation \
                     [-Wptr-in-function].",
                    d.name
                ),
            )?;
        }

        if let Some(base) = d.ty.pointee() {
            if matches!(base.tag, TypeTag::Foreign | TypeTag::Struct)
                && !self.types.iter().any(|t| t.name == base.name)
            {
                self.warn_or_err(
                    Warning::ForeignTypePtr,
                    None,
                    format!(
                        "Function `{fname}': `{}' is a pointer of a foreign type `{}' that may \
                         not be serializable. Consider defining the type in the EDL file with \
                         proper annotations [-Wforeign-type-ptr].",
                        d.name, base.name
                    ),
                )?;
            }
        }
        Ok(())
    }

    fn warn_signed_size_or_count(
        &self,
        token: &Ident,
        kind: &str,
        parent: &str,
    ) -> Result<()> {
        self.warn_or_err(
            Warning::SignedSizeOrCount,
            Some(token.span),
            format!(
                "{kind} `{parent}': The size or count parameter `{}' should not be signed \
                 [-Wsigned-size-or-count].",
                token.name
            ),
        )
    }

    /// `size=` and `count=` together on one declarator is unsupported.
    pub(crate) fn error_size_count(&self, f: &Function) -> Result<()> {
        for p in &f.params {
            if let Some(attrs) = &p.attrs {
                if attrs.size.is_some() && attrs.count.is_some() {
                    return Err(self.err(format!(
                        "Function `{}': simultaneous `size' and `count' parameters are not \
                         supported",
                        f.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve every `size=IDENT`/`count=IDENT` against its sibling
    /// declarators: the referent must exist, must not be an array,
    /// pointer, or aggregate, and should be unsigned. In struct context
    /// the referent is retroactively marked `is_size_or_count` so the
    /// marshalling layer will not overwrite it on deep-copy unmarshal.
    pub(crate) fn check_size_count_decls(
        &self,
        parent_name: &str,
        decls: &mut [Decl],
    ) -> Result<()> {
        for i in 0..decls.len() {
            let tokens: Vec<Ident> = {
                let attrs = match &decls[i].attrs {
                    Some(attrs) => attrs,
                    None => continue,
                };
                attrs.size.iter().chain(attrs.count.iter()).cloned().collect()
            };

            for t in tokens {
                if t.is_int() {
                    continue;
                }

                let j = match decls.iter().position(|d| d.name == t.name) {
                    Some(j) => j,
                    None => {
                        return Err(self.err_span(
                            t.span,
                            format!("could not find declaration for `{}'", t.name),
                        ))
                    }
                };

                if self.in_struct {
                    // The driver member may appear after the size/count
                    // annotation that references it, so it can only be
                    // marked once the whole struct is parsed.
                    let driver = &mut decls[j];
                    driver
                        .attrs
                        .get_or_insert_with(Attrs::default)
                        .is_size_or_count = true;
                }

                let driver = &decls[j];
                if driver.dims.as_ref().is_some_and(|d| !d.is_empty()) {
                    return Err(self.err_span(t.span, "size/count has invalid type"));
                }

                let ty = driver.ty.strip_const();
                match ty.tag {
                    TypeTag::Ptr | TypeTag::Struct | TypeTag::Union => {
                        return Err(self.err_span(t.span, "size/count has invalid type"));
                    }
                    _ if ty.is_signed_integral() => {
                        self.warn_signed_size_or_count(
                            &t,
                            if self.in_function { "Function" } else { "struct" },
                            parent_name,
                        )?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// A user-defined struct with attributed fields passed *by value*
    /// cannot be deep copied; deep-copy semantics require a pointer.
    pub(crate) fn check_deep_copy_struct_by_value(&self, f: &Function) -> Result<()> {
        for p in &f.params {
            let ty = p.ty.strip_const();
            if !matches!(ty.tag, TypeTag::Struct | TypeTag::Foreign) {
                continue;
            }
            if let Some(ut) = self.types.iter().find(|t| t.name == ty.name) {
                if ut.has_attributed_fields() {
                    return Err(self.err(format!(
                        "the structure declaration `{}' specifies a deep copy is expected. \
                         Referenced by value in function `{}' detected",
                        ty.name, f.name
                    )));
                }
            }
        }
        Ok(())
    }
}
