//! Core parser: token pump, cursor helpers, body dispatch, user types,
//! function declarations, and import merging.

use edger8r_lexer::{Directive, Lexer, Preprocessor, Token};
use edger8r_types::ast::{Decl, Edl, EnumVal, Function, TypeTag, UserType};
use edger8r_types::{EdlError, Result, SourceFile, Span};
use std::rc::Rc;

use crate::context::ParseContext;

/// The EDL parser for one source file.
///
/// Pulls tokens lazily from the lexer through the directive filter, with
/// a two-token lookahead window (`peek` / `peek1`).
pub(crate) struct Parser<'src, 'ctx> {
    pub(crate) file_name: String,
    basename: String,
    source_file: &'src SourceFile,
    lexer: Lexer<'src>,
    pp: Preprocessor,
    /// Lookahead window.
    t: Token<'src>,
    t1: Token<'src>,
    /// Location of the most recently consumed token.
    line: u32,
    col: u32,
    /// Struct/union member context (restricts attributes to size/count).
    pub(crate) in_struct: bool,
    /// Function parameter context.
    pub(crate) in_function: bool,

    includes: Vec<String>,
    pub(crate) types: Vec<Rc<UserType>>,
    trusted_funcs: Vec<Rc<Function>>,
    untrusted_funcs: Vec<Rc<Function>>,
    imported_trusted_funcs: Vec<Rc<Function>>,
    imported_untrusted_funcs: Vec<Rc<Function>>,

    pub(crate) ctx: &'ctx mut ParseContext,
}

impl<'src, 'ctx> Parser<'src, 'ctx> {
    pub(crate) fn new(
        source_file: &'src SourceFile,
        basename: String,
        ctx: &'ctx mut ParseContext,
    ) -> Result<Self> {
        let pp = Preprocessor::new(&ctx.defines);
        let mut parser = Self {
            file_name: source_file.name.clone(),
            basename,
            source_file,
            lexer: Lexer::new(source_file),
            pp,
            t: Token::eof(1, 1),
            t1: Token::eof(1, 1),
            line: 1,
            col: 1,
            in_struct: false,
            in_function: false,
            includes: Vec::new(),
            types: Vec::new(),
            trusted_funcs: Vec::new(),
            untrusted_funcs: Vec::new(),
            imported_trusted_funcs: Vec::new(),
            imported_untrusted_funcs: Vec::new(),
            ctx,
        };
        parser.t = parser.pump()?;
        parser.t1 = parser.pump()?;
        Ok(parser)
    }

    // ── Token pump ────────────────────────────────────────────────────────────

    /// Pull the next token, consuming `#` directives and dropping tokens
    /// inside excluded branches.
    fn pump(&mut self) -> Result<Token<'src>> {
        let mut t = self.lexer.next()?;

        while t == '#' {
            t = self.lexer.next()?;
            match t.as_str() {
                "ifdef" | "ifndef" => {
                    let directive = if t == "ifdef" {
                        Directive::Ifdef
                    } else {
                        Directive::Ifndef
                    };
                    let name = self.lexer.next()?;
                    if !name.is_name() {
                        return Err(self.err_tok(
                            &name,
                            format!("expecting macro name, got `{name}`"),
                        ));
                    }
                    self.pp.process(directive, Some(name.as_str()));
                    t = self.lexer.next()?;
                }
                "else" => {
                    if !self.pp.process(Directive::Else, None) {
                        return Err(self.err_tok(&t, "no previous #ifdef or #ifndef"));
                    }
                    t = self.lexer.next()?;
                }
                "endif" => {
                    if !self.pp.process(Directive::Endif, None) {
                        return Err(
                            self.err_tok(&t, "no previous #ifdef, #ifndef, or #else")
                        );
                    }
                    t = self.lexer.next()?;
                }
                _ => {
                    return Err(self.err_tok(&t, format!("unsupported directive `{t}`")));
                }
            }

            if !self.pp.is_included() {
                // Skip tokens till the next preprocessor directive.
                while t != '#' && !t.is_eof() {
                    t = self.lexer.next()?;
                }
            }
        }
        Ok(t)
    }

    // ── Cursor helpers ────────────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> Token<'src> {
        self.t
    }

    pub(crate) fn peek1(&self) -> Token<'src> {
        self.t1
    }

    pub(crate) fn next(&mut self) -> Result<Token<'src>> {
        let t = self.t;
        self.t = self.t1;
        self.t1 = self.pump()?;
        self.line = t.line;
        self.col = t.col;
        Ok(t)
    }

    pub(crate) fn expect(&mut self, s: &str) -> Result<()> {
        let t = self.next()?;
        if t != s {
            return Err(self.err(format!("expecting `{s}` got `{t}`")));
        }
        Ok(())
    }

    // ── Error helpers ─────────────────────────────────────────────────────────

    /// A fatal error at the most recently consumed token.
    pub(crate) fn err(&self, message: impl Into<String>) -> EdlError {
        self.err_span(Span::point(self.line, self.col), message)
    }

    pub(crate) fn err_tok(&self, t: &Token<'_>, message: impl Into<String>) -> EdlError {
        self.err_span(t.span(), message)
    }

    pub(crate) fn err_span(&self, span: Span, message: impl Into<String>) -> EdlError {
        let source_line = self
            .source_file
            .line(span.start_line)
            .unwrap_or("")
            .to_string();
        EdlError::new(&self.file_name, message, span, source_line)
    }

    // ── Entry point ───────────────────────────────────────────────────────────

    /// Parse `enclave { body }` and return the merged document.
    pub(crate) fn parse(mut self) -> Result<Edl> {
        tracing::info!("processing {}", self.file_name);
        self.expect("enclave")?;
        self.expect("{")?;
        let edl = self.parse_body()?;
        self.expect("}")?;
        Ok(edl)
    }

    fn parse_body(&mut self) -> Result<Edl> {
        loop {
            let p = self.peek();
            if p == '}' || p.is_eof() {
                break;
            }
            let t = self.next()?;
            match t.as_str() {
                "trusted" => self.parse_trusted()?,
                "untrusted" => self.parse_untrusted()?,
                "include" => self.parse_include()?,
                "import" => self.parse_import()?,
                "enum" => self.parse_enum()?,
                "struct" => self.parse_struct_or_union(true)?,
                "union" => self.parse_struct_or_union(false)?,
                "from" => self.parse_from_import()?,
                _ => return Err(self.err(format!("unexpected token `{t}`"))),
            }
        }

        if !self.pp.is_closed() {
            return Err(self.err("unterminated #ifdef or #ifndef"));
        }

        let mut trusted_funcs = std::mem::take(&mut self.trusted_funcs);
        trusted_funcs.append(&mut self.imported_trusted_funcs);
        let mut untrusted_funcs = std::mem::take(&mut self.untrusted_funcs);
        untrusted_funcs.append(&mut self.imported_untrusted_funcs);

        Ok(Edl {
            name: self.basename.clone(),
            includes: std::mem::take(&mut self.includes),
            types: std::mem::take(&mut self.types),
            trusted_funcs,
            untrusted_funcs,
        })
    }

    // ── Includes and imports ──────────────────────────────────────────────────

    fn parse_include(&mut self) -> Result<()> {
        let t = self.next()?;
        if !t.is_string_literal() {
            return Err(self.err("expecting header filename"));
        }
        // Quote-preserving: the emitter writes `#include <token>` verbatim.
        self.append_include(t.as_str());
        // The terminating `;` is optional in the wild.
        if self.peek() == ';' {
            self.next()?;
        }
        Ok(())
    }

    /// Parse the filename of an `import`/`from` statement and recursively
    /// parse it. Returns `None` when the statement sits in an excluded
    /// directive branch.
    fn parse_import_file(&mut self) -> Result<Option<Rc<Edl>>> {
        let t = self.next()?;
        if !t.is_string_literal() {
            return Err(self.err("expecting edl filename"));
        }
        if !self.pp.is_included() {
            return Ok(None);
        }
        let path = std::path::PathBuf::from(t.unquoted());
        let edl = crate::parse_file(&path, self.ctx)?;
        Ok(Some(edl))
    }

    fn parse_import(&mut self) -> Result<()> {
        if let Some(edl) = self.parse_import_file()? {
            for ty in &edl.types {
                self.append_type(ty.clone())?;
            }
            for inc in &edl.includes {
                self.append_include(inc);
            }
            for f in &edl.trusted_funcs {
                self.append_function(true, true, f.clone())?;
            }
            for f in &edl.untrusted_funcs {
                self.append_function(true, false, f.clone())?;
            }
        }
        if self.peek() == ';' {
            self.next()?;
        }
        Ok(())
    }

    fn parse_from_import(&mut self) -> Result<()> {
        let edl = self.parse_import_file()?;
        if let Some(edl) = &edl {
            for ty in &edl.types {
                self.append_type(ty.clone())?;
            }
            for inc in &edl.includes {
                self.append_include(inc);
            }
        }

        self.expect("import")?;
        if self.peek() == '*' {
            self.next()?;
            if let Some(edl) = &edl {
                for f in &edl.trusted_funcs {
                    self.append_function(true, true, f.clone())?;
                }
                for f in &edl.untrusted_funcs {
                    self.append_function(true, false, f.clone())?;
                }
            }
        } else {
            loop {
                let p = self.peek();
                if p == ';' || p.is_eof() {
                    break;
                }
                let t = self.next()?;
                if !t.is_name() {
                    return Err(self.err("expecting function name"));
                }

                if let Some(edl) = &edl {
                    let name = t.as_str();
                    let trusted = edl.trusted_funcs.iter().find(|f| f.name == name).cloned();
                    if let Some(f) = trusted {
                        self.append_function(true, true, f)?;
                    } else if let Some(f) =
                        edl.untrusted_funcs.iter().find(|f| f.name == name).cloned()
                    {
                        self.append_function(true, false, f)?;
                    } else {
                        return Err(
                            self.err(format!("function {name} not found in imported edl"))
                        );
                    }
                }

                if self.peek() != ';' {
                    self.expect(",")?;
                }
            }
        }
        self.expect(";")?;
        Ok(())
    }

    // ── Merging ───────────────────────────────────────────────────────────────

    fn append_include(&mut self, inc: &str) {
        if !self.includes.iter().any(|i| i == inc) {
            self.includes.push(inc.to_string());
        }
    }

    pub(crate) fn append_type(&mut self, ty: Rc<UserType>) -> Result<()> {
        if let Some(existing) = self.types.iter().find(|t| t.name == ty.name) {
            if !Rc::ptr_eq(existing, &ty) {
                return Err(self.err(format!(
                    "duplicate type definition detected for {}",
                    ty.name
                )));
            }
            return Ok(());
        }
        self.types.push(ty);
        Ok(())
    }

    fn append_function(&mut self, imported: bool, trusted: bool, f: Rc<Function>) -> Result<()> {
        let buckets = [
            &self.trusted_funcs,
            &self.untrusted_funcs,
            &self.imported_trusted_funcs,
            &self.imported_untrusted_funcs,
        ];
        let mut already_present = false;
        for bucket in buckets {
            if let Some(existing) = bucket.iter().find(|g| g.name == f.name) {
                if !Rc::ptr_eq(existing, &f) {
                    return Err(self.err(format!(
                        "duplicate function definition detected for {}",
                        f.name
                    )));
                }
                already_present = true;
            }
        }
        if !already_present {
            let bucket = match (imported, trusted) {
                (false, true) => &mut self.trusted_funcs,
                (false, false) => &mut self.untrusted_funcs,
                (true, true) => &mut self.imported_trusted_funcs,
                (true, false) => &mut self.imported_untrusted_funcs,
            };
            bucket.push(f);
        }
        Ok(())
    }

    // ── User types ────────────────────────────────────────────────────────────

    fn parse_enum(&mut self) -> Result<()> {
        let mut enum_name = String::new();
        if self.peek().is_name() {
            enum_name = self.next()?.as_str().to_string();
        }

        let mut items = Vec::new();
        self.expect("{")?;
        while self.peek() != '}' {
            let name = self.next()?;
            if !name.is_name() {
                return Err(self.err(format!("expecting identifier, got `{name}`")));
            }
            let mut value = None;
            if self.peek() == '=' {
                self.next()?;
                let v = self.next()?;
                if !v.is_name() && !v.is_int() {
                    return Err(self.err(format!("expecting enum value, got `{v}`")));
                }
                value = Some(v.to_ident());
            }
            if self.peek() != '}' {
                self.expect(",")?;
            }
            items.push(EnumVal {
                name: name.as_str().to_string(),
                value,
            });
        }
        self.append_type(Rc::new(UserType {
            name: enum_name,
            tag: TypeTag::Enum,
            fields: Vec::new(),
            items,
        }))?;
        self.expect("}")?;
        self.expect(";")?;
        Ok(())
    }

    fn parse_struct_or_union(&mut self, is_struct: bool) -> Result<()> {
        self.in_struct = is_struct;
        let name_tok = self.next()?;
        if !name_tok.is_name() {
            return Err(self.err(format!("expecting struct/union name, got `{name_tok}`")));
        }
        let name = name_tok.as_str().to_string();

        let mut fields: Vec<Decl> = Vec::new();
        self.expect("{")?;
        while self.peek() != "}" {
            let decl = self.parse_decl()?;
            if decl.attrs.is_some() && !is_struct {
                return Err(self.err("attributes are not allowed for unions"));
            }
            if is_struct && decl.ty.is_ptr() && !decl.has_size_or_count() {
                self.warn_ptr_in_local_struct(&name, &decl)?;
            }
            fields.push(decl);
            if self.peek() != "}" {
                self.expect(";")?;
            }
        }
        // Resolve size/count references and mark drivers before the type
        // is frozen behind an Rc.
        self.check_size_count_decls(&name, &mut fields)?;
        self.append_type(Rc::new(UserType {
            name,
            tag: if is_struct {
                TypeTag::Struct
            } else {
                TypeTag::Union
            },
            fields,
            items: Vec::new(),
        }))?;
        self.expect("}")?;
        self.expect(";")?;
        self.in_struct = false;
        Ok(())
    }

    // ── Function groups ───────────────────────────────────────────────────────

    fn parse_trusted(&mut self) -> Result<()> {
        self.expect("{")?;
        while self.peek() != '}' {
            let mut is_private = true;
            if self.peek() == "public" {
                self.next()?;
                is_private = false;
            }

            let f = self.parse_function_decl(true)?;
            let fname = f.name.clone();
            self.append_function(false, true, f)?;
            if is_private {
                return Err(EdlError::file_level(
                    &self.file_name,
                    format!("Function `{fname}': `private' specifier is not supported"),
                ));
            }
        }
        self.expect("}")?;
        self.expect(";")?;
        Ok(())
    }

    fn parse_untrusted(&mut self) -> Result<()> {
        self.expect("{")?;
        while self.peek() != '}' {
            let f = self.parse_function_decl(false)?;
            self.append_function(false, false, f)?;
        }
        self.expect("}")?;
        self.expect(";")?;
        Ok(())
    }

    /// `allow(...)` is parsed for its locations, then discarded: fatal on
    /// trusted functions, an `unsupported-allow` diagnostic on untrusted.
    fn parse_allow_list(&mut self, trusted: bool, fname: &str) -> Result<()> {
        if self.peek() != "allow" {
            return Ok(());
        }
        if trusted {
            return Err(
                self.err("the `allow' syntax is invalid for a trusted function (ECALL)")
            );
        }
        self.next()?;
        self.expect("(")?;
        while self.peek() != ")" {
            let t = self.next()?;
            if !t.is_name() {
                return Err(self.err(format!("expecting identifier, got `{t}`")));
            }
            if self.peek() != ")" {
                self.expect(",")?;
            }
        }
        self.expect(")")?;
        self.warn_unsupported_allow(fname)
    }

    fn parse_function_decl(&mut self, trusted: bool) -> Result<Rc<Function>> {
        self.in_function = true;
        let rtype = self.parse_atype()?;
        let name_tok = self.next()?;
        if !name_tok.is_name() {
            return Err(self.err(format!("expecting function name, got `{name_tok}`")));
        }
        let name = name_tok.as_str().to_string();

        if rtype.is_ptr() {
            self.warn_function_return_ptr(&name)?;
        }

        self.expect("(")?;
        // Handle (void).
        if self.peek() == "void" && self.peek1() == ")" {
            self.next()?;
        }

        let mut params = Vec::new();
        while self.peek() != ')' {
            let decl = self.parse_decl()?;
            self.check_function_param(&name, &decl)?;
            params.push(decl);
            if self.peek() != ')' {
                self.expect(",")?;
            }
        }
        self.expect(")")?;
        self.parse_allow_list(trusted, &name)?;

        let mut switchless = false;
        let mut errno = false;
        for _ in 0..2 {
            if self.peek() == "transition_using_threads" && !switchless {
                self.next()?;
                switchless = true;
            } else if !trusted && self.peek() == "propagate_errno" && !errno {
                self.next()?;
                errno = true;
            }
        }
        self.expect(";")?;

        let mut f = Function {
            name,
            rtype,
            params,
            switchless,
            errno,
        };
        self.check_non_portable_type(&f)?;
        self.error_size_count(&f)?;
        let fname = f.name.clone();
        self.check_size_count_decls(&fname, &mut f.params)?;
        self.check_deep_copy_struct_by_value(&f)?;
        self.in_function = false;
        Ok(Rc::new(f))
    }

    /// One declarator: `[attributes] type name [dims]`.
    pub(crate) fn parse_decl(&mut self) -> Result<Decl> {
        let (attrs, attr_toks) = self.parse_attributes()?;
        let ty = self.parse_atype()?;
        let name_tok = self.next()?;
        if !name_tok.is_name() {
            return Err(self.err(format!("expecting identifier got `{name_tok}`")));
        }
        let dims = self.parse_dims()?;
        let decl = Decl {
            name: name_tok.as_str().to_string(),
            ty,
            dims,
            attrs,
        };
        self.validate_attributes(&decl, &attr_toks)?;
        Ok(decl)
    }
}
