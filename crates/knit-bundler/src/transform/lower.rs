//! Module syntax lowering
//!
//! Rewrites `import`/`export` declarations into the `exports` + `require`
//! form the bundle runtime provides. Everything else in the source is copied
//! through untouched, line for line.

use indexmap::IndexSet;

use super::lexer::{line_break_ends_statement, position, string_value, tokenize, Token, TokenKind};
use super::strip::strip_types;
use super::{TransformError, Transformed, Transformer};
use crate::options::Dialect;

const ES_MODULE_MARKER: &str = "Object.defineProperty(exports, \"__esModule\", { value: true });";

/// Built-in transformer: lowers ES module syntax to `exports`/`require`
///
/// Under [`Dialect::TypedSuperset`] type syntax is erased first (see
/// [`strip_types`]) and type-only imports and re-exports are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleLowering;

impl ModuleLowering {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for ModuleLowering {
    fn transform(&self, source: &str, dialect: Dialect) -> Result<Transformed, TransformError> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let source = blank_shebang(source);
        let tokens = tokenize(&source)?;
        if dialect == Dialect::TypedSuperset {
            let stripped = strip_types(&source, &tokens)?;
            let tokens = tokenize(&stripped)?;
            return Lowering::new(&stripped, &tokens, dialect).run();
        }
        Lowering::new(&source, &tokens, dialect).run()
    }
}

/// Replace a leading `#!` line with spaces so offsets and lines are kept
fn blank_shebang(source: &str) -> String {
    if !source.starts_with("#!") {
        return source.to_string();
    }
    let end = source.find('\n').unwrap_or(source.len());
    let mut blanked = " ".repeat(end);
    blanked.push_str(&source[end..]);
    blanked
}

/// Bindings introduced by an import clause
#[derive(Debug, Default)]
struct ImportClause {
    default: Option<String>,
    namespace: Option<String>,
    /// (imported name, local name)
    named: Vec<(String, String)>,
    /// `{ ... }` was written, even if every entry was type-only
    has_braces: bool,
    /// Type-only entries dropped from `named`
    elided: usize,
}

impl ImportClause {
    fn is_type_only(&self) -> bool {
        self.default.is_none() && self.namespace.is_none() && self.named.is_empty() && self.elided > 0
    }
}

/// Where an export assignment is placed relative to the module body
enum Placement {
    /// Before the body; function declarations are hoisted
    Prologue,
    /// After the body, once every declaration has run
    Epilogue,
}

struct Lowering<'a> {
    source: &'a str,
    tokens: &'a [Token],
    dialect: Dialect,
    pos: usize,
    out: String,
    copied: usize,
    prologue: Vec<String>,
    epilogue: Vec<String>,
    specifiers: IndexSet<String>,
    temps: usize,
    is_module: bool,
}

impl<'a> Lowering<'a> {
    fn new(source: &'a str, tokens: &'a [Token], dialect: Dialect) -> Self {
        Self {
            source,
            tokens,
            dialect,
            pos: 0,
            out: String::with_capacity(source.len() + 64),
            copied: 0,
            prologue: Vec::new(),
            epilogue: Vec::new(),
            specifiers: IndexSet::new(),
            temps: 0,
            is_module: false,
        }
    }

    fn run(mut self) -> Result<Transformed, TransformError> {
        let mut depth = 0usize;

        while let Some(token) = self.tokens.get(self.pos).copied() {
            if token.kind.opens() {
                depth += 1;
            } else if token.kind.closes() {
                depth = depth.saturating_sub(1);
            } else if token.kind == TokenKind::Ident && !self.after_dot(self.pos) {
                match self.text(self.pos) {
                    "import" if depth == 0 && self.is_import_declaration() => {
                        self.lower_import()?;
                        continue;
                    }
                    "export" if depth == 0 => {
                        self.lower_export()?;
                        continue;
                    }
                    "require" => self.record_require_call(),
                    _ => {}
                }
            }
            self.pos += 1;
        }

        Ok(self.finish())
    }

    fn finish(mut self) -> Transformed {
        self.out.push_str(&self.source[self.copied..]);

        let mut code = self.out;
        if self.is_module {
            let mut head = String::from(ES_MODULE_MARKER);
            for line in &self.prologue {
                head.push(' ');
                head.push_str(line);
            }
            head.push(' ');
            code.insert_str(directive_end(self.tokens), &head);

            if !self.epilogue.is_empty() {
                if !code.ends_with('\n') {
                    code.push('\n');
                }
                code.push_str(&self.epilogue.join(" "));
                code.push('\n');
            }
        }

        Transformed {
            code,
            specifiers: self.specifiers.into_iter().collect(),
        }
    }

    // ----- imports -------------------------------------------------------

    fn is_import_declaration(&self) -> bool {
        !matches!(
            self.kind(self.pos + 1),
            Some(TokenKind::LeftParen) | Some(TokenKind::Dot)
        )
    }

    fn lower_import(&mut self) -> Result<(), TransformError> {
        let start = self.tokens[self.pos].start;
        let mut p = self.pos + 1;
        self.is_module = true;

        // import "./side-effect";
        if self.kind(p) == Some(TokenKind::Str) {
            let specifier = self.string(p);
            let end = self.statement_end(p + 1);
            let replacement = format!("require({});", quote(&specifier));
            self.add_specifier(specifier);
            return self.replace_through(start, end, &replacement);
        }

        // import type { A } from "./types";
        let type_only = self.dialect == Dialect::TypedSuperset
            && self.is_word(p, "type")
            && match self.kind(p + 1) {
                Some(TokenKind::LeftBrace) | Some(TokenKind::Star) => true,
                Some(TokenKind::Ident) => !(self.is_word(p + 1, "from") && self.kind(p + 2) == Some(TokenKind::Str)),
                _ => false,
            };
        if type_only {
            p += 1;
        }

        let (clause, next) = self.parse_import_clause(p)?;
        p = self.expect_word(next, "from", "expected `from` in import declaration")?;
        let specifier = self.expect_string(p, "expected module specifier after `from`")?;
        let end = self.statement_end(self.skip_attributes(p + 1));

        if type_only || clause.is_type_only() {
            return self.replace_through(start, end, "");
        }

        let source = quote(&specifier);
        self.add_specifier(specifier);

        let mut parts = Vec::new();
        if !clause.has_braces && clause.default.is_none() && clause.namespace.is_none() {
            parts.push(format!("require({});", source));
        } else {
            let module = match &clause.namespace {
                Some(namespace) => namespace.clone(),
                None => self.temp(),
            };
            parts.push(format!("var {} = require({});", module, source));
            if let Some(local) = &clause.default {
                parts.push(format!(
                    "var {local} = {module} && {module}.__esModule ? {module}.default : {module};"
                ));
            }
            for (imported, local) in &clause.named {
                parts.push(format!("var {} = {}{};", local, module, member(imported)));
            }
        }

        self.replace_through(start, end, &parts.join(" "))
    }

    fn parse_import_clause(&self, mut p: usize) -> Result<(ImportClause, usize), TransformError> {
        let mut clause = ImportClause::default();

        // Default binding, unless this is `import from "x"`-style ambiguity
        if self.kind(p) == Some(TokenKind::Ident)
            && !(self.is_word(p, "from") && self.kind(p + 1) == Some(TokenKind::Str))
        {
            clause.default = Some(self.text(p).to_string());
            p += 1;
            if self.kind(p) != Some(TokenKind::Comma) {
                return Ok((clause, p));
            }
            p += 1;
        }

        match self.kind(p) {
            Some(TokenKind::Star) => {
                p = self.expect_word(p + 1, "as", "expected `as` after `*` in import declaration")?;
                let name = self.expect_ident(p, "expected namespace name after `as`")?;
                clause.namespace = Some(name);
                p += 1;
            }
            Some(TokenKind::LeftBrace) => {
                clause.has_braces = true;
                let (entries, next, elided) = self.parse_binding_list(p)?;
                clause.named = entries;
                clause.elided = elided;
                p = next;
            }
            _ if clause.default.is_some() => {
                return Err(self.syntax_error(p, "expected `{` or `*` after `,` in import declaration"));
            }
            _ => return Err(self.syntax_error(p, "expected import bindings")),
        }

        Ok((clause, p))
    }

    /// Parse `{ a, b as c, "d-e" as f }` starting at the opening brace.
    ///
    /// Returns (name, alias) pairs, the position after the closing brace and
    /// the number of type-only entries dropped.
    fn parse_binding_list(
        &self,
        open: usize,
    ) -> Result<(Vec<(String, String)>, usize, usize), TransformError> {
        let mut entries = Vec::new();
        let mut elided = 0;
        let mut p = open + 1;

        loop {
            match self.kind(p) {
                Some(TokenKind::RightBrace) => return Ok((entries, p + 1, elided)),
                Some(TokenKind::Ident) | Some(TokenKind::Str) => {}
                _ => return Err(self.syntax_error(p, "expected name in `{ }` list")),
            }

            // `type Foo` inside the braces marks a single type-only entry
            let inline_type = self.dialect == Dialect::TypedSuperset
                && self.is_word(p, "type")
                && matches!(self.kind(p + 1), Some(TokenKind::Ident) | Some(TokenKind::Str))
                && !self.is_word(p + 1, "as");
            if inline_type {
                p += 1;
            }

            let name = self.name_at(p);
            p += 1;
            let alias = if self.is_word(p, "as") {
                let alias = match self.kind(p + 1) {
                    Some(TokenKind::Ident) => self.text(p + 1).to_string(),
                    Some(TokenKind::Str) => self.string(p + 1),
                    _ => return Err(self.syntax_error(p + 1, "expected name after `as`")),
                };
                p += 2;
                alias
            } else {
                name.clone()
            };

            if inline_type {
                elided += 1;
            } else {
                entries.push((name, alias));
            }

            match self.kind(p) {
                Some(TokenKind::Comma) => p += 1,
                Some(TokenKind::RightBrace) => {}
                _ => return Err(self.syntax_error(p, "expected `,` or `}` in `{ }` list")),
            }
        }
    }

    /// Skip `with { ... }` / `assert { ... }` import attributes
    fn skip_attributes(&self, p: usize) -> usize {
        let is_attributes = (self.is_word(p, "with") || self.is_word(p, "assert"))
            && self.kind(p + 1) == Some(TokenKind::LeftBrace)
            && !self.tokens[p].newline_before;
        if !is_attributes {
            return p;
        }
        let mut depth = 0usize;
        let mut q = p + 1;
        while let Some(kind) = self.kind(q) {
            if kind.opens() {
                depth += 1;
            } else if kind.closes() {
                depth -= 1;
                if depth == 0 {
                    return q + 1;
                }
            }
            q += 1;
        }
        q
    }

    // ----- exports -------------------------------------------------------

    fn lower_export(&mut self) -> Result<(), TransformError> {
        let start = self.tokens[self.pos].start;
        let p = self.pos + 1;
        self.is_module = true;

        if self.kind(p).is_none() {
            return Err(self.syntax_error(p, "expected declaration after `export`"));
        }

        match self.kind(p) {
            Some(TokenKind::LeftBrace) => return self.lower_export_list(start, p, false),
            Some(TokenKind::Star) => return self.lower_export_star(start, p),
            _ => {}
        }

        match self.text(p) {
            "default" => self.lower_export_default(start, p),
            "const" | "let" | "var" => {
                let names = self.declarator_names(p + 1)?;
                for name in names {
                    self.place(Placement::Epilogue, format!("exports.{0} = {0};", name));
                }
                self.strip_keyword(start, p)
            }
            "function" => {
                let name = self.function_name(p)?;
                self.place(Placement::Prologue, format!("exports.{0} = {0};", name));
                self.strip_keyword(start, p)
            }
            "async" if self.is_word(p + 1, "function") => {
                let name = self.function_name(p + 1)?;
                self.place(Placement::Prologue, format!("exports.{0} = {0};", name));
                self.strip_keyword(start, p)
            }
            "class" => {
                let name = self.expect_ident(p + 1, "expected class name")?;
                self.place(Placement::Epilogue, format!("exports.{0} = {0};", name));
                self.strip_keyword(start, p)
            }
            _ if self.dialect == Dialect::TypedSuperset => self.lower_typed_export(start, p),
            _ => Err(self.syntax_error(p, "unsupported export form")),
        }
    }

    fn lower_typed_export(&mut self, start: usize, p: usize) -> Result<(), TransformError> {
        match self.text(p) {
            "type" if self.kind(p + 1) == Some(TokenKind::LeftBrace) => {
                self.lower_export_list(start, p + 1, true)
            }
            "type" if self.kind(p + 1) == Some(TokenKind::Star) => {
                let mut q = p + 2;
                if self.is_word(q, "as") {
                    q += 2;
                }
                q = self.expect_word(q, "from", "expected `from` in export declaration")?;
                self.expect_string(q, "expected module specifier after `from`")?;
                let end = self.statement_end(q + 1);
                self.replace_through(start, end, "")
            }
            _ => Err(self.syntax_error(p, "unsupported export form")),
        }
    }

    fn lower_export_default(&mut self, start: usize, p: usize) -> Result<(), TransformError> {
        let body = p + 1;
        if self.kind(body).is_none() {
            return Err(self.syntax_error(body, "expected expression after `export default`"));
        }

        let declaration = if self.is_word(body, "function") {
            Some((self.optional_function_name(body), Placement::Prologue))
        } else if self.is_word(body, "async")
            && self.is_word(body + 1, "function")
            && !self.tokens[body + 1].newline_before
        {
            Some((self.optional_function_name(body + 1), Placement::Prologue))
        } else if self.is_word(body, "class") {
            let name = match self.kind(body + 1) {
                Some(TokenKind::Ident) if !self.is_word(body + 1, "extends") => {
                    Some(self.text(body + 1).to_string())
                }
                _ => None,
            };
            Some((name, Placement::Epilogue))
        } else {
            None
        };

        let body_start = self.tokens[body].start;
        match declaration {
            Some((Some(name), placement)) => {
                self.place(placement, format!("exports.default = {};", name));
                self.replace_until(start, body_start, "")
            }
            _ => self.replace_until(start, body_start, "exports.default = "),
        }
    }

    /// `export { a, b as c }` and `export { a } from "./x"`, starting at the
    /// opening brace
    fn lower_export_list(&mut self, start: usize, open: usize, type_only: bool) -> Result<(), TransformError> {
        let (entries, next, _) = self.parse_binding_list(open)?;

        if self.is_word(next, "from") {
            let specifier = self.expect_string(next + 1, "expected module specifier after `from`")?;
            let end = self.statement_end(self.skip_attributes(next + 2));
            if type_only {
                return self.replace_through(start, end, "");
            }
            let module = self.temp();
            let mut parts = vec![format!("var {} = require({});", module, quote(&specifier))];
            for (name, alias) in &entries {
                parts.push(format!("exports{} = {}{};", member(alias), module, member(name)));
            }
            self.add_specifier(specifier);
            return self.replace_through(start, end, &parts.join(" "));
        }

        let end = self.statement_end(next);
        if !type_only {
            for (name, alias) in entries {
                self.place(Placement::Epilogue, format!("exports{} = {};", member(&alias), name));
            }
        }
        self.replace_through(start, end, "")
    }

    /// `export * from "./x"` and `export * as ns from "./x"`, starting at `*`
    fn lower_export_star(&mut self, start: usize, star: usize) -> Result<(), TransformError> {
        let mut p = star + 1;
        let alias = if self.is_word(p, "as") {
            let alias = match self.kind(p + 1) {
                Some(TokenKind::Ident) => self.text(p + 1).to_string(),
                Some(TokenKind::Str) => self.string(p + 1),
                _ => return Err(self.syntax_error(p + 1, "expected name after `as`")),
            };
            p += 2;
            Some(alias)
        } else {
            None
        };

        p = self.expect_word(p, "from", "expected `from` in export declaration")?;
        let specifier = self.expect_string(p, "expected module specifier after `from`")?;
        let end = self.statement_end(self.skip_attributes(p + 1));
        let source = quote(&specifier);
        self.add_specifier(specifier);

        let replacement = match alias {
            Some(alias) => format!("exports{} = require({});", member(&alias), source),
            None => {
                let module = self.temp();
                format!(
                    "var {m} = require({s}); Object.keys({m}).forEach(function (k) {{ \
                     if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) \
                     exports[k] = {m}[k]; }});",
                    m = module,
                    s = source
                )
            }
        };
        self.replace_through(start, end, &replacement)
    }

    /// Names bound by `const a = 1, b = f(x, y)` starting after the keyword
    fn declarator_names(&self, mut p: usize) -> Result<Vec<String>, TransformError> {
        let mut names = Vec::new();
        loop {
            match self.kind(p) {
                Some(TokenKind::Ident) => names.push(self.text(p).to_string()),
                Some(TokenKind::LeftBrace) | Some(TokenKind::LeftBracket) => {
                    return Err(self.syntax_error(p, "destructuring exports are not supported"));
                }
                _ => return Err(self.syntax_error(p, "expected binding name in export declaration")),
            }
            p += 1;

            let mut depth = 0usize;
            loop {
                let Some(token) = self.tokens.get(p) else {
                    return Ok(names);
                };
                if depth == 0 && line_break_ends_statement(self.tokens, p, self.source) {
                    return Ok(names);
                }
                match token.kind {
                    kind if kind.opens() => depth += 1,
                    kind if kind.closes() => {
                        if depth == 0 {
                            return Ok(names);
                        }
                        depth -= 1;
                    }
                    TokenKind::Semicolon if depth == 0 => return Ok(names),
                    TokenKind::Comma if depth == 0 => {
                        p += 1;
                        break;
                    }
                    _ => {}
                }
                p += 1;
            }
        }
    }

    fn function_name(&self, function: usize) -> Result<String, TransformError> {
        self.optional_function_name(function)
            .ok_or_else(|| self.syntax_error(function + 1, "expected function name"))
    }

    fn optional_function_name(&self, function: usize) -> Option<String> {
        let mut p = function + 1;
        if self.kind(p) == Some(TokenKind::Star) {
            p += 1;
        }
        match self.kind(p) {
            Some(TokenKind::Ident) => Some(self.text(p).to_string()),
            _ => None,
        }
    }

    // ----- require() calls -------------------------------------------------

    /// Record `require("literal")` written directly in the source
    fn record_require_call(&mut self) {
        let p = self.pos;
        if self.kind(p + 1) == Some(TokenKind::LeftParen)
            && self.kind(p + 2) == Some(TokenKind::Str)
            && self.kind(p + 3) == Some(TokenKind::RightParen)
        {
            let specifier = self.string(p + 2);
            self.add_specifier(specifier);
        }
    }

    // ----- output ------------------------------------------------------------

    fn place(&mut self, placement: Placement, line: String) {
        match placement {
            Placement::Prologue => self.prologue.push(line),
            Placement::Epilogue => self.epilogue.push(line),
        }
    }

    /// Remove the `export` keyword and continue lowering at `p`
    fn strip_keyword(&mut self, start: usize, p: usize) -> Result<(), TransformError> {
        let keyword_start = self.tokens[p].start;
        self.replace_until(start, keyword_start, "")
    }

    /// Replace `start..tokens[p].start` and resume at token `p`
    fn replace_until(&mut self, start: usize, end: usize, replacement: &str) -> Result<(), TransformError> {
        self.splice(start, end, replacement);
        self.pos = self
            .tokens
            .iter()
            .position(|t| t.start >= end)
            .unwrap_or(self.tokens.len());
        Ok(())
    }

    /// Replace tokens `self.pos..end_token` and resume after them
    fn replace_through(&mut self, start: usize, end_token: usize, replacement: &str) -> Result<(), TransformError> {
        let end = self.tokens[end_token - 1].end;
        self.splice(start, end, replacement);
        self.pos = end_token;
        Ok(())
    }

    /// Copy source up to `start`, emit `replacement`, skip to `end`.
    /// Line breaks in the replaced range are kept.
    fn splice(&mut self, start: usize, end: usize, replacement: &str) {
        self.out.push_str(&self.source[self.copied..start]);
        self.out.push_str(replacement);
        for _ in self.source[start..end].matches('\n') {
            self.out.push('\n');
        }
        self.copied = end;
    }

    fn add_specifier(&mut self, specifier: String) {
        self.specifiers.insert(specifier);
    }

    fn temp(&mut self) -> String {
        let name = format!("__knit_{}", self.temps);
        self.temps += 1;
        name
    }

    // ----- token helpers -------------------------------------------------------

    fn kind(&self, p: usize) -> Option<TokenKind> {
        self.tokens.get(p).map(|t| t.kind)
    }

    fn text(&self, p: usize) -> &'a str {
        self.tokens.get(p).map(|t| t.text(self.source)).unwrap_or("")
    }

    fn string(&self, p: usize) -> String {
        string_value(self.text(p))
    }

    /// Identifier or string-literal name
    fn name_at(&self, p: usize) -> String {
        match self.kind(p) {
            Some(TokenKind::Str) => self.string(p),
            _ => self.text(p).to_string(),
        }
    }

    fn is_word(&self, p: usize, word: &str) -> bool {
        self.kind(p) == Some(TokenKind::Ident) && self.text(p) == word
    }

    fn after_dot(&self, p: usize) -> bool {
        p > 0 && self.tokens[p - 1].kind == TokenKind::Dot
    }

    /// Position after an optional `;` at `p`
    fn statement_end(&self, p: usize) -> usize {
        if self.kind(p) == Some(TokenKind::Semicolon) {
            p + 1
        } else {
            p
        }
    }

    fn expect_word(&self, p: usize, word: &str, message: &str) -> Result<usize, TransformError> {
        if self.is_word(p, word) {
            Ok(p + 1)
        } else {
            Err(self.syntax_error(p, message))
        }
    }

    fn expect_ident(&self, p: usize, message: &str) -> Result<String, TransformError> {
        match self.kind(p) {
            Some(TokenKind::Ident) => Ok(self.text(p).to_string()),
            _ => Err(self.syntax_error(p, message)),
        }
    }

    fn expect_string(&self, p: usize, message: &str) -> Result<String, TransformError> {
        match self.kind(p) {
            Some(TokenKind::Str) => Ok(self.string(p)),
            _ => Err(self.syntax_error(p, message)),
        }
    }

    fn syntax_error(&self, p: usize, message: &str) -> TransformError {
        let offset = self
            .tokens
            .get(p)
            .map(|t| t.start)
            .unwrap_or(self.source.len());
        let (line, column) = position(self.source, offset);
        TransformError::Syntax {
            message: message.to_string(),
            line,
            column,
        }
    }
}

/// Byte offset just past any leading directives (`"use strict";`)
fn directive_end(tokens: &[Token]) -> usize {
    let mut offset = 0;
    let mut p = 0;
    while let Some(token) = tokens.get(p) {
        if token.kind != TokenKind::Str {
            break;
        }
        match tokens.get(p + 1) {
            Some(next) if next.kind == TokenKind::Semicolon => {
                offset = next.end;
                p += 2;
            }
            Some(next) if next.newline_before => {
                offset = token.end;
                p += 1;
            }
            None => {
                offset = token.end;
                p += 1;
            }
            _ => break,
        }
    }
    offset
}

/// JSON string literal, valid as a script string literal
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// `.name` for identifiers, `["name"]` otherwise
fn member(name: &str) -> String {
    let mut chars = name.chars();
    let is_identifier = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if is_identifier {
        format!(".{}", name)
    } else {
        format!("[{}]", quote(name))
    }
}
