//! Type syntax erasure
//!
//! Overwrites the type-level syntax of the typed dialect with spaces so that
//! every remaining token keeps its line and column. Only syntax without
//! runtime meaning is erased. Declarations that would have to generate code
//! (enums, namespaces, parameter properties, `import x = require(...)`) are
//! rejected.

use rustc_hash::FxHashSet;

use super::lexer::{ends_value, line_break_ends_statement, position, Token, TokenKind};
use super::TransformError;

/// Keywords after which `(` does not open a parameter list
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "with", "case", "return", "typeof", "void", "delete", "throw",
    "new", "await", "yield", "in", "of", "instanceof", "do", "else",
];

/// Modifiers that only exist in the typed dialect
const TYPE_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "override", "declare", "abstract",
];

/// Class member modifiers of plain scripts
const MEMBER_MODIFIERS: &[&str] = &["static", "async", "get", "set", "accessor"];

/// Ambient declarations that end with their `{ ... }` body
const BLOCK_DECLARATIONS: &[&str] = &[
    "class", "module", "namespace", "global", "enum", "interface", "abstract",
];

/// Prefix operators of type expressions
const TYPE_PREFIXES: &[&str] = &[
    "keyof", "typeof", "unique", "readonly", "infer", "asserts", "abstract", "new",
];

/// Erase type annotations, type declarations and type-only modifiers
pub(super) fn strip_types(source: &str, tokens: &[Token]) -> Result<String, TransformError> {
    let mut stripper = Stripper::new(source, tokens);
    let mut p = 0;
    while p < tokens.len() {
        p = stripper.step(p)?;
    }
    Ok(stripper.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    /// Statement block, object literal or the top level
    Block,
    ClassBody,
    Params,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    group: Group,
    /// Index of the opening bracket
    open: usize,
    /// Inside a `const`/`let`/`var` declarator list
    declaring: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Declarator,
    Parameter,
}

enum Declaration {
    /// The whole declaration, up to the given token, has no runtime meaning
    Erased(usize),
    /// A modifier was erased; scanning continues at the given token
    Continue(usize),
}

struct Stripper<'a> {
    source: &'a str,
    tokens: &'a [Token],
    stack: Vec<Frame>,
    /// `(` tokens known to open a parameter list
    params: FxHashSet<usize>,
    /// `{` tokens known to open a class body
    class_bodies: FxHashSet<usize>,
    /// Erased byte ranges
    blanks: Vec<(usize, usize)>,
}

impl<'a> Stripper<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            source,
            tokens,
            stack: vec![Frame {
                group: Group::Block,
                open: 0,
                declaring: false,
            }],
            params: FxHashSet::default(),
            class_bodies: FxHashSet::default(),
            blanks: Vec::new(),
        }
    }

    /// Process the token at `p` and return the next token to look at
    fn step(&mut self, p: usize) -> Result<usize, TransformError> {
        let token = self.tokens[p];
        if self.top().declaring
            && (token.kind == TokenKind::Semicolon
                || line_break_ends_statement(self.tokens, p, self.source))
        {
            self.top_mut().declaring = false;
        }

        if self.top().group == Group::ClassBody && self.at_member_start(p) {
            if let Some(next) = self.member(p)? {
                return Ok(next);
            }
        }

        match token.kind {
            kind if kind.opens() => return self.open(p),
            kind if kind.closes() => return Ok(self.close(p)),
            TokenKind::Comma if self.top().declaring => {
                return self.binding(p + 1, Binding::Declarator)
            }
            TokenKind::Comma if self.top().group == Group::Params => {
                return self.binding(p + 1, Binding::Parameter)
            }
            _ => {}
        }
        if self.at_statement_start(p) {
            match self.declaration(p)? {
                Some(Declaration::Erased(end)) => {
                    self.blank(p, end);
                    return Ok(end);
                }
                Some(Declaration::Continue(next)) => return Ok(next),
                None => {}
            }
        }

        match token.kind {
            TokenKind::Ident if !self.after_dot(p) => self.word(p),
            TokenKind::Punct => Ok(self.punct(p)),
            _ => Ok(p + 1),
        }
    }

    fn finish(mut self) -> String {
        self.blanks.sort_unstable();
        let mut out = String::with_capacity(self.source.len());
        let mut copied = 0;
        for (start, end) in self.blanks {
            let start = start.max(copied);
            if end <= start {
                continue;
            }
            out.push_str(&self.source[copied..start]);
            out.extend(
                self.source[start..end]
                    .chars()
                    .map(|c| if c == '\n' || c == '\r' { c } else { ' ' }),
            );
            copied = end;
        }
        out.push_str(&self.source[copied..]);
        out
    }

    // ----- groups ------------------------------------------------------------

    fn open(&mut self, p: usize) -> Result<usize, TransformError> {
        let group = match self.tokens[p].kind {
            TokenKind::LeftBrace if self.class_bodies.contains(&p) => Group::ClassBody,
            TokenKind::LeftBrace => Group::Block,
            TokenKind::LeftParen
                if self.params.contains(&p) || self.is_parameter_list(p, p.checked_sub(1)) =>
            {
                Group::Params
            }
            _ => Group::Other,
        };
        self.stack.push(Frame {
            group,
            open: p,
            declaring: false,
        });
        if group == Group::Params {
            return self.binding(p + 1, Binding::Parameter);
        }
        Ok(p + 1)
    }

    /// Pop the group closed at `p`; a parameter list may carry a return type
    fn close(&mut self, p: usize) -> usize {
        let frame = if self.stack.len() > 1 { self.stack.pop() } else { None };
        if frame.is_some_and(|f| f.group == Group::Params) && self.is_punct(p + 1, ":") {
            let end = self.skip_type(p + 2);
            self.blank(p + 1, end);
            return end;
        }
        p + 1
    }

    /// Whether the `(` at `open` starts a function's parameters. `name` is the
    /// token naming a method, if any.
    fn is_parameter_list(&self, open: usize, name: Option<usize>) -> bool {
        let Some(close) = self.matching(open) else {
            return false;
        };
        let mut after = close + 1;
        if self.is_arrow(after) {
            return true;
        }
        if self.is_punct(after, ":") {
            after = self.skip_type(after + 1);
            if self.is_arrow(after) {
                return true;
            }
        }
        self.kind(after) == Some(TokenKind::LeftBrace) && name.is_some_and(|n| self.is_method_name(n))
    }

    fn is_method_name(&self, n: usize) -> bool {
        match self.kind(n) {
            Some(TokenKind::Ident) => !CONTROL_KEYWORDS.contains(&self.text(n)),
            Some(TokenKind::Str | TokenKind::Number | TokenKind::RightBracket) => true,
            _ => false,
        }
    }

    // ----- bindings ----------------------------------------------------------

    /// A declarator or parameter starting at `p`: erase its `?`/`!` marker and
    /// its annotation
    fn binding(&mut self, mut p: usize, binding: Binding) -> Result<usize, TransformError> {
        if binding == Binding::Parameter {
            // function (this: Window, event) { ... }
            if self.is_word(p, "this") && self.is_punct(p + 1, ":") {
                let mut end = self.skip_type(p + 2);
                if self.kind(end) == Some(TokenKind::Comma) {
                    end += 1;
                }
                self.blank(p, end);
                return self.binding(end, binding);
            }
            if self.kind(p) == Some(TokenKind::Ident)
                && TYPE_MODIFIERS.contains(&self.text(p))
                && self.starts_binding(p + 1)
            {
                return Err(self.unsupported(p, "parameter properties"));
            }
            while self.kind(p) == Some(TokenKind::Dot) {
                p += 1;
            }
        }

        p = match self.kind(p) {
            Some(TokenKind::Ident) => p + 1,
            Some(TokenKind::LeftBrace | TokenKind::LeftBracket) => match self.matching(p) {
                Some(close) => close + 1,
                None => return Ok(p),
            },
            _ => return Ok(p),
        };

        let marker = match binding {
            Binding::Parameter => "?",
            Binding::Declarator => "!",
        };
        let optional = binding == Binding::Parameter
            && matches!(self.kind(p + 1), Some(TokenKind::Comma | TokenKind::RightParen));
        if self.is_punct(p, marker) && (self.is_punct(p + 1, ":") || optional) {
            self.blank(p, p + 1);
            p += 1;
        }

        if self.is_punct(p, ":") {
            let end = self.skip_type(p + 1);
            self.blank(p, end);
            p = end;
        }
        Ok(p)
    }

    fn starts_binding(&self, p: usize) -> bool {
        matches!(
            self.kind(p),
            Some(TokenKind::Ident | TokenKind::LeftBrace | TokenKind::LeftBracket)
        )
    }

    // ----- statements --------------------------------------------------------

    fn at_statement_start(&self, p: usize) -> bool {
        if self.top().group != Group::Block {
            return false;
        }
        match p.checked_sub(1).and_then(|i| self.kind(i)) {
            None => true,
            Some(TokenKind::Semicolon | TokenKind::LeftBrace | TokenKind::RightBrace) => true,
            Some(_) => line_break_ends_statement(self.tokens, p, self.source),
        }
    }

    fn declaration(&mut self, p: usize) -> Result<Option<Declaration>, TransformError> {
        if self.kind(p) != Some(TokenKind::Ident) {
            return Ok(None);
        }
        let named = self.kind(p + 1) == Some(TokenKind::Ident) && !self.newline_before(p + 1);

        let declaration = match self.text(p) {
            "interface" if named => Declaration::Erased(self.statement_end(p, true)),
            "type" if named && (self.is_punct(p + 2, "=") || self.is_punct(p + 2, "<")) => {
                Declaration::Erased(self.type_alias_end(p))
            }
            "declare" if named => {
                let braced = BLOCK_DECLARATIONS.contains(&self.text(p + 1));
                Declaration::Erased(self.statement_end(p, braced))
            }
            "abstract" if named && self.is_word(p + 1, "class") => {
                self.blank(p, p + 1);
                Declaration::Continue(p + 1)
            }
            "enum" if named => return Err(self.unsupported(p, "enum declarations")),
            "const" if self.is_word(p + 1, "enum") => {
                return Err(self.unsupported(p, "enum declarations"))
            }
            "namespace" if named => return Err(self.unsupported(p, "namespace declarations")),
            "module"
                if named
                    || (self.kind(p + 1) == Some(TokenKind::Str) && !self.newline_before(p + 1)) =>
            {
                return Err(self.unsupported(p, "namespace declarations"))
            }
            _ => return Ok(None),
        };
        Ok(Some(declaration))
    }

    /// `type Name<T> = ...;`, `p` at `type`
    fn type_alias_end(&self, p: usize) -> usize {
        let mut q = p + 2;
        if self.is_punct(q, "<") {
            q = self.angle_close(q, false).map_or(q + 1, |close| close + 1);
        }
        if self.is_punct(q, "=") {
            q = self.skip_type(q + 1);
        }
        if self.kind(q) == Some(TokenKind::Semicolon) {
            q += 1;
        }
        q
    }

    /// End of the statement or member starting at `start`: after its `;`,
    /// before a line break that ends it, or after its `{ ... }` body when
    /// `braced`
    fn statement_end(&self, start: usize, braced: bool) -> usize {
        let mut depth = 0usize;
        let mut q = start;
        while let Some(token) = self.tokens.get(q) {
            if q > start && depth == 0 && line_break_ends_statement(self.tokens, q, self.source) {
                return q;
            }
            match token.kind {
                kind if kind.opens() => depth += 1,
                kind if kind.closes() => {
                    if depth == 0 {
                        return q;
                    }
                    depth -= 1;
                    if depth == 0 && braced && kind == TokenKind::RightBrace {
                        return q + 1;
                    }
                }
                TokenKind::Semicolon if depth == 0 => return q + 1,
                _ => {}
            }
            q += 1;
        }
        q
    }

    fn word(&mut self, p: usize) -> Result<usize, TransformError> {
        match self.text(p) {
            "const" | "let" | "var" if self.starts_binding(p + 1) => {
                self.top_mut().declaring = true;
                self.binding(p + 1, Binding::Declarator)
            }
            "function" => Ok(self.function(p)),
            "class" => Ok(self.class_heading(p)),
            "as" | "satisfies" if self.is_type_operator(p) => {
                let end = self.skip_type(p + 1);
                self.blank(p, end);
                Ok(end)
            }
            "import"
                if !matches!(
                    self.kind(p + 1),
                    Some(TokenKind::LeftParen) | Some(TokenKind::Dot)
                ) =>
            {
                self.import(p)
            }
            "export" => self.export(p),
            _ => Ok(p + 1),
        }
    }

    /// `x as T` and `x satisfies T`
    fn is_type_operator(&self, p: usize) -> bool {
        let Some(prev) = p.checked_sub(1).map(|i| self.tokens[i]) else {
            return false;
        };
        !self.newline_before(p)
            && (ends_value(&prev, self.source) || prev.kind == TokenKind::RightBrace)
            && self.starts_type(p + 1)
    }

    /// Skip an import declaration; its clause is lowered later
    fn import(&mut self, p: usize) -> Result<usize, TransformError> {
        let mut q = p + 1;
        if self.is_word(q, "type") && self.kind(q + 1) == Some(TokenKind::Ident) {
            q += 1;
        }
        if self.kind(q) == Some(TokenKind::Ident) && self.is_punct(q + 1, "=") {
            return Err(self.unsupported(p, "`import ... = require(...)` declarations"));
        }
        while let Some(token) = self.tokens.get(q) {
            match token.kind {
                TokenKind::Str | TokenKind::Semicolon => return Ok(q + 1),
                kind if kind.opens() => q = self.after_group(q),
                _ => q += 1,
            }
        }
        Ok(q)
    }

    fn export(&mut self, p: usize) -> Result<usize, TransformError> {
        let mut q = p + 1;
        if self.is_word(q, "type")
            && matches!(self.kind(q + 1), Some(TokenKind::LeftBrace) | Some(TokenKind::Star))
        {
            q += 1;
        }
        match self.kind(q) {
            Some(TokenKind::LeftBrace) => return Ok(self.reexport_end(self.after_group(q))),
            Some(TokenKind::Star) => return Ok(self.reexport_end(q + 1)),
            _ => {}
        }
        if self.is_punct(q, "=") {
            return Err(self.unsupported(p, "`export =` assignments"));
        }
        if self.is_word(q, "import") {
            return Err(self.unsupported(p, "`export import` declarations"));
        }
        if self.is_word(q, "default") {
            q += 1;
        }
        match self.declaration(q)? {
            Some(Declaration::Erased(end)) => {
                self.blank(p, end);
                Ok(end)
            }
            Some(Declaration::Continue(next)) => Ok(next),
            None => Ok(q),
        }
    }

    /// Skip `as name` and `from "x"` after an export clause
    fn reexport_end(&self, mut q: usize) -> usize {
        if self.is_word(q, "as") {
            q += 2;
        }
        if self.is_word(q, "from") && self.kind(q + 1) == Some(TokenKind::Str) {
            q += 2;
        }
        q
    }

    // ----- functions and classes ---------------------------------------------

    /// `function name<T>(...)`: erase type parameters and register the
    /// parameter list. A signature without a body is erased whole.
    fn function(&mut self, p: usize) -> usize {
        let mut q = p + 1;
        if self.kind(q) == Some(TokenKind::Star) {
            q += 1;
        }
        if self.kind(q) == Some(TokenKind::Ident) {
            q += 1;
        }
        if self.is_punct(q, "<") {
            if let Some(close) = self.angle_close(q, false) {
                self.blank(q, close + 1);
                q = close + 1;
            }
        }
        if self.kind(q) != Some(TokenKind::LeftParen) {
            return q;
        }
        let Some(close) = self.matching(q) else {
            return q;
        };

        let mut end = close + 1;
        if self.is_punct(end, ":") {
            end = self.skip_type(end + 1);
        }
        if self.kind(end) == Some(TokenKind::LeftBrace) {
            self.params.insert(q);
            return q;
        }

        // overload signature
        let mut start = p;
        while start > 0
            && self.kind(start - 1) == Some(TokenKind::Ident)
            && matches!(self.text(start - 1), "async" | "export" | "default" | "declare")
        {
            start -= 1;
        }
        if self.kind(end) == Some(TokenKind::Semicolon) {
            end += 1;
        }
        self.blank(start, end);
        end
    }

    /// Erase type parameters, type arguments of the base class and the
    /// `implements` clause. Returns the index of the class body.
    fn class_heading(&mut self, p: usize) -> usize {
        let mut q = p + 1;
        let is_class = matches!(self.kind(q), Some(TokenKind::Ident | TokenKind::LeftBrace))
            || self.is_punct(q, "<");
        if !is_class {
            return q;
        }
        if self.kind(q) == Some(TokenKind::Ident)
            && !self.is_word(q, "extends")
            && !self.is_word(q, "implements")
        {
            q += 1;
        }

        let mut depth = 0usize;
        while let Some(token) = self.tokens.get(q) {
            match token.kind {
                TokenKind::LeftBrace if depth == 0 => {
                    self.class_bodies.insert(q);
                    return q;
                }
                kind if kind.opens() => depth += 1,
                kind if kind.closes() => {
                    if depth == 0 {
                        return q;
                    }
                    depth -= 1;
                }
                TokenKind::Punct if depth == 0 && self.is_punct(q, "<") => {
                    if let Some(close) = self.angle_close(q, false) {
                        self.blank(q, close + 1);
                        q = close + 1;
                        continue;
                    }
                }
                TokenKind::Ident if depth == 0 && self.is_word(q, "implements") => {
                    let body = self.class_body(q);
                    self.blank(q, body);
                    q = body;
                    continue;
                }
                _ => {}
            }
            q += 1;
        }
        q
    }

    /// Index of the `{` opening the class body after an `implements` clause
    fn class_body(&self, mut q: usize) -> usize {
        while let Some(token) = self.tokens.get(q) {
            if token.kind == TokenKind::LeftBrace {
                return q;
            }
            q = match self.is_punct(q, "<").then(|| self.angle_close(q, false)).flatten() {
                Some(close) => close + 1,
                None => q + 1,
            };
        }
        q
    }

    fn at_member_start(&self, p: usize) -> bool {
        p == self.top().open + 1
            || matches!(
                self.kind(p - 1),
                Some(TokenKind::Semicolon | TokenKind::RightBrace)
            )
            || line_break_ends_statement(self.tokens, p, self.source)
    }

    /// A class member starting at `start`
    fn member(&mut self, start: usize) -> Result<Option<usize>, TransformError> {
        let mut p = start;
        let mut ambient = false;
        while self.kind(p) == Some(TokenKind::Ident) && self.is_modifier(p) {
            let word = self.text(p);
            if TYPE_MODIFIERS.contains(&word) {
                ambient |= word == "abstract" || word == "declare";
                self.blank(p, p + 1);
            }
            p += 1;
        }

        // abstract and ambient members, index signatures
        let signature = self.kind(p) == Some(TokenKind::LeftBracket)
            && self.kind(p + 1) == Some(TokenKind::Ident)
            && self.is_punct(p + 2, ":");
        if ambient || signature {
            let end = self.statement_end(start, false);
            self.blank(start, end);
            return Ok(Some(end));
        }

        if self.kind(p) == Some(TokenKind::Star) {
            p += 1;
        }
        p = match self.kind(p) {
            Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number) => p + 1,
            Some(TokenKind::Punct) if self.is_punct(p, "#") => p + 2,
            Some(TokenKind::LeftBracket) => self.after_group(p),
            _ => return Ok((p > start).then_some(p)),
        };

        if self.is_punct(p, "?") || self.is_punct(p, "!") {
            self.blank(p, p + 1);
            p += 1;
        }
        if self.is_punct(p, "<") {
            if let Some(close) = self.angle_close(p, false) {
                self.blank(p, close + 1);
                p = close + 1;
            }
        }

        match self.kind(p) {
            Some(TokenKind::LeftParen) => {
                let Some(close) = self.matching(p) else {
                    return Ok(Some(p));
                };
                let mut end = close + 1;
                if self.is_punct(end, ":") {
                    end = self.skip_type(end + 1);
                }
                if self.kind(end) == Some(TokenKind::LeftBrace) {
                    self.params.insert(p);
                    return Ok(Some(p));
                }
                // overload signature
                let end = self.statement_end(start, false);
                self.blank(start, end);
                Ok(Some(end))
            }
            Some(TokenKind::Punct) if self.is_punct(p, ":") => {
                let end = self.skip_type(p + 1);
                self.blank(p, end);
                Ok(Some(end))
            }
            _ => Ok(Some(p)),
        }
    }

    fn is_modifier(&self, p: usize) -> bool {
        let word = self.text(p);
        if !TYPE_MODIFIERS.contains(&word) && !MEMBER_MODIFIERS.contains(&word) {
            return false;
        }
        !self.newline_before(p + 1)
            && (matches!(
                self.kind(p + 1),
                Some(
                    TokenKind::Ident
                        | TokenKind::Str
                        | TokenKind::Number
                        | TokenKind::LeftBracket
                        | TokenKind::Star
                )
            ) || self.is_punct(p + 1, "#"))
    }

    // ----- expressions -------------------------------------------------------

    fn punct(&mut self, p: usize) -> usize {
        match self.text(p) {
            "!" if self.is_non_null(p) => {
                self.blank(p, p + 1);
                p + 1
            }
            "<" => self.type_arguments(p),
            _ => p + 1,
        }
    }

    /// Postfix `x!`
    fn is_non_null(&self, p: usize) -> bool {
        let Some(prev) = p.checked_sub(1).map(|i| self.tokens[i]) else {
            return false;
        };
        let token = self.tokens[p];
        let inequality = self
            .tokens
            .get(p + 1)
            .is_some_and(|next| next.start == token.end && self.is_punct(p + 1, "="));
        prev.end == token.start && ends_value(&prev, self.source) && !inequality
    }

    /// `f<T>(x)`, `new Map<K, V>()` and generic arrows `<T>(x: T) => x`
    fn type_arguments(&mut self, p: usize) -> usize {
        let Some(close) = self.angle_close(p, true) else {
            return p + 1;
        };
        let next = close + 1;
        let name = p
            .checked_sub(1)
            .filter(|&i| self.kind(i) == Some(TokenKind::Ident) && ends_value(&self.tokens[i], self.source));

        let applies = match name {
            Some(_) => matches!(
                self.kind(next),
                Some(TokenKind::LeftParen) | Some(TokenKind::Template)
            ),
            None => self.kind(next) == Some(TokenKind::LeftParen) && self.is_parameter_list(next, None),
        };
        if !applies {
            return p + 1;
        }

        self.blank(p, close + 1);
        if self.kind(next) == Some(TokenKind::LeftParen) && self.is_parameter_list(next, name) {
            self.params.insert(next);
        }
        next
    }

    // ----- types -------------------------------------------------------------

    /// Index of the first token after the type starting at `p`
    fn skip_type(&self, mut p: usize) -> usize {
        if self.is_type_operator_punct(p) {
            p += 1;
        }
        loop {
            let end = self.skip_type_operand(p);
            if end == p {
                return p;
            }
            p = end;
            if self.is_type_operator_punct(p) {
                p += 1;
                continue;
            }
            // T extends U ? X : Y
            if self.is_word(p, "extends") && !self.newline_before(p) {
                let check = self.skip_type(p + 1);
                if self.is_punct(check, "?") {
                    let then = self.skip_type(check + 1);
                    if self.is_punct(then, ":") {
                        return self.skip_type(then + 1);
                    }
                }
            }
            return p;
        }
    }

    fn skip_type_operand(&self, mut p: usize) -> usize {
        while self.kind(p) == Some(TokenKind::Ident)
            && TYPE_PREFIXES.contains(&self.text(p))
            && self.starts_type(p + 1)
            && !self.newline_before(p + 1)
        {
            p += 1;
        }

        // generic function type
        if self.is_punct(p, "<") {
            match self.angle_close(p, false) {
                Some(close) => p = close + 1,
                None => return p,
            }
        }

        let mut end = match self.kind(p) {
            Some(TokenKind::Ident) => {
                let mut q = p + 1;
                while self.kind(q) == Some(TokenKind::Dot) && self.kind(q + 1) == Some(TokenKind::Ident) {
                    q += 2;
                }
                if self.is_punct(q, "<") {
                    if let Some(close) = self.angle_close(q, false) {
                        q = close + 1;
                    }
                }
                // type predicate `x is T`
                if self.is_word(q, "is") && !self.newline_before(q) {
                    return self.skip_type(q + 1);
                }
                q
            }
            Some(TokenKind::Str | TokenKind::Number | TokenKind::Template) => p + 1,
            Some(TokenKind::Punct)
                if self.is_punct(p, "-") && self.kind(p + 1) == Some(TokenKind::Number) =>
            {
                p + 2
            }
            Some(TokenKind::LeftBrace | TokenKind::LeftBracket) => self.after_group(p),
            Some(TokenKind::LeftParen) => {
                let after = self.after_group(p);
                if self.is_arrow(after) {
                    return self.skip_type(after + 2);
                }
                after
            }
            _ => return p,
        };

        // T[] and T[K]
        while self.kind(end) == Some(TokenKind::LeftBracket) && !self.newline_before(end) {
            end = self.after_group(end);
        }
        end
    }

    fn starts_type(&self, p: usize) -> bool {
        match self.kind(p) {
            Some(
                TokenKind::Ident
                | TokenKind::Str
                | TokenKind::Number
                | TokenKind::Template
                | TokenKind::LeftBrace
                | TokenKind::LeftBracket
                | TokenKind::LeftParen,
            ) => true,
            Some(TokenKind::Punct) => self.is_punct(p, "<") || self.is_punct(p, "-"),
            _ => false,
        }
    }

    /// The `>` matching the `<` at `open`. In expression position (`strict`)
    /// the contents must not look like a comparison.
    fn angle_close(&self, open: usize, strict: bool) -> Option<usize> {
        let mut angles = 0usize;
        let mut depth = 0usize;
        for (q, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::Punct => match token.text(self.source) {
                    "<" => angles += 1,
                    ">" if self.is_arrow_head(q) => {}
                    ">" => {
                        angles -= 1;
                        if angles == 0 {
                            return Some(q);
                        }
                    }
                    "|" | "&" if self.is_doubled(q) => return None,
                    "?" | ":" if strict && depth == 0 => return None,
                    "=" if strict && depth == 0 && !self.is_arrow(q) => return None,
                    "|" | "&" | "-" | "?" | ":" | "=" => {}
                    _ => return None,
                },
                kind if kind.opens() => depth += 1,
                kind if kind.closes() => {
                    if depth == 0 {
                        return None;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => return None,
                TokenKind::Slash | TokenKind::Regex | TokenKind::Star => return None,
                _ => {}
            }
        }
        None
    }

    fn is_type_operator_punct(&self, p: usize) -> bool {
        (self.is_punct(p, "|") || self.is_punct(p, "&")) && !self.is_doubled(p)
    }

    /// `||` or `&&`
    fn is_doubled(&self, p: usize) -> bool {
        let text = self.text(p);
        let same = |q: usize| self.kind(q) == Some(TokenKind::Punct) && self.text(q) == text;
        (same(p + 1) && self.tokens[p].end == self.tokens[p + 1].start)
            || (p > 0 && same(p - 1) && self.tokens[p - 1].end == self.tokens[p].start)
    }

    /// `=>` starting at `p`
    fn is_arrow(&self, p: usize) -> bool {
        self.is_punct(p, "=")
            && self.is_punct(p + 1, ">")
            && self.tokens[p].end == self.tokens[p + 1].start
            && !self.newline_before(p)
    }

    /// `>` completing a `=>`
    fn is_arrow_head(&self, p: usize) -> bool {
        p > 0 && self.is_arrow(p - 1)
    }

    // ----- helpers -----------------------------------------------------------

    fn blank(&mut self, start: usize, end: usize) {
        let end = end.min(self.tokens.len());
        if end > start {
            self.blanks.push((self.tokens[start].start, self.tokens[end - 1].end));
        }
    }

    fn matching(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (q, token) in self.tokens.iter().enumerate().skip(open) {
            if token.kind.opens() {
                depth += 1;
            } else if token.kind.closes() {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(q);
                }
            }
        }
        None
    }

    /// Index after the bracketed group opened at `p`
    fn after_group(&self, p: usize) -> usize {
        self.matching(p).map_or(self.tokens.len(), |close| close + 1)
    }

    fn top(&self) -> &Frame {
        &self.stack[self.stack.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn kind(&self, p: usize) -> Option<TokenKind> {
        self.tokens.get(p).map(|t| t.kind)
    }

    fn text(&self, p: usize) -> &'a str {
        self.tokens.get(p).map(|t| t.text(self.source)).unwrap_or("")
    }

    fn is_word(&self, p: usize, word: &str) -> bool {
        self.kind(p) == Some(TokenKind::Ident) && self.text(p) == word
    }

    fn is_punct(&self, p: usize, punct: &str) -> bool {
        self.kind(p) == Some(TokenKind::Punct) && self.text(p) == punct
    }

    fn newline_before(&self, p: usize) -> bool {
        self.tokens.get(p).is_some_and(|t| t.newline_before)
    }

    fn after_dot(&self, p: usize) -> bool {
        p > 0 && self.tokens[p - 1].kind == TokenKind::Dot
    }

    fn unsupported(&self, p: usize, what: &str) -> TransformError {
        let (line, column) = position(self.source, self.tokens[p].start);
        TransformError::Syntax {
            message: format!("{} are not supported in the typed dialect", what),
            line,
            column,
        }
    }
}
