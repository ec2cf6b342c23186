//! Lexer for module lowering
//!
//! Produces the significant tokens of a script (trivia dropped) with byte
//! spans into the original text. Only as much structure is recognised as
//! module lowering needs: strings, templates, regular expressions, comments
//! and brackets are delimited exactly so that module syntax is never matched
//! inside them.

use logos::{Lexer, Logos};

use super::TransformError;

/// Raw token produced by logos. Trivia is kept so the driver can track
/// line breaks.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum LogosToken {
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", lex_block_comment)]
    BlockComment,

    #[regex(r#""([^"\\\n]|\\(.|\n))*""#)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*'"#)]
    Str,

    #[token("`", lex_template)]
    Template,

    #[regex(r"[A-Za-z_$\u{80}-\u{10FFFF}][A-Za-z0-9_$\u{80}-\u{10FFFF}]*")]
    Ident,

    #[regex(r"[0-9][0-9A-Za-z_]*")]
    Number,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token("*")]
    Star,

    #[token(".")]
    Dot,

    #[token("/")]
    Slash,

    #[regex(r"[-+%=<>!&|^~?:@#\\]")]
    Punct,
}

fn lex_block_comment(lex: &mut Lexer<'_, LogosToken>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

fn lex_template(lex: &mut Lexer<'_, LogosToken>) -> bool {
    match scan_template(lex.remainder()) {
        Some(len) => {
            lex.bump(len);
            true
        }
        None => false,
    }
}

/// Kind of a significant token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TokenKind {
    Ident,
    Str,
    Template,
    Regex,
    Number,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Star,
    Dot,
    Slash,
    Punct,
}

impl TokenKind {
    pub(super) fn opens(self) -> bool {
        matches!(self, TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket)
    }

    pub(super) fn closes(self) -> bool {
        matches!(self, TokenKind::RightBrace | TokenKind::RightParen | TokenKind::RightBracket)
    }
}

/// A significant token with its byte span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
}

impl Token {
    pub(super) fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start..self.end]
    }
}

/// Keywords after which a `/` starts a regular expression
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Tokenize `source`, dropping whitespace and comments
pub(super) fn tokenize(source: &str) -> Result<Vec<Token>, TransformError> {
    let mut lex = LogosToken::lexer(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut newline_before = false;

    while let Some(result) = lex.next() {
        let span = lex.span();
        let kind = match result {
            Ok(LogosToken::Whitespace | LogosToken::LineComment | LogosToken::BlockComment) => {
                newline_before |= lex.slice().contains('\n');
                continue;
            }
            Ok(LogosToken::Slash) if regex_allowed(&tokens, source) => {
                let len = scan_regex(lex.remainder())
                    .ok_or_else(|| lex_error(source, span.start, "unterminated regular expression"))?;
                lex.bump(len);
                TokenKind::Regex
            }
            Ok(token) => convert(token),
            Err(()) => return Err(unexpected(source, span.start)),
        };

        tokens.push(Token {
            kind,
            start: span.start,
            end: lex.span().end,
            newline_before,
        });
        newline_before = false;
    }

    Ok(tokens)
}

fn convert(token: LogosToken) -> TokenKind {
    match token {
        LogosToken::Str => TokenKind::Str,
        LogosToken::Template => TokenKind::Template,
        LogosToken::Ident => TokenKind::Ident,
        LogosToken::Number => TokenKind::Number,
        LogosToken::LeftBrace => TokenKind::LeftBrace,
        LogosToken::RightBrace => TokenKind::RightBrace,
        LogosToken::LeftParen => TokenKind::LeftParen,
        LogosToken::RightParen => TokenKind::RightParen,
        LogosToken::LeftBracket => TokenKind::LeftBracket,
        LogosToken::RightBracket => TokenKind::RightBracket,
        LogosToken::Comma => TokenKind::Comma,
        LogosToken::Semicolon => TokenKind::Semicolon,
        LogosToken::Star => TokenKind::Star,
        LogosToken::Dot => TokenKind::Dot,
        LogosToken::Slash => TokenKind::Slash,
        LogosToken::Punct
        | LogosToken::Whitespace
        | LogosToken::LineComment
        | LogosToken::BlockComment => TokenKind::Punct,
    }
}

/// Keywords that continue an expression onto the next line
const BINARY_KEYWORDS: &[&str] = &["in", "instanceof", "of", "as", "satisfies"];

/// Whether a `/` after the tokens lexed so far begins a regular expression
/// rather than a division
fn regex_allowed(tokens: &[Token], source: &str) -> bool {
    match tokens.last() {
        Some(prev) => !ends_value(prev, source) && !ends_with_postfix_update(tokens, source),
        None => true,
    }
}

/// `a++` or `a--`: the operator is written directly after an operand on the
/// same line
fn ends_with_postfix_update(tokens: &[Token], source: &str) -> bool {
    let [.., operand, first, second] = tokens else {
        return false;
    };
    let op = second.text(source);
    (op == "+" || op == "-")
        && first.text(source) == op
        && first.end == second.start
        && !first.newline_before
        && ends_value(operand, source)
}

/// Whether `token` can be the last token of an operand
pub(super) fn ends_value(token: &Token, source: &str) -> bool {
    match token.kind {
        TokenKind::Ident => !REGEX_PREFIX_KEYWORDS.contains(&token.text(source)),
        TokenKind::Number
        | TokenKind::Str
        | TokenKind::Template
        | TokenKind::Regex
        | TokenKind::RightParen
        | TokenKind::RightBracket => true,
        _ => false,
    }
}

/// Whether the line break before `tokens[p]` ends the current statement:
/// the previous token completes an expression and `tokens[p]` cannot
/// continue it
pub(super) fn line_break_ends_statement(tokens: &[Token], p: usize, source: &str) -> bool {
    let (Some(prev), Some(token)) = (p.checked_sub(1).and_then(|i| tokens.get(i)), tokens.get(p)) else {
        return false;
    };
    if !token.newline_before {
        return false;
    }
    let completes = ends_value(prev, source) || prev.kind == TokenKind::RightBrace;
    let starts = match token.kind {
        TokenKind::Ident => !BINARY_KEYWORDS.contains(&token.text(source)),
        TokenKind::Number | TokenKind::Str | TokenKind::LeftBrace => true,
        _ => false,
    };
    completes && starts
}

/// Length of a template literal body, `rest` starting just after the opening
/// backtick. Includes the closing backtick.
fn scan_template(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i += 2;
                i += scan_substitution(&rest[i..])?;
            }
            _ => i += 1,
        }
    }
    None
}

/// Length of a `${ ... }` substitution, `rest` starting after `${`. Includes
/// the closing brace.
fn scan_substitution(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return Some(i + 1);
                }
                depth -= 1;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                i += scan_quoted(&rest[i..], quote)?;
                continue;
            }
            b'`' => {
                i += 1;
                i += scan_template(&rest[i..])?;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i += rest[i..].find('\n')?;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += rest[i..].find("*/")? + 2;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Length of a quoted string body including the closing quote
fn scan_quoted(rest: &str, quote: u8) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Length of a regular expression literal after its opening slash, including
/// the closing slash and flags
fn scan_regex(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut in_class = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
    None
}

/// 1-based line and column of a byte offset
pub(super) fn position(source: &str, offset: usize) -> (u32, u32) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(idx) => before[idx + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line as u32, column as u32)
}

fn lex_error(source: &str, offset: usize, message: &str) -> TransformError {
    let (line, column) = position(source, offset);
    TransformError::Lex {
        message: message.to_string(),
        line,
        column,
    }
}

fn unexpected(source: &str, offset: usize) -> TransformError {
    let message = match source[offset..].chars().next() {
        Some('"') | Some('\'') => "unterminated string literal".to_string(),
        Some('`') => "unterminated template literal".to_string(),
        Some('/') => "unterminated block comment".to_string(),
        Some(c) => format!("unexpected character '{}'", c),
        None => "unexpected end of input".to_string(),
    };
    lex_error(source, offset, &message)
}

/// Value of a string literal token (quotes removed, escapes decoded)
pub(super) fn string_value(raw: &str) -> String {
    let inner = &raw[1..raw.len().saturating_sub(1).max(1)];
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some('r') => value.push('\r'),
            Some('b') => value.push('\u{8}'),
            Some('f') => value.push('\u{c}'),
            Some('v') => value.push('\u{b}'),
            Some('0') => value.push('\0'),
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    value.push(c);
                }
            }
            Some('u') => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    value.push(c);
                }
            }
            Some(other) => value.push(other),
            None => {}
        }
    }
    value
}
