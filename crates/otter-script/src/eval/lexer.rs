//! Tokenizer
//!
//! Produces one flat token stream in which `Newline` separates logical
//! lines. Newlines inside brackets and after a trailing backslash join
//! physical lines. The language has no blocks, so an indented logical line
//! is an error.

use num_bigint::BigInt;

use crate::error::{ScriptError, ScriptResult};

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal fitting a machine word
    Int(i64),
    /// Integer literal beyond a machine word
    Long(BigInt),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Bytes literal
    Bytes(Vec<u8>),
    /// Identifier or keyword
    Name(String),
    /// Operator or delimiter
    Op(&'static str),
    /// End of a logical line
    Newline,
    /// End of input
    Eof,
}

/// A token and where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind
    pub kind: TokenKind,
    /// 1-based line
    pub line: usize,
    /// 0-based column
    pub col: usize,
}

/// Longest first, so that `**=` wins over `**` and `*`.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "->", "<<", ">>", "+", "-", "*", "/", "%", "&", "|", "^", "~", "<", ">",
    "(", ")", "[", "]", "{", "}", ",", ":", ".", "=", "@",
];

struct Lexer<'src> {
    source: &'src str,
    filename: &'src str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    depth: usize,
    tokens: Vec<Token>,
}

/// Tokenize `source`.
pub fn tokenize(source: &str, filename: &str) -> ScriptResult<Vec<Token>> {
    let mut lexer = Lexer {
        source,
        filename,
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 0,
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>, line: usize, col: usize) -> ScriptError {
        let text = self.source.lines().nth(line.saturating_sub(1)).map(str::to_string);
        ScriptError::syntax_error(message, self.filename, line, col + 1, text)
    }

    fn push(&mut self, kind: TokenKind, line: usize, col: usize) {
        self.tokens.push(Token { kind, line, col });
    }

    fn end_line(&mut self, line: usize, col: usize) {
        if self
            .tokens
            .last()
            .is_some_and(|t| t.kind != TokenKind::Newline)
        {
            self.push(TokenKind::Newline, line, col);
        }
    }

    fn run(&mut self) -> ScriptResult<()> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                while matches!(self.peek(), Some(' ' | '\t' | '\x0c')) {
                    self.bump();
                }
                match self.peek() {
                    Some('\n') | Some('#') | Some('\r') | None => {}
                    Some(_) if self.col > 0 => {
                        return Err(self.error("unexpected indent", self.line, self.col));
                    }
                    Some(_) => {}
                }
                at_line_start = false;
            }
            let (line, col) = (self.line, self.col);
            let Some(c) = self.peek() else {
                if self.depth > 0 {
                    return Err(self.error("unexpected EOF while parsing", line, col));
                }
                self.end_line(line, col);
                self.push(TokenKind::Eof, line, col);
                return Ok(());
            };
            match c {
                ' ' | '\t' | '\x0c' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        self.end_line(line, col);
                        at_line_start = true;
                    }
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.bump() != Some('\n') {
                        return Err(self.error(
                            "unexpected character after line continuation character",
                            line,
                            col,
                        ));
                    }
                }
                ';' => {
                    self.bump();
                    self.end_line(line, col);
                }
                '0'..='9' => self.number(line, col)?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(line, col)?,
                '\'' | '"' => self.string(false, false, line, col)?,
                c if c.is_alphabetic() || c == '_' => {
                    if let Some((raw, bytes, len)) = self.string_prefix() {
                        for _ in 0..len {
                            self.bump();
                        }
                        self.string(raw, bytes, line, col)?;
                    } else {
                        self.name(line, col);
                    }
                }
                _ => self.operator(c, line, col)?,
            }
        }
    }

    fn string_prefix(&self) -> Option<(bool, bool, usize)> {
        let mut raw = false;
        let mut bytes = false;
        let mut len = 0;
        while let Some(c) = self.peek_at(len) {
            match c.to_ascii_lowercase() {
                'r' if !raw => raw = true,
                'b' if !bytes => bytes = true,
                'u' if len == 0 => {}
                '\'' | '"' if len > 0 => return Some((raw, bytes, len)),
                _ => return None,
            }
            len += 1;
            if len > 2 {
                return None;
            }
        }
        None
    }

    fn name(&mut self, line: usize, col: usize) {
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            name.push(c);
            self.bump();
        }
        self.push(TokenKind::Name(name), line, col);
    }

    fn operator(&mut self, c: char, line: usize, col: usize) -> ScriptResult<()> {
        let rest: String = self.chars[self.pos..(self.pos + 3).min(self.chars.len())]
            .iter()
            .collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            return Err(self.error(
                format!("invalid character '{}' (U+{:04X})", c, c as u32),
                line,
                col,
            ));
        };
        for _ in 0..op.len() {
            self.bump();
        }
        match *op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                if self.depth == 0 {
                    return Err(self.error(format!("unmatched '{}'", op), line, col));
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.push(TokenKind::Op(op), line, col);
        Ok(())
    }

    fn digits(&mut self, out: &mut String, radix: u32) {
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                out.push(c);
            } else if c != '_' {
                break;
            }
            self.bump();
        }
    }

    fn number(&mut self, line: usize, col: usize) -> ScriptResult<()> {
        let radix = match (self.peek(), self.peek_at(1).map(|c| c.to_ascii_lowercase())) {
            (Some('0'), Some('x')) => 16,
            (Some('0'), Some('o')) => 8,
            (Some('0'), Some('b')) => 2,
            _ => 10,
        };
        let mut text = String::new();
        let mut is_float = false;
        if radix != 10 {
            self.bump();
            self.bump();
            self.digits(&mut text, radix);
            if text.is_empty() {
                return Err(self.error("invalid number literal", line, col));
            }
        } else {
            self.digits(&mut text, 10);
            if self.peek() == Some('.') {
                is_float = true;
                text.push('.');
                self.bump();
                self.digits(&mut text, 10);
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                let sign = self.peek_at(1).filter(|c| *c == '+' || *c == '-');
                let digit_at = if sign.is_some() { 2 } else { 1 };
                if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                    is_float = true;
                    text.push('e');
                    self.bump();
                    if let Some(s) = sign {
                        text.push(s);
                        self.bump();
                    }
                    self.digits(&mut text, 10);
                }
            }
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error("invalid decimal literal", line, col));
        }
        let kind = if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error("invalid float literal", line, col))?;
            TokenKind::Float(value)
        } else {
            match i64::from_str_radix(&text, radix) {
                Ok(i) => TokenKind::Int(i),
                Err(_) => BigInt::parse_bytes(text.as_bytes(), radix)
                    .map(TokenKind::Long)
                    .ok_or_else(|| self.error("invalid number literal", line, col))?,
            }
        };
        self.push(kind, line, col);
        Ok(())
    }

    fn hex_escape(&mut self, len: usize, line: usize, col: usize) -> ScriptResult<u32> {
        let mut value = 0;
        for _ in 0..len {
            let digit = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error(format!("truncated \\{}escape", if len == 2 { "x" } else { "u" }), line, col))?;
            value = value * 16 + digit;
            self.bump();
        }
        Ok(value)
    }

    fn string(&mut self, raw: bool, bytes: bool, line: usize, col: usize) -> ScriptResult<()> {
        let Some(quote) = self.bump() else {
            return Err(self.error("expected string", line, col));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                let what = if triple { "unterminated triple-quoted string literal" } else { "unterminated string literal" };
                return Err(self.error(format!("{} (detected at line {})", what, self.line), line, col));
            };
            if c == quote {
                if !triple {
                    self.bump();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    break;
                }
            }
            if c == '\n' && !triple {
                return Err(self.error(
                    format!("unterminated string literal (detected at line {})", self.line),
                    line,
                    col,
                ));
            }
            self.bump();
            if c != '\\' {
                text.push(c);
                continue;
            }
            let Some(escaped) = self.peek() else {
                continue;
            };
            if raw {
                text.push('\\');
                text.push(escaped);
                self.bump();
                continue;
            }
            self.bump();
            match escaped {
                '\n' => {}
                '\\' => text.push('\\'),
                '\'' => text.push('\''),
                '"' => text.push('"'),
                'n' => text.push('\n'),
                't' => text.push('\t'),
                'r' => text.push('\r'),
                'a' => text.push('\x07'),
                'b' => text.push('\x08'),
                'f' => text.push('\x0c'),
                'v' => text.push('\x0b'),
                '0'..='7' => {
                    let mut value = escaped.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek().and_then(|c| c.to_digit(8)) {
                            Some(d) => {
                                value = value * 8 + d;
                                self.bump();
                            }
                            None => break,
                        }
                    }
                    text.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                }
                'x' => {
                    let value = self.hex_escape(2, line, col)?;
                    text.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                }
                'u' | 'U' if !bytes => {
                    let value = self.hex_escape(if escaped == 'u' { 4 } else { 8 }, line, col)?;
                    let ch = char::from_u32(value)
                        .ok_or_else(|| self.error("illegal Unicode character", line, col))?;
                    text.push(ch);
                }
                other => {
                    text.push('\\');
                    text.push(other);
                }
            }
        }
        let kind = if bytes {
            if text.chars().any(|c| c as u32 > 0xff || (!c.is_ascii() && raw)) {
                return Err(self.error("bytes can only contain ASCII literal characters", line, col));
            }
            TokenKind::Bytes(text.chars().map(|c| c as u32 as u8).collect())
        } else {
            TokenKind::Str(text)
        };
        self.push(kind, line, col);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "<test>")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_statement_tokens() {
        assert_eq!(
            kinds("x **= 2 # note\n"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Op("**="),
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let k = kinds("f(1,\n  2)\ny");
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 2);
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(kinds("'a\\n'")[0], TokenKind::Str("a\n".into()));
        assert_eq!(kinds("r'a\\n'")[0], TokenKind::Str("a\\n".into()));
        assert_eq!(kinds("b'\\x00z'")[0], TokenKind::Bytes(vec![0, b'z']));
        assert_eq!(kinds("'''a\nb'''")[0], TokenKind::Str("a\nb".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0x_ff")[0], TokenKind::Int(255));
        assert_eq!(kinds("1_000.5")[0], TokenKind::Float(1000.5));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
        assert!(matches!(kinds("99999999999999999999")[0], TokenKind::Long(_)));
    }

    #[test]
    fn test_unexpected_indent() {
        let err = tokenize("x = 1\n  y = 2\n", "m.py").unwrap_err();
        let ScriptError::SyntaxError(info) = err else {
            panic!("expected a syntax error");
        };
        assert_eq!(info.message, "unexpected indent");
        assert_eq!((info.lineno, info.offset), (2, 3));
        assert_eq!(info.text.as_deref(), Some("  y = 2"));
    }
}
