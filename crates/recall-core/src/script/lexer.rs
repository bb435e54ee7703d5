//! Tokenizer for session scripts.
//!
//! Produces an indentation-aware token stream: physical lines become
//! `Newline` tokens unless they sit inside brackets, and changes in leading
//! whitespace become `Indent`/`Dedent` pairs. Blank and comment-only lines
//! produce nothing.

use crate::eval::{ErrorKind, EvalError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    FStr(Vec<FPiece>),
    Name(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// Part of an f-string: literal text or an embedded expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FPiece {
    Lit(String),
    Expr {
        source: String,
        repr: bool,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// Longest operators first so prefixes don't shadow them.
const OPS: &[&str] = &[
    "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "+", "-",
    "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

const TAB_WIDTH: usize = 8;

const MAX_INDENT_LEVELS: usize = 100;

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::new(ErrorKind::Syntax, message).at_line(self.line)
    }

    fn run(mut self) -> Result<Vec<Token>, EvalError> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                if !self.line_start()? {
                    break;
                }
                at_line_start = false;
            }
            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.newline();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                '#' => self.skip_comment(),
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '\'' | '"' => self.string(false, false)?,
                c if c.is_alphabetic() || c == '_' => self.name()?,
                _ => self.op(c)?,
            }
        }

        if self.depth > 0 {
            return Err(self.error("unexpected end of input: unclosed bracket"));
        }
        self.newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    /// Handle indentation at the start of a logical line.
    ///
    /// Returns false once the input is exhausted.
    fn line_start(&mut self) -> Result<bool, EvalError> {
        loop {
            let mut column = 0;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => column += 1,
                    '\t' => column = (column / TAB_WIDTH + 1) * TAB_WIDTH,
                    '\r' | '\x0c' => {}
                    _ => break,
                }
                self.pos += 1;
            }
            match self.peek() {
                None => return Ok(false),
                Some('#') => {
                    self.skip_comment();
                    continue;
                }
                Some('\n') => {
                    self.pos += 1;
                    self.line += 1;
                    continue;
                }
                Some(_) => {}
            }

            let top = self.indents.last().copied().unwrap_or(0);
            if column > top {
                if self.indents.len() > MAX_INDENT_LEVELS {
                    return Err(self.error("too many levels of indentation"));
                }
                self.indents.push(column);
                self.push(Tok::Indent);
            } else {
                while column < self.indents.last().copied().unwrap_or(0) {
                    self.indents.pop();
                    self.push(Tok::Dedent);
                }
                if self.indents.last().copied().unwrap_or(0) != column {
                    return Err(self.error("unindent does not match any outer indentation level"));
                }
            }
            return Ok(true);
        }
    }

    fn newline(&mut self) {
        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.tok, Tok::Newline | Tok::Indent | Tok::Dedent))
        {
            self.push(Tok::Newline);
        }
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<(), EvalError> {
        let start = self.pos;
        let mut is_float = false;
        self.digits();
        if self.peek() == Some('.') && !self.peek_at(1).is_some_and(|c| c == '.' || c.is_alphabetic()) {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                self.digits();
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let tok = if is_float {
            Tok::Float(
                text.parse()
                    .map_err(|_| self.error(format!("invalid float literal '{text}'")))?,
            )
        } else {
            Tok::Int(
                text.parse()
                    .map_err(|_| self.error(format!("integer literal too large: {text}")))?,
            )
        };
        self.push(tok);
        Ok(())
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn name(&mut self) -> Result<(), EvalError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        // String prefixes: f"..", r"..", rf".."
        if matches!(self.peek(), Some('\'' | '"')) {
            let lower = name.to_ascii_lowercase();
            if matches!(lower.as_str(), "f" | "r" | "rf" | "fr") {
                return self.string(lower.contains('r'), lower.contains('f'));
            }
        }
        self.push(Tok::Name(name));
        Ok(())
    }

    fn string(&mut self, raw: bool, formatted: bool) -> Result<(), EvalError> {
        let start_line = self.line;
        let Some(quote) = self.peek() else {
            return Err(self.error("expected string literal"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(EvalError::new(ErrorKind::Syntax, "unterminated string literal")
                    .at_line(start_line));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' && !triple {
                return Err(
                    EvalError::new(ErrorKind::Syntax, "unterminated string literal").at_line(start_line)
                );
            }
            if c == '\\' && !raw {
                let escaped = self.peek_at(1);
                self.pos += 2;
                match escaped {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some('\n') => self.line += 1,
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => {
                        return Err(EvalError::new(ErrorKind::Syntax, "unterminated string literal")
                            .at_line(start_line));
                    }
                }
                continue;
            }
            if c == '\n' {
                self.line += 1;
            }
            text.push(c);
            self.pos += 1;
        }

        let tok = if formatted {
            Tok::FStr(split_fstring(&text).map_err(|e| e.at_line(start_line))?)
        } else {
            Tok::Str(text)
        };
        self.tokens.push(Token {
            tok,
            line: start_line,
        });
        Ok(())
    }

    fn op(&mut self, c: char) -> Result<(), EvalError> {
        let op = OPS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, oc)| self.peek_at(i) == Some(oc))
        });
        let Some(op) = op else {
            return Err(self.error(format!("invalid character '{c}'")));
        };
        match op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| self.error(format!("unmatched '{op}'")))?;
            }
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(Tok::Op(op));
        Ok(())
    }
}

/// Split f-string text into literal runs and `{expr[!r][:spec]}` fields.
fn split_fstring(text: &str) -> Result<Vec<FPiece>, EvalError> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => {
                return Err(EvalError::new(
                    ErrorKind::Syntax,
                    "f-string: single '}' is not allowed",
                ));
            }
            '{' => {
                if !literal.is_empty() {
                    pieces.push(FPiece::Lit(std::mem::take(&mut literal)));
                }
                let (piece, next) = fstring_field(&chars, i + 1)?;
                pieces.push(piece);
                i = next;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        pieces.push(FPiece::Lit(literal));
    }
    Ok(pieces)
}

/// Parse one replacement field starting after its `{`; returns the index after `}`.
fn fstring_field(chars: &[char], start: usize) -> Result<(FPiece, usize), EvalError> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut expr_end = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                '}' if depth > 0 => depth -= 1,
                '!' if chars.get(i + 1) == Some(&'=') => i += 1,
                '}' | '!' | ':' if depth == 0 => {
                    expr_end = Some(i);
                    break;
                }
                _ => {}
            },
        }
        i += 1;
    }
    let Some(expr_end) = expr_end else {
        return Err(EvalError::new(ErrorKind::Syntax, "f-string: expecting '}'"));
    };
    let source: String = chars[start..expr_end].iter().collect();
    if source.trim().is_empty() {
        return Err(EvalError::new(ErrorKind::Syntax, "f-string: empty expression not allowed"));
    }

    let mut i = expr_end;
    let mut repr = false;
    if chars[i] == '!' {
        match chars.get(i + 1) {
            Some('r') => repr = true,
            Some('s') => {}
            _ => {
                return Err(EvalError::new(
                    ErrorKind::Syntax,
                    "f-string: invalid conversion character",
                ));
            }
        }
        i += 2;
    }
    let mut spec = None;
    if chars.get(i) == Some(&':') {
        let spec_start = i + 1;
        while i < chars.len() && chars[i] != '}' {
            i += 1;
        }
        spec = Some(chars[spec_start..i].iter().collect());
    }
    if chars.get(i) != Some(&'}') {
        return Err(EvalError::new(ErrorKind::Syntax, "f-string: expecting '}'"));
    }
    Ok((FPiece::Expr { source, repr, spec }, i + 1))
}
