// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Character scanner and token-tree builder.
//!
//! The scanner walks the source a character at a time, collecting fragments
//! and classifying them against the keyword tables. Completed root tokens
//! (instructions, directives, labels) are handed to a [`RootSink`] in source
//! order; the sink also supplies the address stamped into `$` tokens, so the
//! driver can advance between roots and `$` always reads as the address of
//! the statement it appears in.

use std::sync::Arc;

use crate::error::AsmError;
use crate::token::{SourcePos, Token, TokenKind};

/// Receiver for completed root tokens.
pub trait RootSink {
    /// Resolved address (`codepos + origin`) stamped into `$` tokens.
    fn address(&self) -> i64;

    /// Take ownership of a completed root and its operand tree.
    fn accept_root(&mut self, root: Token) -> Result<(), AsmError>;
}

const REGISTERS_16: &[&str] = &["bc", "de", "hl", "sp", "ix", "iy", "af"];
const REGISTERS_8: &[&str] = &["a", "b", "c", "d", "e", "h", "l", "i", "r"];
const CONDITIONS: &[&str] = &["z", "nz", "c", "nc", "po", "pe", "p", "m"];
const DIRECTIVES: &[&str] = &["org", "db", "dw", "ds", "def", "include", "incbin"];

const MNEMONICS: &[&str] = &[
    "adc", "add", "and", "bit", "call", "ccf", "cp", "cpd", "cpdr", "cpi", "cpir", "cpl", "daa",
    "dec", "di", "djnz", "ei", "ex", "exx", "halt", "im", "in", "inc", "ind", "indr", "ini",
    "inir", "jp", "jr", "ld", "ldd", "lddr", "ldi", "ldir", "neg", "nop", "or", "otdr", "otir",
    "out", "outd", "outi", "pop", "push", "res", "ret", "reti", "retn", "rl", "rla", "rlc",
    "rlca", "rld", "rr", "rra", "rrc", "rrca", "rrd", "rst", "sbc", "scf", "set", "sla", "sra",
    "srl", "sub", "xor",
];

/// Mnemonics whose single-letter `c` operand is the carry condition rather
/// than the register.
const CONDITIONAL_FLOW: &[&str] = &["jp", "jr", "call", "ret"];

fn in_set(set: &[&str], text: &str) -> bool {
    set.iter().any(|k| text.eq_ignore_ascii_case(k))
}

fn operator_precedence(c: char) -> Option<i64> {
    match c {
        '(' | ')' => Some(1),
        '~' => Some(2),
        '*' | '/' | '%' => Some(3),
        '+' | '-' => Some(4),
        '&' => Some(5),
        '^' => Some(6),
        '|' => Some(7),
        _ => None,
    }
}

/// Parse a number literal: `0x`/`0b`/`0o` prefixed or decimal.
fn parse_number(text: &str) -> Option<i64> {
    let lower = text.to_ascii_lowercase();
    let (digits, radix) = match lower.strip_prefix("0x") {
        Some(rest) => (rest, 16),
        None => match lower.strip_prefix("0b") {
            Some(rest) => (rest, 2),
            None => match lower.strip_prefix("0o") {
                Some(rest) => (rest, 8),
                None => (lower.as_str(), 10),
            },
        },
    };
    i64::from_str_radix(digits, radix).ok()
}

/// Classify a completed fragment. Keywords win over identifiers and are
/// matched case-insensitively; anything starting with a digit must parse as
/// a number.
fn classify(text: &str, pos: SourcePos) -> Result<Token, AsmError> {
    let kind = if in_set(REGISTERS_16, text) {
        TokenKind::Register16
    } else if in_set(REGISTERS_8, text) {
        TokenKind::Register8
    } else if in_set(CONDITIONS, text) {
        TokenKind::Condition
    } else if in_set(MNEMONICS, text) {
        TokenKind::Instruction
    } else if in_set(DIRECTIVES, text) {
        TokenKind::Directive
    } else if text.starts_with(|c: char| c.is_ascii_digit()) {
        let value = parse_number(text)
            .ok_or_else(|| AsmError::syntax(pos.clone(), text, "malformed number"))?;
        let mut token = Token::new(TokenKind::Number, text, pos);
        token.numval = value;
        return Ok(token);
    } else {
        TokenKind::Identifier
    };
    Ok(Token::new(kind, text, pos))
}

struct Scanner {
    file: Arc<str>,
    line: u32,
    col: u32,
    buf: String,
    buf_pos: Option<SourcePos>,
    root: Option<Token>,
    /// A `,` was seen since the last operand; the next token starts a new
    /// operand instead of chaining under the current one.
    opsep: bool,
    in_memref: bool,
    in_string: bool,
    in_char: bool,
    in_comment: bool,
    lit_pos: Option<SourcePos>,
}

impl Scanner {
    fn new(file: Arc<str>) -> Self {
        Scanner {
            file,
            line: 1,
            col: 1,
            buf: String::new(),
            buf_pos: None,
            root: None,
            opsep: false,
            in_memref: false,
            in_string: false,
            in_char: false,
            in_comment: false,
            lit_pos: None,
        }
    }

    fn here(&self) -> SourcePos {
        SourcePos::new(self.file.clone(), self.line, self.col)
    }

    fn step(&mut self, c: char, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        if self.in_string {
            self.literal(c, '"', sink)?;
        } else if self.in_char {
            self.literal(c, '\'', sink)?;
        } else if self.in_comment {
            // Swallowed until end of line.
        } else {
            self.normal(c, sink)?;
        }

        if c == '\n' {
            self.line += 1;
            self.col = 1;
            self.in_comment = false;
            self.in_memref = false;
        } else {
            self.col += 1;
        }
        Ok(())
    }

    fn literal(&mut self, c: char, delim: char, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        if c == '\n' {
            let pos = self.lit_pos.take().unwrap_or_else(|| self.here());
            return Err(AsmError::lex(pos, &self.buf, "unterminated literal"));
        }
        if c != delim {
            self.buf.push(c);
            return Ok(());
        }
        let text = std::mem::take(&mut self.buf);
        let pos = self.lit_pos.take().unwrap_or_else(|| self.here());
        self.in_string = false;
        self.in_char = false;
        // An empty literal produces no token at all.
        if text.is_empty() {
            return Ok(());
        }
        let mut token = if delim == '"' {
            Token::new(TokenKind::String, text, pos)
        } else {
            let mut t = Token::new(TokenKind::Char, text, pos);
            t.numval = i64::from(t.value.as_bytes()[0]);
            t
        };
        if self.in_memref {
            token.memref = true;
        }
        self.place(token, sink)
    }

    fn normal(&mut self, c: char, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        match c {
            '"' => {
                self.complete(sink)?;
                self.in_string = true;
                self.lit_pos = Some(self.here());
            }
            '\'' => {
                // `af'` selects the alternate register set; the quote is
                // absorbed into the register fragment.
                if self.buf.eq_ignore_ascii_case("af") {
                    return Ok(());
                }
                self.complete(sink)?;
                self.in_char = true;
                self.lit_pos = Some(self.here());
            }
            '[' => {
                self.complete(sink)?;
                self.in_memref = true;
            }
            ']' => {
                self.complete(sink)?;
                self.in_memref = false;
            }
            ';' => {
                self.complete(sink)?;
                self.in_comment = true;
            }
            ',' => {
                self.complete(sink)?;
                self.opsep = true;
            }
            ':' => {
                if !self.buf.is_empty() {
                    let text = std::mem::take(&mut self.buf);
                    let pos = self.buf_pos.take().unwrap_or_else(|| self.here());
                    let token = Token::new(TokenKind::Label, text, pos);
                    self.place(token, sink)?;
                }
            }
            '$' => {
                if self.buf.is_empty() {
                    let mut token = Token::new(TokenKind::Number, "$", self.here());
                    token.numval = sink.address();
                    self.place(token, sink)?;
                } else {
                    self.buf.push('$');
                }
            }
            c if operator_precedence(c).is_some() => {
                self.complete(sink)?;
                let mut token = Token::new(TokenKind::Operator, c.to_string(), self.here());
                token.numval = operator_precedence(c).unwrap_or(0);
                self.place(token, sink)?;
            }
            c if c.is_whitespace() => {
                self.complete(sink)?;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                if self.buf.is_empty() {
                    self.buf_pos = Some(self.here());
                }
                self.buf.push(c);
            }
            _ => {
                return Err(AsmError::lex(
                    self.here(),
                    &c.to_string(),
                    "unexpected character",
                ));
            }
        }
        Ok(())
    }

    /// Classify and place the pending fragment, if any.
    fn complete(&mut self, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.buf);
        let pos = self.buf_pos.take().unwrap_or_else(|| self.here());
        let token = classify(&text, pos)?;
        self.place(token, sink)
    }

    /// Attach a token to the tree: roots flush their predecessor, the first
    /// operand (or one following `,`) becomes a child of the root, and
    /// anything else chains flat under the current operand.
    fn place(&mut self, mut token: Token, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        if self.in_memref {
            token.memref = true;
        }
        if token.kind.is_root() {
            self.flush_root(sink)?;
            self.root = Some(token);
            self.opsep = false;
            return Ok(());
        }
        let root = match self.root.as_mut() {
            Some(root) => root,
            None => {
                return Err(AsmError::syntax(
                    token.pos.clone(),
                    &token.value,
                    "operand before any instruction, directive or label",
                ))
            }
        };
        if self.opsep || root.children.is_empty() {
            if token.is_reg8_named("c")
                && root.kind == TokenKind::Instruction
                && in_set(CONDITIONAL_FLOW, &root.value)
            {
                token.kind = TokenKind::Condition;
            }
            root.children.push(token);
            self.opsep = false;
        } else if let Some(operand) = root.children.last_mut() {
            operand.children.push(token);
        }
        Ok(())
    }

    fn flush_root(&mut self, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        if let Some(root) = self.root.take() {
            sink.accept_root(root)?;
        }
        Ok(())
    }

    fn finish(&mut self, sink: &mut dyn RootSink) -> Result<(), AsmError> {
        if self.in_string || self.in_char {
            let pos = self.lit_pos.take().unwrap_or_else(|| self.here());
            return Err(AsmError::lex(pos, &self.buf, "unterminated literal"));
        }
        self.complete(sink)?;
        self.flush_root(sink)
    }
}

/// Scan a whole source text, feeding completed roots to `sink`.
pub fn scan(source: &str, file: Arc<str>, sink: &mut dyn RootSink) -> Result<(), AsmError> {
    let mut scanner = Scanner::new(file);
    for c in source.chars() {
        scanner.step(c, sink)?;
    }
    scanner.finish(sink)
}
