// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Token tree shared by the scanner, the encoder and the emitter.
//!
//! A source line becomes one or more root tokens (instruction, directive or
//! label), each owning its operands as child tokens in source order. Operand
//! tokens may own further children for compound forms such as `ix + 5` or
//! `a * (b + 1)`; those chains stay flat under the operand until expression
//! flattening rewrites them into a single `Expression` token.

use std::fmt;
use std::sync::Arc;

/// A position in assembly source, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(file: Arc<str>, line: u32, col: u32) -> Self {
        SourcePos { file, line, col }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Semantic class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Instruction,
    Directive,
    Label,
    Identifier,
    Number,
    String,
    Char,
    Register8,
    Register16,
    Condition,
    Operator,
    Expression,
}

impl TokenKind {
    /// Kinds that start a new root and flush the previous one to the driver.
    pub fn is_root(self) -> bool {
        matches!(
            self,
            TokenKind::Instruction | TokenKind::Directive | TokenKind::Label
        )
    }

    /// Kinds that carry (or can be resolved to) a numeric value.
    pub fn is_numeric_like(self) -> bool {
        matches!(
            self,
            TokenKind::Number | TokenKind::Char | TokenKind::Identifier | TokenKind::Expression
        )
    }

    pub fn is_register(self) -> bool {
        matches!(self, TokenKind::Register8 | TokenKind::Register16)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Instruction => "Instruction",
            TokenKind::Directive => "Directive",
            TokenKind::Label => "Label",
            TokenKind::Identifier => "Identifier",
            TokenKind::Number => "Number",
            TokenKind::String => "String",
            TokenKind::Char => "Char",
            TokenKind::Register8 => "Register8",
            TokenKind::Register16 => "Register16",
            TokenKind::Condition => "Condition",
            TokenKind::Operator => "Operator",
            TokenKind::Expression => "Expression",
        };
        f.write_str(name)
    }
}

pub const MAX_OPCODE_LEN: usize = 4;

/// Encoded instruction bytes, sized once during pass 1 and never grown.
/// Pass 2 may rewrite bytes at the patch offset but nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    len: u8,
    bytes: [u8; MAX_OPCODE_LEN],
}

impl Opcode {
    /// Build from a template of 1 to [`MAX_OPCODE_LEN`] bytes.
    pub fn new(template: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_OPCODE_LEN];
        bytes[..template.len()].copy_from_slice(template);
        Opcode {
            len: template.len() as u8,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// How a patched value is written into the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// One byte, value truncated.
    Byte,
    /// Two bytes, little-endian.
    Word,
    /// One byte holding `value - 2` (the `jr`/`djnz` adjustment).
    Relative,
}

/// Path from an instruction token to the operand supplying a patch value:
/// a direct child index, optionally descending one level (the displacement
/// slot of an indexed operand).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandRef {
    pub operand: usize,
    pub child: Option<usize>,
}

impl OperandRef {
    pub fn direct(operand: usize) -> Self {
        OperandRef {
            operand,
            child: None,
        }
    }

    pub fn nested(operand: usize, child: usize) -> Self {
        OperandRef {
            operand,
            child: Some(child),
        }
    }
}

/// A byte slot inside an opcode whose value is only known in pass 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    pub offset: usize,
    pub kind: PatchKind,
    pub source: OperandRef,
}

/// One node of the token tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: SourcePos,
    pub children: Vec<Token>,
    /// Written inside `[...]` bracket syntax.
    pub memref: bool,
    /// Resolved numeric value. Meaningful for Number/Char from the scanner,
    /// for Operator it holds the precedence, and for directive operands it
    /// is stamped by the driver once evaluated.
    pub numval: i64,
    /// Instruction tokens only, attached during pass 1.
    pub opcode: Option<Opcode>,
    pub patch: Option<Patch>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, pos: SourcePos) -> Self {
        Token {
            kind,
            value: value.into(),
            pos,
            children: Vec::new(),
            memref: false,
            numval: 0,
            opcode: None,
            patch: None,
        }
    }

    pub fn is_numeric_like(&self) -> bool {
        self.kind.is_numeric_like()
    }

    /// Numeric-like and not a memory reference: an immediate operand.
    pub fn is_immediate(&self) -> bool {
        self.kind.is_numeric_like() && !self.memref
    }

    /// Numeric-like inside brackets: an absolute memory operand.
    pub fn is_mem_value(&self) -> bool {
        self.kind.is_numeric_like() && self.memref
    }

    pub fn is_reg8_named(&self, name: &str) -> bool {
        self.kind == TokenKind::Register8 && !self.memref && self.value.eq_ignore_ascii_case(name)
    }

    pub fn is_reg16_named(&self, name: &str) -> bool {
        self.kind == TokenKind::Register16 && !self.memref && self.value.eq_ignore_ascii_case(name)
    }

    /// A plain bracketed 16-bit register such as `[hl]`, with no trailing
    /// operand chain.
    pub fn is_mem_reg16(&self, name: &str) -> bool {
        self.kind == TokenKind::Register16
            && self.memref
            && self.children.is_empty()
            && self.value.eq_ignore_ascii_case(name)
    }

    /// Follow an [`OperandRef`] recorded by the encoder.
    pub fn operand(&self, source: OperandRef) -> Option<&Token> {
        let op = self.children.get(source.operand)?;
        match source.child {
            Some(child) => op.children.get(child),
            None => Some(op),
        }
    }
}
