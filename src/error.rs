// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error taxonomy for the assembly pipeline.
//!
//! Every failure is fatal: the pipeline propagates an [`AsmError`] up
//! unchanged and the binary is the single place that prints the diagnostic
//! and aborts. The rendered form is `file:line:col [Kind:`token`] message`,
//! with the position prefix omitted for errors that have no source location
//! (a missing root file, a malformed import side-file).

use std::error::Error;
use std::fmt;

use crate::token::SourcePos;

/// Classes of assembly failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    /// Bad character or unterminated literal in the scanner.
    Lex,
    /// Token invalid in its structural position.
    Syntax,
    /// Operand count outside an instruction's allowed range.
    Arity,
    /// No instruction/operand-shape pattern matches.
    Encoding,
    /// Duplicate or unresolved symbol, or a failed evaluation.
    Symbol,
    /// Malformed directive operands.
    Directive,
    /// Missing or unreadable source/include/incbin/import file.
    Io,
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AsmErrorKind::Lex => "Lex",
            AsmErrorKind::Syntax => "Syntax",
            AsmErrorKind::Arity => "Arity",
            AsmErrorKind::Encoding => "Encoding",
            AsmErrorKind::Symbol => "Symbol",
            AsmErrorKind::Directive => "Directive",
            AsmErrorKind::Io => "Io",
        };
        f.write_str(label)
    }
}

/// A fatal assembly error with its diagnostic context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    pub pos: Option<SourcePos>,
    /// Offending token text, empty when no single token is at fault.
    pub token: String,
    pub message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, message: impl Into<String>) -> Self {
        AsmError {
            kind,
            pos: None,
            token: String::new(),
            message: message.into(),
        }
    }

    pub fn at(mut self, pos: SourcePos) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_owned();
        self
    }

    pub fn lex(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Lex, message).at(pos).with_token(token)
    }

    pub fn syntax(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Syntax, message)
            .at(pos)
            .with_token(token)
    }

    pub fn arity(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Arity, message)
            .at(pos)
            .with_token(token)
    }

    pub fn encoding(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Encoding, message)
            .at(pos)
            .with_token(token)
    }

    pub fn symbol(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Symbol, message)
            .at(pos)
            .with_token(token)
    }

    pub fn directive(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Directive, message)
            .at(pos)
            .with_token(token)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Io, message)
    }

    pub fn io_at(pos: SourcePos, token: &str, message: impl Into<String>) -> Self {
        Self::new(AsmErrorKind::Io, message).at(pos).with_token(token)
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = &self.pos {
            write!(f, "{pos} ")?;
        }
        if self.token.is_empty() {
            write!(f, "[{}] {}", self.kind, self.message)
        } else {
            write!(f, "[{}:`{}`] {}", self.kind, self.token, self.message)
        }
    }
}

impl Error for AsmError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SourcePos;

    #[test]
    fn display_with_position_and_token() {
        let err = AsmError::symbol(
            SourcePos::new("main.z80".into(), 12, 5),
            "loop",
            "unresolved identifier",
        );
        assert_eq!(
            err.to_string(),
            "main.z80:12:5 [Symbol:`loop`] unresolved identifier"
        );
    }

    #[test]
    fn display_without_position() {
        let err = AsmError::io("missing.z80: No such file or directory");
        assert_eq!(
            err.to_string(),
            "[Io] missing.z80: No such file or directory"
        );
    }

    #[test]
    fn display_with_position_without_token() {
        let err = AsmError::new(AsmErrorKind::Syntax, "malformed expression")
            .at(SourcePos::new("main.z80".into(), 3, 1));
        assert_eq!(err.to_string(), "main.z80:3:1 [Syntax] malformed expression");
    }
}
