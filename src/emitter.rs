// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pass 2: byte emission and patch resolution.
//!
//! The driver already sized every root, so the image buffer is allocated
//! once up front and the cursor walks it exactly as pass 1 walked the code
//! position. Origin is tracked again here by replaying `org` directives
//! (their operand value was stamped during pass 1), so label resolution
//! sees the origin in force at each use site.

use std::fs;

use tracing::debug;

use crate::error::AsmError;
use crate::expression;
use crate::symbol_table::{Resolver, SymbolTable};
use crate::token::{PatchKind, Token, TokenKind};

/// Emit the final image for a pass-1 token stream. `image_len` is the code
/// position the driver ended on.
pub fn emit(roots: &[Token], symbols: &SymbolTable, image_len: usize) -> Result<Vec<u8>, AsmError> {
    let mut image = vec![0u8; image_len];
    let mut cursor = 0usize;
    let mut origin: i64 = 0;

    for root in roots {
        match root.kind {
            TokenKind::Instruction => cursor = instruction(root, symbols, origin, &mut image, cursor)?,
            TokenKind::Directive => match root.value.to_ascii_lowercase().as_str() {
                "org" => {
                    if let Some(op) = root.children.first() {
                        origin = op.numval;
                    }
                }
                "db" => {
                    let resolver = Resolver::new(symbols, origin);
                    for op in &root.children {
                        if op.kind == TokenKind::String {
                            let bytes = op.value.as_bytes();
                            image[cursor..cursor + bytes.len()].copy_from_slice(bytes);
                            cursor += bytes.len();
                        } else {
                            image[cursor] = expression::resolve(op, &resolver)? as u8;
                            cursor += 1;
                        }
                    }
                }
                "dw" => {
                    let resolver = Resolver::new(symbols, origin);
                    for op in &root.children {
                        let word = expression::resolve(op, &resolver)? as u16;
                        image[cursor..cursor + 2].copy_from_slice(&word.to_le_bytes());
                        cursor += 2;
                    }
                }
                "ds" => {
                    let size = root.children.first().map(|op| op.numval).unwrap_or(0) as usize;
                    let fill = match root.children.get(1) {
                        Some(op) => {
                            let resolver = Resolver::new(symbols, origin);
                            expression::resolve(op, &resolver)? as u8
                        }
                        None => 0,
                    };
                    image[cursor..cursor + size].fill(fill);
                    cursor += size;
                }
                "incbin" => cursor = incbin(root, &mut image, cursor)?,
                // def and include leave no bytes behind.
                _ => {}
            },
            _ => {}
        }
    }

    debug_assert_eq!(cursor, image.len());
    debug!(bytes = image.len(), "emitted image");
    Ok(image)
}

fn instruction(
    root: &Token,
    symbols: &SymbolTable,
    origin: i64,
    image: &mut [u8],
    cursor: usize,
) -> Result<usize, AsmError> {
    let opcode = root.opcode.as_ref().ok_or_else(|| {
        AsmError::encoding(root.pos.clone(), &root.value, "instruction was never encoded")
    })?;
    image[cursor..cursor + opcode.len()].copy_from_slice(opcode.bytes());

    if let Some(patch) = root.patch {
        let source = root.operand(patch.source).ok_or_else(|| {
            AsmError::encoding(root.pos.clone(), &root.value, "patch operand missing")
        })?;
        let resolver = Resolver::new(symbols, origin);
        let value = expression::resolve(source, &resolver)?;
        match patch.kind {
            PatchKind::Byte => image[cursor + patch.offset] = value as u8,
            PatchKind::Word => {
                let word = (value as u16).to_le_bytes();
                image[cursor + patch.offset] = word[0];
                image[cursor + patch.offset + 1] = word[1];
            }
            PatchKind::Relative => image[cursor + patch.offset] = value.wrapping_sub(2) as u8,
        }
    }
    Ok(cursor + opcode.len())
}

fn incbin(root: &Token, image: &mut [u8], cursor: usize) -> Result<usize, AsmError> {
    // The driver rewrote the operand to the resolved path and stamped the
    // byte length it sized the directive with.
    let op = root.children.first().ok_or_else(|| {
        AsmError::directive(root.pos.clone(), &root.value, "missing incbin operand")
    })?;
    let bytes = fs::read(&op.value)
        .map_err(|err| AsmError::io_at(op.pos.clone(), &op.value, err.to_string()))?;
    if bytes.len() as i64 != op.numval {
        return Err(AsmError::io_at(
            op.pos.clone(),
            &op.value,
            "file changed size between passes",
        ));
    }
    image[cursor..cursor + bytes.len()].copy_from_slice(&bytes);
    Ok(cursor + bytes.len())
}
