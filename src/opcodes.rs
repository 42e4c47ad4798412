// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Z80 instruction encoder.
//!
//! `encode` maps a flattened instruction token to its opcode template and,
//! when an operand only resolves in pass 2, a patch describing the byte slot
//! to rewrite. The template is complete already in pass 1: its length never
//! changes, which is what makes single-pass sizing (and forward references)
//! work. Operand values are never needed here; any numeric-like operand slot
//! gets a patch and the emitter fills it in, whether or not the value was a
//! literal.
//!
//! The only values that must be literal at encode time are the ones baked
//! into the opcode byte itself: `bit`/`set`/`res` bit numbers, `im` modes,
//! `rst` targets and the displacement of `ld [ix+d], n` (the immediate
//! occupies the patch slot there).

use crate::error::AsmError;
use crate::token::{Opcode, OperandRef, Patch, PatchKind, Token, TokenKind};

/// Encode one instruction root. Returns the opcode template and the patch
/// to apply in pass 2, if any.
pub fn encode(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let mnemonic = token.value.to_ascii_lowercase();
    check_arity(token, &mnemonic)?;
    match mnemonic.as_str() {
        "ld" => ld(token),
        "push" => push_pop(token, 0xc5, 0xe5),
        "pop" => push_pop(token, 0xc1, 0xe1),
        "ex" => ex(token),
        "add" => add(token),
        "adc" => carry_arith(token, 0x88, 0xce, 0x4a),
        "sub" => acc_arith(token, 0, 0x90, 0xd6),
        "sbc" => carry_arith(token, 0x98, 0xde, 0x42),
        "and" => acc_arith(token, 0, 0xa0, 0xe6),
        "or" => acc_arith(token, 0, 0xb0, 0xf6),
        "xor" => acc_arith(token, 0, 0xa8, 0xee),
        "cp" => acc_arith(token, 0, 0xb8, 0xfe),
        "inc" => inc_dec(token, 0x04, 0x34, 0x23, 0x03),
        "dec" => inc_dec(token, 0x05, 0x35, 0x2b, 0x0b),
        "im" => im(token),
        "rlc" => rotate(token, 0x00),
        "rrc" => rotate(token, 0x08),
        "rl" => rotate(token, 0x10),
        "rr" => rotate(token, 0x18),
        "sla" => rotate(token, 0x20),
        "sra" => rotate(token, 0x28),
        "srl" => rotate(token, 0x38),
        "bit" => bit_op(token, 0x40),
        "res" => bit_op(token, 0x80),
        "set" => bit_op(token, 0xc0),
        "jp" => jp(token),
        "jr" => jr(token),
        "djnz" => Ok(patched(&[0x10, 0], 1, PatchKind::Relative, OperandRef::direct(0))),
        "call" => call(token),
        "ret" => ret(token),
        "rst" => rst(token),
        "in" => port_in(token),
        "out" => port_out(token),
        _ => fixed(token, &mnemonic),
    }
}

fn check_arity(token: &Token, mnemonic: &str) -> Result<(), AsmError> {
    let (min, max) = operand_range(mnemonic);
    let count = token.children.len();
    if count < min || count > max {
        return Err(AsmError::arity(
            token.pos.clone(),
            &token.value,
            format!("`{mnemonic}` takes from {min} to {max} operands but {count} were given"),
        ));
    }
    Ok(())
}

fn operand_range(mnemonic: &str) -> (usize, usize) {
    match mnemonic {
        "ld" | "ex" | "add" | "adc" | "sbc" | "bit" | "set" | "res" | "in" | "out" => (2, 2),
        "push" | "pop" | "sub" | "and" | "or" | "xor" | "cp" | "inc" | "dec" | "im" | "rst"
        | "djnz" | "rlc" | "rrc" | "rl" | "rr" | "sla" | "sra" | "srl" => (1, 1),
        "jp" | "jr" | "call" => (1, 2),
        "ret" => (0, 1),
        _ => (0, 0),
    }
}

fn plain(bytes: &[u8]) -> Result<(Opcode, Option<Patch>), AsmError> {
    Ok((Opcode::new(bytes), None))
}

fn patched(bytes: &[u8], offset: usize, kind: PatchKind, source: OperandRef) -> (Opcode, Option<Patch>) {
    (
        Opcode::new(bytes),
        Some(Patch {
            offset,
            kind,
            source,
        }),
    )
}

/// No form of the instruction matches the operand shapes.
fn no_match(token: &Token) -> AsmError {
    let shapes: Vec<String> = token.children.iter().map(shape).collect();
    AsmError::encoding(
        token.pos.clone(),
        &token.value,
        format!("no `{}` form matches ({})", token.value, shapes.join(", ")),
    )
}

fn shape(op: &Token) -> String {
    if op.memref {
        format!("[{} `{}`]", op.kind, op.value)
    } else {
        format!("{} `{}`", op.kind, op.value)
    }
}

/// 3-bit register field for a, b, c, d, e, h, l.
fn reg8_bits(op: &Token) -> u8 {
    match op.value.to_ascii_lowercase().as_str() {
        "a" => 0b111,
        "b" => 0b000,
        "c" => 0b001,
        "d" => 0b010,
        "e" => 0b011,
        "h" => 0b100,
        _ => 0b101,
    }
}

/// 2-bit register-pair field. hl, ix and iy share slot 2; sp and af share
/// slot 3 (which of the two is meant follows from the instruction).
fn reg16_bits(op: &Token) -> u8 {
    match op.value.to_ascii_lowercase().as_str() {
        "bc" => 0,
        "de" => 1,
        "hl" | "ix" | "iy" => 2,
        _ => 3,
    }
}

fn cond_bits(op: &Token) -> u8 {
    match op.value.to_ascii_lowercase().as_str() {
        "nz" => 0,
        "z" => 1,
        "nc" => 2,
        "c" => 3,
        "po" => 4,
        "pe" => 5,
        "p" => 6,
        _ => 7,
    }
}

/// An 8-bit register that takes part in the r field: a through l, but not
/// the special i and r registers.
fn is_r_field(op: &Token) -> bool {
    op.kind == TokenKind::Register8
        && !op.memref
        && !op.value.eq_ignore_ascii_case("i")
        && !op.value.eq_ignore_ascii_case("r")
}

fn is_cond(op: &Token) -> bool {
    op.kind == TokenKind::Condition && !op.memref
}

/// A bracketed index register with an operand chain: `[ix + d]`.
fn is_indexed(op: &Token, name: &str) -> bool {
    op.kind == TokenKind::Register16
        && op.memref
        && op.value.eq_ignore_ascii_case(name)
        && !op.children.is_empty()
}

fn is_any_indexed(op: &Token) -> bool {
    is_indexed(op, "ix") || is_indexed(op, "iy")
}

/// 0xdd for ix, 0xfd for iy.
fn index_prefix(op: &Token) -> u8 {
    if op.value.eq_ignore_ascii_case("ix") {
        0xdd
    } else {
        0xfd
    }
}

/// Validate an indexed operand chain and return the child index of its
/// displacement. Only the exact shape `[reg + value]` encodes; anything
/// longer (or a `-`) does not.
fn indexed_displacement(op: &Token) -> Result<usize, AsmError> {
    match op.children.as_slice() {
        [plus, value]
            if plus.kind == TokenKind::Operator && plus.value == "+" && value.is_numeric_like() =>
        {
            Ok(1)
        }
        _ => Err(AsmError::encoding(
            op.pos.clone(),
            &op.value,
            "indexed operand must have the form `[ix + displacement]`",
        )),
    }
}

/// Literal displacement baked directly into the template, for the one form
/// whose patch slot is taken by an immediate.
fn literal_displacement(op: &Token) -> Result<u8, AsmError> {
    let child = indexed_displacement(op)?;
    let value = &op.children[child];
    match value.kind {
        TokenKind::Number | TokenKind::Char => Ok(value.numval as u8),
        _ => Err(AsmError::encoding(
            op.pos.clone(),
            &op.value,
            "displacement must be a literal when the operand is also an immediate",
        )),
    }
}

fn literal_value(op: &Token) -> Option<i64> {
    match op.kind {
        TokenKind::Number | TokenKind::Char if !op.memref => Some(op.numval),
        _ => None,
    }
}

fn ld(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    let op2 = &token.children[1];

    // Accumulator and special-register forms come before the generic
    // register moves so that `ld a, i` and friends are not shadowed.
    if op1.is_reg8_named("a") {
        if op2.is_mem_reg16("bc") {
            return plain(&[0x0a]);
        }
        if op2.is_mem_reg16("de") {
            return plain(&[0x1a]);
        }
        if op2.is_reg8_named("i") {
            return plain(&[0xed, 0x57]);
        }
        if op2.is_reg8_named("r") {
            return plain(&[0xed, 0x5f]);
        }
        if op2.is_mem_value() {
            return Ok(patched(&[0x3a, 0, 0], 1, PatchKind::Word, OperandRef::direct(1)));
        }
    }
    if op1.is_reg8_named("i") && op2.is_reg8_named("a") {
        return plain(&[0xed, 0x47]);
    }
    if op1.is_reg8_named("r") && op2.is_reg8_named("a") {
        return plain(&[0xed, 0x4f]);
    }

    if is_r_field(op1) {
        if is_r_field(op2) {
            return plain(&[0x40 | (reg8_bits(op1) << 3) | reg8_bits(op2)]);
        }
        if op2.is_immediate() {
            return Ok(patched(
                &[0x06 | (reg8_bits(op1) << 3), 0],
                1,
                PatchKind::Byte,
                OperandRef::direct(1),
            ));
        }
        if op2.is_mem_reg16("hl") {
            return plain(&[0x46 | (reg8_bits(op1) << 3)]);
        }
        if is_any_indexed(op2) {
            let child = indexed_displacement(op2)?;
            return Ok(patched(
                &[index_prefix(op2), 0x46 | (reg8_bits(op1) << 3), 0],
                2,
                PatchKind::Byte,
                OperandRef::nested(1, child),
            ));
        }
    }

    if op1.is_mem_reg16("hl") {
        if is_r_field(op2) {
            return plain(&[0x70 | reg8_bits(op2)]);
        }
        if op2.is_immediate() {
            return Ok(patched(&[0x36, 0], 1, PatchKind::Byte, OperandRef::direct(1)));
        }
    }
    if is_any_indexed(op1) {
        if is_r_field(op2) {
            let child = indexed_displacement(op1)?;
            return Ok(patched(
                &[index_prefix(op1), 0x70 | reg8_bits(op2), 0],
                2,
                PatchKind::Byte,
                OperandRef::nested(0, child),
            ));
        }
        if op2.is_immediate() {
            let disp = literal_displacement(op1)?;
            return Ok(patched(
                &[index_prefix(op1), 0x36, disp, 0],
                3,
                PatchKind::Byte,
                OperandRef::direct(1),
            ));
        }
    }
    if op1.is_mem_reg16("bc") && op2.is_reg8_named("a") {
        return plain(&[0x02]);
    }
    if op1.is_mem_reg16("de") && op2.is_reg8_named("a") {
        return plain(&[0x12]);
    }

    // 16-bit loads.
    if op1.is_reg16_named("sp") {
        if op2.is_reg16_named("hl") {
            return plain(&[0xf9]);
        }
        if op2.is_reg16_named("ix") {
            return plain(&[0xdd, 0xf9]);
        }
        if op2.is_reg16_named("iy") {
            return plain(&[0xfd, 0xf9]);
        }
    }
    if op1.is_reg16_named("ix") || op1.is_reg16_named("iy") {
        let prefix = index_prefix(op1);
        if op2.is_immediate() {
            return Ok(patched(&[prefix, 0x21, 0, 0], 2, PatchKind::Word, OperandRef::direct(1)));
        }
        if op2.is_mem_value() {
            return Ok(patched(&[prefix, 0x2a, 0, 0], 2, PatchKind::Word, OperandRef::direct(1)));
        }
    }
    if op1.kind == TokenKind::Register16 && !op1.memref {
        if op2.is_immediate() {
            return Ok(patched(
                &[0x01 | (reg16_bits(op1) << 4), 0, 0],
                1,
                PatchKind::Word,
                OperandRef::direct(1),
            ));
        }
        if op2.is_mem_value() {
            if op1.is_reg16_named("hl") {
                return Ok(patched(&[0x2a, 0, 0], 1, PatchKind::Word, OperandRef::direct(1)));
            }
            return Ok(patched(
                &[0xed, 0x4b | (reg16_bits(op1) << 4), 0, 0],
                2,
                PatchKind::Word,
                OperandRef::direct(1),
            ));
        }
    }
    if op1.is_mem_value() {
        if op2.is_reg8_named("a") {
            return Ok(patched(&[0x32, 0, 0], 1, PatchKind::Word, OperandRef::direct(0)));
        }
        if op2.is_reg16_named("hl") {
            return Ok(patched(&[0x22, 0, 0], 1, PatchKind::Word, OperandRef::direct(0)));
        }
        if op2.is_reg16_named("ix") || op2.is_reg16_named("iy") {
            return Ok(patched(
                &[index_prefix(op2), 0x22, 0, 0],
                2,
                PatchKind::Word,
                OperandRef::direct(0),
            ));
        }
        if op2.kind == TokenKind::Register16 && !op2.memref {
            return Ok(patched(
                &[0xed, 0x43 | (reg16_bits(op2) << 4), 0, 0],
                2,
                PatchKind::Word,
                OperandRef::direct(0),
            ));
        }
    }

    Err(no_match(token))
}

fn push_pop(token: &Token, qq_base: u8, index_op: u8) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op = &token.children[0];
    if op.is_reg16_named("ix") {
        return plain(&[0xdd, index_op]);
    }
    if op.is_reg16_named("iy") {
        return plain(&[0xfd, index_op]);
    }
    if op.kind == TokenKind::Register16 && !op.memref {
        return plain(&[qq_base | (reg16_bits(op) << 4)]);
    }
    Err(no_match(token))
}

fn ex(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    let op2 = &token.children[1];
    if op1.is_reg16_named("de") && op2.is_reg16_named("hl") {
        return plain(&[0xeb]);
    }
    if op1.is_reg16_named("af") && op2.is_reg16_named("af") {
        return plain(&[0x08]);
    }
    if op1.is_mem_reg16("sp") {
        if op2.is_reg16_named("hl") {
            return plain(&[0xe3]);
        }
        if op2.is_reg16_named("ix") {
            return plain(&[0xdd, 0xe3]);
        }
        if op2.is_reg16_named("iy") {
            return plain(&[0xfd, 0xe3]);
        }
    }
    Err(no_match(token))
}

/// The accumulator arithmetic group: one value operand against `a`, at
/// child index `value_op`. `reg_base` is or-ed with the r field, and
/// `imm_op` starts the two-byte immediate form.
fn acc_arith(
    token: &Token,
    value_op: usize,
    reg_base: u8,
    imm_op: u8,
) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op = &token.children[value_op];
    if is_r_field(op) {
        return plain(&[reg_base | reg8_bits(op)]);
    }
    if op.is_immediate() {
        return Ok(patched(&[imm_op, 0], 1, PatchKind::Byte, OperandRef::direct(value_op)));
    }
    if op.is_mem_reg16("hl") {
        return plain(&[reg_base | 0x06]);
    }
    if is_any_indexed(op) {
        let child = indexed_displacement(op)?;
        return Ok(patched(
            &[index_prefix(op), reg_base | 0x06, 0],
            2,
            PatchKind::Byte,
            OperandRef::nested(value_op, child),
        ));
    }
    Err(no_match(token))
}

/// adc and sbc: the accumulator forms plus the `hl, ss` form under 0xed.
fn carry_arith(
    token: &Token,
    reg_base: u8,
    imm_op: u8,
    hl_base: u8,
) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    let op2 = &token.children[1];
    if op1.is_reg8_named("a") {
        return acc_arith(token, 1, reg_base, imm_op);
    }
    if op1.is_reg16_named("hl") && op2.kind == TokenKind::Register16 && !op2.memref {
        return plain(&[0xed, hl_base | (reg16_bits(op2) << 4)]);
    }
    Err(no_match(token))
}

fn add(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    let op2 = &token.children[1];
    if op1.is_reg8_named("a") {
        return acc_arith(token, 1, 0x80, 0xc6);
    }
    if op2.kind == TokenKind::Register16 && !op2.memref {
        if op1.is_reg16_named("hl") {
            return plain(&[0x09 | (reg16_bits(op2) << 4)]);
        }
        if op1.is_reg16_named("ix") || op1.is_reg16_named("iy") {
            return plain(&[index_prefix(op1), 0x09 | (reg16_bits(op2) << 4)]);
        }
    }
    Err(no_match(token))
}

fn inc_dec(
    token: &Token,
    reg_base: u8,
    hl_op: u8,
    index_op: u8,
    pair_base: u8,
) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op = &token.children[0];
    if is_r_field(op) {
        return plain(&[reg_base | (reg8_bits(op) << 3)]);
    }
    if op.is_mem_reg16("hl") {
        return plain(&[hl_op]);
    }
    if is_any_indexed(op) {
        let child = indexed_displacement(op)?;
        return Ok(patched(
            &[index_prefix(op), hl_op, 0],
            2,
            PatchKind::Byte,
            OperandRef::nested(0, child),
        ));
    }
    if op.is_reg16_named("ix") || op.is_reg16_named("iy") {
        return plain(&[index_prefix(op), index_op]);
    }
    if op.kind == TokenKind::Register16 && !op.memref {
        return plain(&[pair_base | (reg16_bits(op) << 4)]);
    }
    Err(no_match(token))
}

fn im(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op = &token.children[0];
    match literal_value(op) {
        Some(0) => plain(&[0xed, 0x46]),
        Some(1) => plain(&[0xed, 0x56]),
        Some(2) => plain(&[0xed, 0x5e]),
        _ => Err(no_match(token)),
    }
}

/// The CB rotate/shift group. `base` selects the operation within the
/// group's 8-entry stride.
fn rotate(token: &Token, base: u8) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op = &token.children[0];
    if is_r_field(op) {
        return plain(&[0xcb, base | reg8_bits(op)]);
    }
    if op.is_mem_reg16("hl") {
        return plain(&[0xcb, base | 0x06]);
    }
    if is_any_indexed(op) {
        let child = indexed_displacement(op)?;
        // Displacement sits before the operation byte in the DDCB form.
        return Ok(patched(
            &[index_prefix(op), 0xcb, 0, base | 0x06],
            2,
            PatchKind::Byte,
            OperandRef::nested(0, child),
        ));
    }
    Err(no_match(token))
}

/// bit, res and set. The bit number is baked into the opcode byte, so it
/// must be a literal.
fn bit_op(token: &Token, base: u8) -> Result<(Opcode, Option<Patch>), AsmError> {
    let bit = &token.children[0];
    let target = &token.children[1];
    let b = match literal_value(bit) {
        Some(b @ 0..=7) => b as u8,
        _ => {
            return Err(AsmError::encoding(
                token.pos.clone(),
                &token.value,
                "bit number must be a literal from 0 to 7",
            ))
        }
    };
    if is_r_field(target) {
        return plain(&[0xcb, base | (b << 3) | reg8_bits(target)]);
    }
    if target.is_mem_reg16("hl") {
        return plain(&[0xcb, base | (b << 3) | 0x06]);
    }
    if is_any_indexed(target) {
        let child = indexed_displacement(target)?;
        return Ok(patched(
            &[index_prefix(target), 0xcb, 0, base | (b << 3) | 0x06],
            2,
            PatchKind::Byte,
            OperandRef::nested(1, child),
        ));
    }
    Err(no_match(token))
}

fn jp(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    if token.children.len() == 1 {
        if op1.is_immediate() {
            return Ok(patched(&[0xc3, 0, 0], 1, PatchKind::Word, OperandRef::direct(0)));
        }
        if op1.is_mem_reg16("hl") {
            return plain(&[0xe9]);
        }
        if op1.is_mem_reg16("ix") {
            return plain(&[0xdd, 0xe9]);
        }
        if op1.is_mem_reg16("iy") {
            return plain(&[0xfd, 0xe9]);
        }
        return Err(no_match(token));
    }
    let op2 = &token.children[1];
    if is_cond(op1) && op2.is_immediate() {
        return Ok(patched(
            &[0xc2 | (cond_bits(op1) << 3), 0, 0],
            1,
            PatchKind::Word,
            OperandRef::direct(1),
        ));
    }
    Err(no_match(token))
}

fn jr(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    if token.children.len() == 1 {
        if op1.is_immediate() {
            return Ok(patched(&[0x18, 0], 1, PatchKind::Relative, OperandRef::direct(0)));
        }
        return Err(no_match(token));
    }
    let op2 = &token.children[1];
    if is_cond(op1) && op2.is_immediate() {
        // Only the four flag conditions exist in relative form.
        let op = match op1.value.to_ascii_lowercase().as_str() {
            "c" => 0x38,
            "nc" => 0x30,
            "z" => 0x28,
            "nz" => 0x20,
            _ => return Err(no_match(token)),
        };
        return Ok(patched(&[op, 0], 1, PatchKind::Relative, OperandRef::direct(1)));
    }
    Err(no_match(token))
}

fn call(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    if token.children.len() == 1 {
        if op1.is_immediate() {
            return Ok(patched(&[0xcd, 0, 0], 1, PatchKind::Word, OperandRef::direct(0)));
        }
        return Err(no_match(token));
    }
    let op2 = &token.children[1];
    if is_cond(op1) && op2.is_immediate() {
        return Ok(patched(
            &[0xc4 | (cond_bits(op1) << 3), 0, 0],
            1,
            PatchKind::Word,
            OperandRef::direct(1),
        ));
    }
    Err(no_match(token))
}

fn ret(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    match token.children.first() {
        None => plain(&[0xc9]),
        Some(op) if is_cond(op) => plain(&[0xc0 | (cond_bits(op) << 3)]),
        Some(_) => Err(no_match(token)),
    }
}

fn rst(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op = &token.children[0];
    match literal_value(op) {
        Some(v) if v >= 0 && v <= 0x38 && v % 8 == 0 => {
            plain(&[0xc7 | (((v / 8) as u8) << 3)])
        }
        _ => Err(no_match(token)),
    }
}

fn port_in(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    let op2 = &token.children[1];
    if op1.is_reg8_named("a") && op2.is_mem_value() {
        return Ok(patched(&[0xdb, 0], 1, PatchKind::Byte, OperandRef::direct(1)));
    }
    // `[c]` scans as a bracketed register.
    if is_r_field(op1)
        && op2.kind == TokenKind::Register8
        && op2.memref
        && op2.value.eq_ignore_ascii_case("c")
    {
        return plain(&[0xed, 0x40 | (reg8_bits(op1) << 3)]);
    }
    Err(no_match(token))
}

fn port_out(token: &Token) -> Result<(Opcode, Option<Patch>), AsmError> {
    let op1 = &token.children[0];
    let op2 = &token.children[1];
    if op1.is_mem_value() && op2.is_reg8_named("a") {
        return Ok(patched(&[0xd3, 0], 1, PatchKind::Byte, OperandRef::direct(0)));
    }
    if op1.kind == TokenKind::Register8 && op1.memref && op1.value.eq_ignore_ascii_case("c")
        && is_r_field(op2)
    {
        return plain(&[0xed, 0x41 | (reg8_bits(op2) << 3)]);
    }
    Err(no_match(token))
}

/// The no-operand instructions.
fn fixed(token: &Token, mnemonic: &str) -> Result<(Opcode, Option<Patch>), AsmError> {
    let bytes: &[u8] = match mnemonic {
        "nop" => &[0x00],
        "halt" => &[0x76],
        "di" => &[0xf3],
        "ei" => &[0xfb],
        "daa" => &[0x27],
        "cpl" => &[0x2f],
        "ccf" => &[0x3f],
        "scf" => &[0x37],
        "exx" => &[0xd9],
        "rlca" => &[0x07],
        "rla" => &[0x17],
        "rrca" => &[0x0f],
        "rra" => &[0x1f],
        "neg" => &[0xed, 0x44],
        "rld" => &[0xed, 0x6f],
        "rrd" => &[0xed, 0x67],
        "reti" => &[0xed, 0x4d],
        "retn" => &[0xed, 0x45],
        "ldi" => &[0xed, 0xa0],
        "ldir" => &[0xed, 0xb0],
        "ldd" => &[0xed, 0xa8],
        "lddr" => &[0xed, 0xb8],
        "cpi" => &[0xed, 0xa1],
        "cpir" => &[0xed, 0xb1],
        "cpd" => &[0xed, 0xa9],
        "cpdr" => &[0xed, 0xb9],
        "ini" => &[0xed, 0xa2],
        "inir" => &[0xed, 0xb2],
        "ind" => &[0xed, 0xaa],
        "indr" => &[0xed, 0xba],
        "outi" => &[0xed, 0xa3],
        "otir" => &[0xed, 0xb3],
        "outd" => &[0xed, 0xab],
        "otdr" => &[0xed, 0xbb],
        _ => {
            return Err(AsmError::encoding(
                token.pos.clone(),
                &token.value,
                format!("unknown instruction `{}`", token.value),
            ))
        }
    };
    plain(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsmErrorKind;
    use crate::expression::flatten_operands;
    use crate::tokenizer::{self, RootSink};

    struct Collect(Vec<Token>);

    impl RootSink for Collect {
        fn address(&self) -> i64 {
            0
        }

        fn accept_root(&mut self, mut root: Token) -> Result<(), AsmError> {
            flatten_operands(&mut root);
            self.0.push(root);
            Ok(())
        }
    }

    fn encode_line(line: &str) -> Result<(Opcode, Option<Patch>), AsmError> {
        let mut sink = Collect(Vec::new());
        tokenizer::scan(line, "test.z80".into(), &mut sink).expect("scan failed");
        encode(&sink.0[0])
    }

    fn bytes(line: &str) -> Vec<u8> {
        let (opcode, _) = encode_line(line).unwrap_or_else(|err| panic!("{line}: {err}"));
        opcode.bytes().to_vec()
    }

    fn patch_of(line: &str) -> Patch {
        let (_, patch) = encode_line(line).unwrap_or_else(|err| panic!("{line}: {err}"));
        patch.unwrap_or_else(|| panic!("{line}: no patch recorded"))
    }

    fn err_kind(line: &str) -> AsmErrorKind {
        encode_line(line).unwrap_err().kind
    }

    #[test]
    fn register_moves() {
        assert_eq!(bytes("ld a, b"), vec![0x78]);
        assert_eq!(bytes("ld b, l"), vec![0x45]);
        assert_eq!(bytes("ld a, [hl]"), vec![0x7e]);
        assert_eq!(bytes("ld [hl], e"), vec![0x73]);
        assert_eq!(bytes("ld a, i"), vec![0xed, 0x57]);
        assert_eq!(bytes("ld r, a"), vec![0xed, 0x4f]);
    }

    #[test]
    fn immediate_loads_record_patches() {
        assert_eq!(bytes("ld a, 5"), vec![0x3e, 0]);
        let patch = patch_of("ld a, 5");
        assert_eq!(patch.offset, 1);
        assert_eq!(patch.kind, PatchKind::Byte);
        assert_eq!(patch.source, OperandRef::direct(1));

        assert_eq!(bytes("ld hl, 0x1234"), vec![0x21, 0, 0]);
        assert_eq!(patch_of("ld hl, 0x1234").kind, PatchKind::Word);
        assert_eq!(bytes("ld ix, 0x1234"), vec![0xdd, 0x21, 0, 0]);
        assert_eq!(patch_of("ld ix, 0x1234").offset, 2);
    }

    #[test]
    fn indexed_loads() {
        assert_eq!(bytes("ld a, [ix + 5]"), vec![0xdd, 0x7e, 0]);
        let patch = patch_of("ld a, [ix + 5]");
        assert_eq!(patch.offset, 2);
        assert_eq!(patch.source, OperandRef::nested(1, 1));

        assert_eq!(bytes("ld [iy + 2], b"), vec![0xfd, 0x70, 0]);
        assert_eq!(patch_of("ld [iy + 2], b").source, OperandRef::nested(0, 1));

        // Inline displacement plus patched immediate.
        assert_eq!(bytes("ld [ix + 3], 7"), vec![0xdd, 0x36, 3, 0]);
        assert_eq!(patch_of("ld [ix + 3], 7").offset, 3);
    }

    #[test]
    fn absolute_loads() {
        assert_eq!(bytes("ld a, [0x4000]"), vec![0x3a, 0, 0]);
        assert_eq!(bytes("ld [0x4000], a"), vec![0x32, 0, 0]);
        assert_eq!(patch_of("ld [0x4000], a").source, OperandRef::direct(0));
        assert_eq!(bytes("ld hl, [0x4000]"), vec![0x2a, 0, 0]);
        assert_eq!(bytes("ld bc, [0x4000]"), vec![0xed, 0x4b, 0, 0]);
        assert_eq!(bytes("ld [0x4000], de"), vec![0xed, 0x53, 0, 0]);
        assert_eq!(bytes("ld [0x4000], iy"), vec![0xfd, 0x22, 0, 0]);
    }

    #[test]
    fn stack_pointer_loads() {
        assert_eq!(bytes("ld sp, hl"), vec![0xf9]);
        assert_eq!(bytes("ld sp, ix"), vec![0xdd, 0xf9]);
        assert_eq!(bytes("ld sp, 0x8000"), vec![0x31, 0, 0]);
    }

    #[test]
    fn stack_and_exchange() {
        assert_eq!(bytes("push bc"), vec![0xc5]);
        assert_eq!(bytes("push af"), vec![0xf5]);
        assert_eq!(bytes("pop iy"), vec![0xfd, 0xe1]);
        assert_eq!(bytes("ex de, hl"), vec![0xeb]);
        assert_eq!(bytes("ex af, af'"), vec![0x08]);
        assert_eq!(bytes("ex [sp], ix"), vec![0xdd, 0xe3]);
    }

    #[test]
    fn accumulator_arithmetic() {
        assert_eq!(bytes("add a, c"), vec![0x81]);
        assert_eq!(bytes("add a, 1"), vec![0xc6, 0]);
        assert_eq!(bytes("adc a, [hl]"), vec![0x8e]);
        assert_eq!(bytes("sub 3"), vec![0xd6, 0]);
        assert_eq!(bytes("sub [ix + 1]"), vec![0xdd, 0x96, 0]);
        assert_eq!(patch_of("sub [ix + 1]").source, OperandRef::nested(0, 1));
        assert_eq!(bytes("sbc a, b"), vec![0x98]);
        assert_eq!(bytes("and 0x0f"), vec![0xe6, 0]);
        assert_eq!(bytes("or [hl]"), vec![0xb6]);
        assert_eq!(bytes("xor a"), vec![0xaf]);
        assert_eq!(bytes("cp 'Q'"), vec![0xfe, 0]);
    }

    #[test]
    fn sixteen_bit_arithmetic() {
        assert_eq!(bytes("add hl, de"), vec![0x19]);
        assert_eq!(bytes("add ix, sp"), vec![0xdd, 0x39]);
        assert_eq!(bytes("adc hl, bc"), vec![0xed, 0x4a]);
        assert_eq!(bytes("sbc hl, sp"), vec![0xed, 0x72]);
    }

    #[test]
    fn inc_dec_forms() {
        assert_eq!(bytes("inc d"), vec![0x14]);
        assert_eq!(bytes("inc [hl]"), vec![0x34]);
        assert_eq!(bytes("inc [ix + 1]"), vec![0xdd, 0x34, 0]);
        assert_eq!(bytes("inc iy"), vec![0xfd, 0x23]);
        assert_eq!(bytes("inc sp"), vec![0x33]);
        assert_eq!(bytes("dec bc"), vec![0x0b]);
        assert_eq!(bytes("dec ix"), vec![0xdd, 0x2b]);
        assert_eq!(bytes("dec [hl]"), vec![0x35]);
    }

    #[test]
    fn rotates_and_shifts() {
        assert_eq!(bytes("rlc b"), vec![0xcb, 0x00]);
        assert_eq!(bytes("rl a"), vec![0xcb, 0x17]);
        assert_eq!(bytes("sla [hl]"), vec![0xcb, 0x26]);
        assert_eq!(bytes("srl e"), vec![0xcb, 0x3b]);
        // Displacement precedes the operation byte in the indexed form.
        assert_eq!(bytes("rr [ix + 4]"), vec![0xdd, 0xcb, 0, 0x1e]);
        assert_eq!(patch_of("rr [ix + 4]").offset, 2);
    }

    #[test]
    fn bit_operations() {
        assert_eq!(bytes("bit 7, a"), vec![0xcb, 0x7f]);
        assert_eq!(bytes("res 0, [hl]"), vec![0xcb, 0x86]);
        assert_eq!(bytes("set 3, [ix + 2]"), vec![0xdd, 0xcb, 0, 0xde]);
        assert_eq!(patch_of("set 3, [ix + 2]").source, OperandRef::nested(1, 1));
        assert_eq!(err_kind("bit 8, a"), AsmErrorKind::Encoding);
        assert_eq!(err_kind("bit flag, a"), AsmErrorKind::Encoding);
    }

    #[test]
    fn jumps_and_calls() {
        assert_eq!(bytes("jp 0x100"), vec![0xc3, 0, 0]);
        assert_eq!(bytes("jp nz, 0x100"), vec![0xc2, 0, 0]);
        assert_eq!(bytes("jp m, 0x100"), vec![0xfa, 0, 0]);
        assert_eq!(bytes("jp [hl]"), vec![0xe9]);
        assert_eq!(bytes("jp [iy]"), vec![0xfd, 0xe9]);
        assert_eq!(bytes("call 0x100"), vec![0xcd, 0, 0]);
        assert_eq!(bytes("call po, 0x100"), vec![0xe4, 0, 0]);
        assert_eq!(bytes("ret"), vec![0xc9]);
        assert_eq!(bytes("ret c"), vec![0xd8]);
    }

    #[test]
    fn relative_jumps() {
        assert_eq!(bytes("jr 5"), vec![0x18, 0]);
        assert_eq!(patch_of("jr 5").kind, PatchKind::Relative);
        assert_eq!(bytes("jr nz, 5"), vec![0x20, 0]);
        assert_eq!(bytes("djnz 5"), vec![0x10, 0]);
        // po/pe/p/m have no relative form.
        assert_eq!(err_kind("jr po, 5"), AsmErrorKind::Encoding);
    }

    #[test]
    fn restarts_and_interrupt_modes() {
        assert_eq!(bytes("rst 0"), vec![0xc7]);
        assert_eq!(bytes("rst 0x10"), vec![0xd7]);
        assert_eq!(bytes("rst 0x38"), vec![0xff]);
        assert_eq!(err_kind("rst 0x12"), AsmErrorKind::Encoding);
        assert_eq!(bytes("im 1"), vec![0xed, 0x56]);
        assert_eq!(err_kind("im 3"), AsmErrorKind::Encoding);
    }

    #[test]
    fn port_io() {
        assert_eq!(bytes("in a, [0x10]"), vec![0xdb, 0]);
        assert_eq!(patch_of("in a, [0x10]").kind, PatchKind::Byte);
        assert_eq!(bytes("in e, [c]"), vec![0xed, 0x58]);
        assert_eq!(bytes("out [0x10], a"), vec![0xd3, 0]);
        assert_eq!(bytes("out [c], a"), vec![0xed, 0x79]);
        assert_eq!(bytes("out [c], d"), vec![0xed, 0x51]);
    }

    #[test]
    fn block_and_misc() {
        assert_eq!(bytes("nop"), vec![0x00]);
        assert_eq!(bytes("exx"), vec![0xd9]);
        assert_eq!(bytes("ldir"), vec![0xed, 0xb0]);
        assert_eq!(bytes("cpdr"), vec![0xed, 0xb9]);
        assert_eq!(bytes("otir"), vec![0xed, 0xb3]);
        assert_eq!(bytes("neg"), vec![0xed, 0x44]);
        assert_eq!(bytes("rld"), vec![0xed, 0x6f]);
    }

    #[test]
    fn arity_is_checked_first() {
        let err = encode_line("nop 1").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::Arity);
        assert_eq!(err_kind("ld a"), AsmErrorKind::Arity);
        assert_eq!(err_kind("jp z, 1, 2"), AsmErrorKind::Arity);
    }

    #[test]
    fn shape_mismatches_are_encoding_errors() {
        assert_eq!(err_kind("ld a, bc"), AsmErrorKind::Encoding);
        assert_eq!(err_kind("add hl, 5"), AsmErrorKind::Encoding);
        assert_eq!(err_kind("push a"), AsmErrorKind::Encoding);
    }

    #[test]
    fn malformed_index_chains_are_rejected() {
        assert_eq!(err_kind("ld a, [ix + 1 + 2]"), AsmErrorKind::Encoding);
        assert_eq!(err_kind("ld a, [ix - 1]"), AsmErrorKind::Encoding);
    }
}
