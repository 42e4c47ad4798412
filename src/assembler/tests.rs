// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! End-to-end assembly tests: source text in, image bytes out.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use pretty_assertions::assert_eq;

use crate::assembler::{assemble_file, assemble_source, Assembly};
use crate::error::{AsmError, AsmErrorKind};

fn assemble(source: &str) -> Assembly {
    assemble_source(source, "test.z80")
        .unwrap_or_else(|err| panic!("assembly failed: {err}"))
}

fn assemble_bytes(source: &str) -> Vec<u8> {
    assemble(source).image
}

fn assemble_err(source: &str) -> AsmError {
    match assemble_source(source, "test.z80") {
        Ok(_) => panic!("assembly unexpectedly succeeded"),
        Err(err) => err,
    }
}

static TEMP_SEQ: AtomicU32 = AtomicU32::new(0);

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "zforge-{tag}-{}-{}",
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn single_nop() {
    assert_eq!(assemble_bytes("nop"), vec![0x00]);
}

#[test]
fn immediate_load_resolves_in_pass_two() {
    assert_eq!(assemble_bytes("ld a, 5"), vec![0x3e, 0x05]);
    assert_eq!(assemble_bytes("ld a, 'A'"), vec![0x3e, 0x41]);
    assert_eq!(assemble_bytes("ld hl, 0x1234"), vec![0x21, 0x34, 0x12]);
}

#[test]
fn indexed_displacement_resolves() {
    assert_eq!(assemble_bytes("ld a, [ix + 5]"), vec![0xdd, 0x7e, 0x05]);
    assert_eq!(assemble_bytes("ld [iy + 2], b"), vec![0xfd, 0x70, 0x02]);
    assert_eq!(assemble_bytes("ld [ix + 3], 7"), vec![0xdd, 0x36, 0x03, 0x07]);
}

#[test]
fn forward_reference_patches_in_pass_two() {
    let image = assemble_bytes("jp target\ntarget: nop");
    assert_eq!(image, vec![0xc3, 0x03, 0x00, 0x00]);
}

#[test]
fn origin_offsets_label_resolution() {
    let image = assemble_bytes("org 0x8000\nstart: jp start");
    assert_eq!(image, vec![0xc3, 0x00, 0x80]);
}

#[test]
fn relative_jump_subtracts_two() {
    let image = assemble_bytes("nop\ntarget: jr target");
    // target = 1, stored byte is 1 - 2.
    assert_eq!(image, vec![0x00, 0x18, 0xff]);
    let image = assemble_bytes("org 0x100\nloop: djnz loop");
    assert_eq!(image, vec![0x10, 0xfe]);
}

#[test]
fn db_mixes_strings_and_values() {
    assert_eq!(assemble_bytes("db \"AB\", 3"), vec![0x41, 0x42, 0x03]);
    assert_eq!(
        assemble_bytes("db 1 + 2 * 3, 0x10"),
        vec![0x07, 0x10]
    );
}

#[test]
fn dw_is_little_endian_and_rejects_strings() {
    assert_eq!(assemble_bytes("dw 0x1234, 5"), vec![0x34, 0x12, 0x05, 0x00]);
    let err = assemble_err("dw \"AB\"");
    assert_eq!(err.kind, AsmErrorKind::Directive);
}

#[test]
fn db_rejects_register_operands() {
    let err = assemble_err("db hl");
    assert_eq!(err.kind, AsmErrorKind::Directive);
}

#[test]
fn db_rejects_strings_with_operand_chains() {
    let err = assemble_err("db \"AB\" + 1");
    assert_eq!(err.kind, AsmErrorKind::Directive);
    assert_eq!(err.token, "AB");
}

#[test]
fn ds_reserves_and_fills() {
    assert_eq!(assemble_bytes("ds 3"), vec![0, 0, 0]);
    assert_eq!(assemble_bytes("ds 4, 0xff"), vec![0xff, 0xff, 0xff, 0xff]);
}

#[test]
fn ds_forward_reference_is_fatal() {
    let err = assemble_err("ds later\nlater: nop");
    assert_eq!(err.kind, AsmErrorKind::Directive);
}

#[test]
fn defines_expand_lazily() {
    assert_eq!(assemble_bytes("def size, 5\nld a, size"), vec![0x3e, 0x05]);
    assert_eq!(
        assemble_bytes("def a1, a2 + 1\ndef a2, 2\ndb a1"),
        vec![0x03]
    );
}

#[test]
fn duplicate_symbols_are_fatal() {
    let err = assemble_err("loop: nop\nloop: nop");
    assert_eq!(err.kind, AsmErrorKind::Symbol);
    assert!(err.message.contains("test.z80:1:1"), "{}", err.message);

    let err = assemble_err("def size, 5\nsize: nop");
    assert_eq!(err.kind, AsmErrorKind::Symbol);
}

#[test]
fn unresolved_identifier_is_fatal() {
    let err = assemble_err("ld a, nowhere");
    assert_eq!(err.kind, AsmErrorKind::Symbol);
    assert_eq!(err.token, "nowhere");
}

#[test]
fn division_by_zero_is_fatal() {
    let err = assemble_err("db 1 / 0");
    assert_eq!(err.kind, AsmErrorKind::Symbol);
}

#[test]
fn dollar_reads_the_statement_address() {
    assert_eq!(assemble_bytes("db 1\ndb $"), vec![0x01, 0x01]);
    let image = assemble_bytes("org 0x8000\ndw $");
    assert_eq!(image, vec![0x00, 0x80]);
}

#[test]
fn image_length_matches_footprint_sum() {
    let source = "org 0x4000\n\
                  start: ld a, 5\n\
                  ld hl, msg\n\
                  ldir\n\
                  msg: db \"hello\", 0\n\
                  dw start\n\
                  ds 3, 1\n";
    // 2 + 3 + 2 + 6 + 2 + 3
    assert_eq!(assemble_bytes(source).len(), 18);
}

#[test]
fn assembly_is_idempotent() {
    let source = "org 0x100\nstart: ld b, 10\nloop: djnz loop\njp start\n";
    assert_eq!(assemble_bytes(source), assemble_bytes(source));
}

#[test]
fn include_splices_at_the_directive() {
    let dir = temp_dir("include");
    fs::write(dir.join("inner.z80"), "db 2\n").expect("write inner");
    fs::write(dir.join("main.z80"), "db 1\ninclude \"inner.z80\"\ndb 3\n")
        .expect("write main");
    let assembly = assemble_file(&dir.join("main.z80"), None).expect("assembly failed");
    assert_eq!(assembly.image, vec![1, 2, 3]);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn include_shares_the_symbol_space() {
    let dir = temp_dir("include-dup");
    fs::write(dir.join("inner.z80"), "loop: nop\n").expect("write inner");
    fs::write(dir.join("main.z80"), "loop: nop\ninclude \"inner.z80\"\n")
        .expect("write main");
    let err = assemble_file(&dir.join("main.z80"), None).unwrap_err();
    assert_eq!(err.kind, AsmErrorKind::Symbol);
    assert!(err.message.contains("main.z80:1:1"), "{}", err.message);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn incbin_copies_raw_bytes() {
    let dir = temp_dir("incbin");
    fs::write(dir.join("blob.bin"), [0xde, 0xad, 0xbe, 0xef]).expect("write blob");
    fs::write(dir.join("main.z80"), "db 1\nincbin \"blob.bin\"\ndb 2\n")
        .expect("write main");
    let assembly = assemble_file(&dir.join("main.z80"), None).expect("assembly failed");
    assert_eq!(assembly.image, vec![1, 0xde, 0xad, 0xbe, 0xef, 2]);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_include_is_io_error() {
    let err = assemble_err("include \"no-such-file.z80\"");
    assert_eq!(err.kind, AsmErrorKind::Io);
}

#[test]
fn import_and_export_round_trip() {
    let dir = temp_dir("labels");
    let side = dir.join("side.txt");
    fs::write(dir.join("lib.z80"), "org 0x8000\nentry: nop\n_local: ret\n")
        .expect("write lib");
    let assembly = assemble_file(&dir.join("lib.z80"), None).expect("assembly failed");
    let mut out = Vec::new();
    assembly.write_exports(&mut out, false).expect("export failed");
    fs::write(&side, &out).expect("write side-file");
    // Labels export their pre-origin binding; resolution re-applies the
    // origin of the importing unit's use site.
    assert_eq!(String::from_utf8(out).unwrap(), "entry 0\n");

    fs::write(dir.join("main.z80"), "org 0x8000\njp entry\n").expect("write main");
    let assembly =
        assemble_file(&dir.join("main.z80"), Some(&side)).expect("assembly failed");
    assert_eq!(assembly.image, vec![0xc3, 0x00, 0x80]);
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn exported_defines_are_evaluated() {
    let assembly = assemble("def width, 8\ndef area, width * width\nstart: nop");
    let mut out = Vec::new();
    assembly.write_exports(&mut out, true).expect("export failed");
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "start 0\nwidth 8\narea 64\n"
    );
}

#[test]
fn errors_carry_source_positions() {
    let err = assemble_err("nop\n  ld a, [ix + 1 + 2]\n");
    assert_eq!(err.kind, AsmErrorKind::Encoding);
    let pos = err.pos.expect("position missing");
    assert_eq!(pos.line, 2);
}
