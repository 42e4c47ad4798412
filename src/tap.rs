// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! ZX Spectrum `.tap` container.
//!
//! A tap file is a sequence of blocks, each preceded by a little-endian
//! u16 length. The image is wrapped as a code-file header block followed by
//! one data block; both end in a XOR checksum over their flag and payload
//! bytes.

/// Header block type for a code file.
const TYPE_CODE: u8 = 0x03;
/// Load address written into both header parameter words.
const LOAD_ADDR: u16 = 0x8000;
/// Fixed width of the program name field, space padded.
const NAME_LEN: usize = 10;

const FLAG_HEADER: u8 = 0x00;
const FLAG_DATA: u8 = 0xff;

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Wrap an assembled image in a two-block tap container. Names longer than
/// ten bytes are truncated, shorter ones space padded.
pub fn wrap(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(0x13);
    header.push(FLAG_HEADER);
    header.push(TYPE_CODE);
    let mut name_field = [b' '; NAME_LEN];
    for (slot, byte) in name_field.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    header.extend_from_slice(&name_field);
    header.extend_from_slice(&(data.len() as u16).to_le_bytes());
    header.extend_from_slice(&LOAD_ADDR.to_le_bytes());
    header.extend_from_slice(&LOAD_ADDR.to_le_bytes());
    header.push(xor_checksum(&header));

    let mut out = Vec::with_capacity(header.len() + data.len() + 6);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(&header);

    out.extend_from_slice(&((data.len() + 2) as u16).to_le_bytes());
    out.push(FLAG_DATA);
    out.extend_from_slice(data);
    out.push(FLAG_DATA ^ xor_checksum(data));
    out
}
