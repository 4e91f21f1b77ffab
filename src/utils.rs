// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

use rand::RngExt;

/// Generates a random ISID (6 bytes) and returns:
/// - `[u8; 6]` for direct use in the PDU
/// - `String` containing its hexadecimal representation (no prefix)
///
/// The two high bits of the first byte select the "OUI" ISID format (00b),
/// the remaining bits are random.
pub fn generate_isid() -> ([u8; 6], String) {
    let mut isid = [0u8; 6];
    rand::rng().fill(&mut isid);
    isid[0] &= 0x3F;

    let mut hex = String::with_capacity(12);
    for byte in &isid {
        let _ = write!(&mut hex, "{byte:02x}");
    }

    (isid, hex)
}

/// Number of zero bytes needed to bring `n` up to a 4-byte boundary.
#[inline]
pub const fn pad_len(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// RFC 1982 serial number comparison (32-bit): `a < b`.
#[inline]
pub fn sn_lt(a: u32, b: u32) -> bool {
    a != b && (b.wrapping_sub(a) as i32) > 0
}

/// RFC 1982 serial number comparison (32-bit): `a <= b`.
#[inline]
pub fn sn_le(a: u32, b: u32) -> bool {
    a == b || sn_lt(a, b)
}
