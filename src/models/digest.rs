// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CRC32C (Castagnoli) header and data digests, RFC 7143 § 13.1.
//!
//! The digest is transmitted least-significant byte first: 32 zero bytes
//! digest to `0x8A9136AA`, which appears on the wire as `aa 36 91 8a`.

use crc32c::crc32c_append;

use crate::utils::pad_len;

/// Size of a digest on the wire.
pub const DIGEST_LEN: usize = 4;

/// Incremental CRC32C over a sequence of chunks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Crc32c {
    state: u32,
}

impl Crc32c {
    pub const fn new() -> Self {
        Self { state: 0 }
    }

    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        if !chunk.is_empty() {
            self.state = crc32c_append(self.state, chunk);
        }
    }

    #[inline]
    pub fn finish(self) -> u32 {
        self.state
    }
}

/// One-shot CRC32C.
#[inline]
pub fn compute(bytes: &[u8]) -> u32 {
    let mut h = Crc32c::new();
    h.update(bytes);
    h.finish()
}

#[inline]
pub fn verify(bytes: &[u8], expected: u32) -> bool {
    compute(bytes) == expected
}

/// Digest over BHS + AHS. The AHS is always a multiple of four bytes, so no
/// padding is involved.
pub fn header_digest(bhs: &[u8], ahs: &[u8]) -> u32 {
    let mut h = Crc32c::new();
    h.update(bhs);
    h.update(ahs);
    h.finish()
}

/// Digest over the data segment including its zero padding.
pub fn data_digest(data: &[u8]) -> u32 {
    const ZEROS: [u8; 3] = [0; 3];
    let mut h = Crc32c::new();
    h.update(data);
    h.update(&ZEROS[..pad_len(data.len())]);
    h.finish()
}

#[inline]
pub fn to_wire(digest: u32) -> [u8; DIGEST_LEN] {
    digest.to_le_bytes()
}

#[inline]
pub fn from_wire(bytes: [u8; DIGEST_LEN]) -> u32 {
    u32::from_le_bytes(bytes)
}
