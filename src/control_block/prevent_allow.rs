// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PREVENT ALLOW MEDIUM REMOVAL (0x1E). Byte 4 bits 1..0 carry PREVENT.

use crate::{
    control_block::cdb::{Cdb, ensure_below},
    error::CdbError,
};

pub const PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;

/// `prevent` is the raw 2-bit field: 0 allow, 1 prevent, 2/3 obsolete.
pub fn build_prevent_allow(prevent: u8) -> Result<Cdb, CdbError> {
    ensure_below("prevent", u64::from(prevent), 4)?;
    let mut cdb = Cdb::new(PREVENT_ALLOW_MEDIUM_REMOVAL, 6);
    cdb.set(4, prevent);
    Ok(cdb)
}

#[inline]
pub fn build_prevent_medium_removal(prevent: bool) -> Cdb {
    let mut cdb = Cdb::new(PREVENT_ALLOW_MEDIUM_REMOVAL, 6);
    cdb.set(4, u8::from(prevent));
    cdb
}
