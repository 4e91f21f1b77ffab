// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SYNCHRONIZE CACHE (10), opcode 0x35. `blocks == 0` means "to the end of
//! the medium".

use crate::{
    control_block::cdb::{Cdb, ensure_below},
    error::CdbError,
};

pub const SYNCHRONIZE_CACHE_10: u8 = 0x35;

const IMMED: u8 = 0b0000_0010;

pub fn build_synchronize_cache10(lba: u64, blocks: u32, immed: bool) -> Result<Cdb, CdbError> {
    ensure_below("lba", lba, 1 << 32)?;
    ensure_below("number of blocks", u64::from(blocks), 1 << 16)?;
    let mut cdb = Cdb::new(SYNCHRONIZE_CACHE_10, 10);
    if immed {
        cdb.set(1, IMMED);
    }
    cdb.put(2, &(lba as u32).to_be_bytes());
    cdb.put(7, &(blocks as u16).to_be_bytes());
    Ok(cdb)
}
