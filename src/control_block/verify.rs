// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! VERIFY (10 / 12 / 16).
//!
//! With `bytchk` the initiator sends the blocks to compare as Data-Out;
//! without it the target only checks the medium and no data moves.

use crate::{
    control_block::cdb::{Cdb, RwFlags, block_cdb10, block_cdb12, block_cdb16},
    error::CdbError,
};

pub const VERIFY_10: u8 = 0x2F;
pub const VERIFY_12: u8 = 0xAF;
pub const VERIFY_16: u8 = 0x8F;

const BYTCHK: u8 = 0b0000_0010;

fn with_bytchk(mut cdb: Cdb, bytchk: bool) -> Cdb {
    if bytchk {
        let b1 = cdb.as_bytes()[1] | BYTCHK;
        cdb.set(1, b1);
    }
    cdb
}

pub fn build_verify10(lba: u64, blocks: u32, bytchk: bool) -> Result<Cdb, CdbError> {
    Ok(with_bytchk(
        block_cdb10(VERIFY_10, lba, blocks, RwFlags::empty())?,
        bytchk,
    ))
}

pub fn build_verify12(lba: u64, blocks: u32, bytchk: bool) -> Result<Cdb, CdbError> {
    Ok(with_bytchk(
        block_cdb12(VERIFY_12, lba, blocks, RwFlags::empty())?,
        bytchk,
    ))
}

pub fn build_verify16(lba: u64, blocks: u32, bytchk: bool) -> Result<Cdb, CdbError> {
    Ok(with_bytchk(
        block_cdb16(VERIFY_16, lba, blocks, RwFlags::empty()),
        bytchk,
    ))
}
