// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! WRITE (6 / 10 / 12 / 16). Same field widths as READ.

use crate::{
    control_block::cdb::{Cdb, RwFlags, block_cdb6, block_cdb10, block_cdb12, block_cdb16},
    error::CdbError,
};

pub const WRITE_6: u8 = 0x0A;
pub const WRITE_10: u8 = 0x2A;
pub const WRITE_12: u8 = 0xAA;
pub const WRITE_16: u8 = 0x8A;

pub fn build_write6(lba: u64, blocks: u32) -> Result<Cdb, CdbError> {
    block_cdb6(WRITE_6, lba, blocks)
}

pub fn build_write10(lba: u64, blocks: u32, flags: RwFlags) -> Result<Cdb, CdbError> {
    block_cdb10(WRITE_10, lba, blocks, flags)
}

pub fn build_write12(lba: u64, blocks: u32, flags: RwFlags) -> Result<Cdb, CdbError> {
    block_cdb12(WRITE_12, lba, blocks, flags)
}

pub fn build_write16(lba: u64, blocks: u32, flags: RwFlags) -> Result<Cdb, CdbError> {
    Ok(block_cdb16(WRITE_16, lba, blocks, flags))
}
