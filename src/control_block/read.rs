// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! READ (6 / 10 / 12 / 16), SBC-4 § 5.
//!
//! `blocks` is the TRANSFER LENGTH in logical blocks. READ(6) rejects
//! anything that does not fit its 8-bit field; 0 is passed through as is.

use crate::{
    control_block::cdb::{Cdb, RwFlags, block_cdb6, block_cdb10, block_cdb12, block_cdb16},
    error::CdbError,
};

pub const READ_6: u8 = 0x08;
pub const READ_10: u8 = 0x28;
pub const READ_12: u8 = 0xA8;
pub const READ_16: u8 = 0x88;

pub fn build_read6(lba: u64, blocks: u32) -> Result<Cdb, CdbError> {
    block_cdb6(READ_6, lba, blocks)
}

pub fn build_read10(lba: u64, blocks: u32, flags: RwFlags) -> Result<Cdb, CdbError> {
    block_cdb10(READ_10, lba, blocks, flags)
}

pub fn build_read12(lba: u64, blocks: u32, flags: RwFlags) -> Result<Cdb, CdbError> {
    block_cdb12(READ_12, lba, blocks, flags)
}

/// READ(16) accepts the full 64-bit LBA range and never fails.
pub fn build_read16(lba: u64, blocks: u32, flags: RwFlags) -> Result<Cdb, CdbError> {
    Ok(block_cdb16(READ_16, lba, blocks, flags))
}
