// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! READ CAPACITY (10) and READ CAPACITY (16) via SERVICE ACTION IN(16).
//!
//! A READ CAPACITY(10) answer with `max_lba == 0xFFFF_FFFF` means the device
//! is too large for the 10-byte form and READ CAPACITY(16) has to be used.

use zerocopy::{
    FromBytes, Immutable, KnownLayout,
    byteorder::{BigEndian, U32, U64},
};

use crate::{control_block::cdb::Cdb, error::DataInError};

pub const READ_CAPACITY_10: u8 = 0x25;
pub const SERVICE_ACTION_IN_16: u8 = 0x9E;
pub const SA_READ_CAPACITY_16: u8 = 0x10;

/// Parameter data length the target returns for READ CAPACITY(16).
pub const READ_CAPACITY_16_LEN: u32 = 32;

#[inline]
pub fn build_read_capacity10() -> Cdb {
    Cdb::new(READ_CAPACITY_10, 10)
}

#[inline]
pub fn build_read_capacity16(allocation_len: u32) -> Cdb {
    let mut cdb = Cdb::new(SERVICE_ACTION_IN_16, 16);
    cdb.set(1, SA_READ_CAPACITY_16);
    cdb.put(10, &allocation_len.to_be_bytes());
    cdb
}

/// Raw 8-byte READ CAPACITY(10) parameter data.
#[repr(C)]
#[derive(FromBytes, KnownLayout, Immutable, Debug)]
struct Rc10Raw {
    max_lba: U32<BigEndian>,
    block_len: U32<BigEndian>,
}

/// First 12 bytes of READ CAPACITY(16) parameter data; the rest is optional.
#[repr(C)]
#[derive(FromBytes, KnownLayout, Immutable, Debug)]
struct Rc16Raw {
    max_lba: U64<BigEndian>,
    block_len: U32<BigEndian>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCapacity10 {
    pub max_lba: u32,
    pub block_len: u32,
}

impl ReadCapacity10 {
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        (u64::from(self.max_lba) + 1) * u64::from(self.block_len)
    }

    #[inline]
    pub fn indicates_overflow(&self) -> bool {
        self.max_lba == u32::MAX
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadCapacity16 {
    pub max_lba: u64,
    pub block_len: u32,
    /// P_TYPE (byte 12 bits 3..1)
    pub protection_type: u8,
    pub prot_en: bool,
    /// LOGICAL BLOCKS PER PHYSICAL BLOCK EXPONENT
    pub lbppbe: u8,
    /// Thin provisioning enabled.
    pub lbpme: bool,
    pub lbprz: bool,
    pub lowest_aligned_lba: u16,
}

impl ReadCapacity16 {
    #[inline]
    pub fn total_bytes(&self) -> u128 {
        (u128::from(self.max_lba) + 1) * u128::from(self.block_len)
    }

    /// Number of addressable blocks.
    #[inline]
    pub fn block_count(&self) -> u128 {
        u128::from(self.max_lba) + 1
    }
}

pub fn parse_read_capacity10(buf: &[u8]) -> Result<ReadCapacity10, DataInError> {
    let (raw, _rest) = Rc10Raw::ref_from_prefix(buf).map_err(|_| DataInError::Truncated {
        what: "READ CAPACITY(10)",
        need: 8,
        got: buf.len(),
    })?;
    Ok(ReadCapacity10 {
        max_lba: raw.max_lba.get(),
        block_len: raw.block_len.get(),
    })
}

pub fn parse_read_capacity16(buf: &[u8]) -> Result<ReadCapacity16, DataInError> {
    let (raw, rest) = Rc16Raw::ref_from_prefix(buf).map_err(|_| DataInError::Truncated {
        what: "READ CAPACITY(16)",
        need: 12,
        got: buf.len(),
    })?;
    let mut out = ReadCapacity16 {
        max_lba: raw.max_lba.get(),
        block_len: raw.block_len.get(),
        ..Default::default()
    };
    if let [b12, b13, b14, b15, ..] = *rest {
        out.prot_en = b12 & 0x01 != 0;
        out.protection_type = (b12 >> 1) & 0x07;
        out.lbppbe = b13 & 0x0F;
        out.lbpme = b14 & 0x80 != 0;
        out.lbprz = b14 & 0x40 != 0;
        out.lowest_aligned_lba = u16::from_be_bytes([b14 & 0x3F, b15]);
    }
    Ok(out)
}
