// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command Descriptor Block container shared by every builder.
//!
//! iSCSI always carries a 16-byte CDB field; `Cdb` keeps the used length
//! next to the bytes so callers never have to know the command width.

use core::fmt;

use crate::error::CdbError;

pub const MAX_CDB_LEN: usize = 16;

bitflags::bitflags! {
    /// Byte 1 of the READ/WRITE/VERIFY 10/12/16 CDBs.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RwFlags: u8 {
        /// RDPROTECT / WRPROTECT / VRPROTECT
        const PROTECT_MASK = 0b1110_0000;
        /// Disable page out
        const DPO = 0b0001_0000;
        /// Force unit access
        const FUA = 0b0000_1000;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cdb {
    bytes: [u8; MAX_CDB_LEN],
    len: u8,
}

impl Cdb {
    /// Zeroed CDB of `len` bytes with `opcode` in byte 0.
    pub(crate) fn new(opcode: u8, len: usize) -> Self {
        let mut bytes = [0u8; MAX_CDB_LEN];
        bytes[0] = opcode;
        Self {
            bytes,
            len: len.min(MAX_CDB_LEN) as u8,
        }
    }

    /// Wraps a caller-built CDB (vendor commands and the like).
    pub fn from_slice(raw: &[u8]) -> Result<Self, CdbError> {
        if raw.is_empty() || raw.len() > MAX_CDB_LEN {
            return Err(CdbError::InvalidParameter {
                field: "cdb length",
                value: raw.len() as u64,
                limit: MAX_CDB_LEN as u64,
            });
        }
        let mut cdb = Self::new(raw[0], raw.len());
        cdb.bytes[..raw.len()].copy_from_slice(raw);
        Ok(cdb)
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Full 16-byte field as it goes into the SCSI Command BHS.
    #[inline]
    pub fn padded(&self) -> [u8; MAX_CDB_LEN] {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn set(&mut self, idx: usize, v: u8) {
        self.bytes[idx] = v;
    }

    #[inline]
    pub(crate) fn put(&mut self, at: usize, src: &[u8]) {
        self.bytes[at..at + src.len()].copy_from_slice(src);
    }
}

impl AsRef<[u8]> for Cdb {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Cdb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cdb({})", hex::encode(self.as_bytes()))
    }
}

/// `value` must be strictly below `limit`.
#[inline]
pub(crate) fn ensure_below(field: &'static str, value: u64, limit: u64) -> Result<(), CdbError> {
    if value >= limit {
        return Err(CdbError::InvalidParameter {
            field,
            value,
            limit,
        });
    }
    Ok(())
}

/// LBA + transfer length layouts shared by READ/WRITE/VERIFY.
///
/// | width | LBA          | length       |
/// |-------|--------------|--------------|
/// | 6     | 21 bits, 1..4 | 8 bits, 4   |
/// | 10    | 32 bits, 2..6 | 16 bits, 7..9 |
/// | 12    | 32 bits, 2..6 | 32 bits, 6..10 |
/// | 16    | 64 bits, 2..10 | 32 bits, 10..14 |
pub(crate) fn block_cdb6(opcode: u8, lba: u64, blocks: u32) -> Result<Cdb, CdbError> {
    ensure_below("lba", lba, 1 << 21)?;
    ensure_below("transfer length", u64::from(blocks), 1 << 8)?;
    let mut cdb = Cdb::new(opcode, 6);
    let lba = lba as u32;
    cdb.set(1, ((lba >> 16) & 0x1f) as u8);
    cdb.put(2, &(lba as u16).to_be_bytes());
    cdb.set(4, blocks as u8);
    Ok(cdb)
}

pub(crate) fn block_cdb10(
    opcode: u8,
    lba: u64,
    blocks: u32,
    flags: RwFlags,
) -> Result<Cdb, CdbError> {
    ensure_below("lba", lba, 1 << 32)?;
    ensure_below("transfer length", u64::from(blocks), 1 << 16)?;
    let mut cdb = Cdb::new(opcode, 10);
    cdb.set(1, flags.bits());
    cdb.put(2, &(lba as u32).to_be_bytes());
    cdb.put(7, &(blocks as u16).to_be_bytes());
    Ok(cdb)
}

pub(crate) fn block_cdb12(
    opcode: u8,
    lba: u64,
    blocks: u32,
    flags: RwFlags,
) -> Result<Cdb, CdbError> {
    ensure_below("lba", lba, 1 << 32)?;
    let mut cdb = Cdb::new(opcode, 12);
    cdb.set(1, flags.bits());
    cdb.put(2, &(lba as u32).to_be_bytes());
    cdb.put(6, &blocks.to_be_bytes());
    Ok(cdb)
}

pub(crate) fn block_cdb16(opcode: u8, lba: u64, blocks: u32, flags: RwFlags) -> Cdb {
    let mut cdb = Cdb::new(opcode, 16);
    cdb.set(1, flags.bits());
    cdb.put(2, &lba.to_be_bytes());
    cdb.put(10, &blocks.to_be_bytes());
    cdb
}
