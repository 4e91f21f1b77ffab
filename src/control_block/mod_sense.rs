// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MODE SENSE / MODE SELECT (6 / 10), and the mode parameter list shared by
//! both directions.
//!
//! Parameter list: header (4 or 8 bytes), block descriptors, then pages.
//! Page header: PS(7) | SPF(6) | PAGE CODE(5..0), followed by either a
//! 1-byte length (SPF=0) or a subpage code and a 2-byte length (SPF=1).

use crate::{
    control_block::cdb::{Cdb, ensure_below},
    error::{CdbError, DataInError},
};

pub const MODE_SENSE_6: u8 = 0x1A;
pub const MODE_SENSE_10: u8 = 0x5A;
pub const MODE_SELECT_6: u8 = 0x15;
pub const MODE_SELECT_10: u8 = 0x55;

/// Page code asking for every page.
pub const ALL_PAGES: u8 = 0x3F;
pub const CACHING_PAGE: u8 = 0x08;
pub const CONTROL_PAGE: u8 = 0x0A;

const DBD: u8 = 0b0000_1000;
const LLBAA: u8 = 0b0001_0000;
const PF: u8 = 0b0001_0000;
const SP: u8 = 0b0000_0001;

#[inline]
fn flag(on: bool, bit: u8) -> u8 {
    if on { bit } else { 0 }
}

/// Page Control (PC), MODE SENSE byte 2 bits 7..6.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum PageControl {
    #[default]
    Current = 0b00,
    Changeable = 0b01,
    Default = 0b10,
    Saved = 0b11,
}

/// Page selection shared by MODE SENSE 6 and 10.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ModeSenseParams {
    pub pc: PageControl,
    pub page_code: u8,
    pub subpage_code: u8,
    /// Disable block descriptors.
    pub dbd: bool,
}

impl ModeSenseParams {
    pub fn page(page_code: u8) -> Self {
        Self {
            page_code,
            ..Default::default()
        }
    }

    fn page_byte(&self) -> Result<u8, CdbError> {
        ensure_below("page code", u64::from(self.page_code), 64)?;
        Ok(((self.pc as u8) << 6) | self.page_code)
    }
}

pub fn build_mode_sense6(p: ModeSenseParams, allocation_len: u8) -> Result<Cdb, CdbError> {
    let mut cdb = Cdb::new(MODE_SENSE_6, 6);
    if p.dbd {
        cdb.set(1, DBD);
    }
    cdb.set(2, p.page_byte()?);
    cdb.set(3, p.subpage_code);
    cdb.set(4, allocation_len);
    Ok(cdb)
}

pub fn build_mode_sense10(
    p: ModeSenseParams,
    llbaa: bool,
    allocation_len: u16,
) -> Result<Cdb, CdbError> {
    let mut cdb = Cdb::new(MODE_SENSE_10, 10);
    cdb.set(1, flag(p.dbd, DBD) | flag(llbaa, LLBAA));
    cdb.set(2, p.page_byte()?);
    cdb.set(3, p.subpage_code);
    cdb.put(7, &allocation_len.to_be_bytes());
    Ok(cdb)
}

/// MODE SELECT(6). `param_len` is the length of the parameter list sent as
/// Data-Out; it must fit one byte.
pub fn build_mode_select6(pf: bool, sp: bool, param_len: usize) -> Result<Cdb, CdbError> {
    ensure_below("parameter list length", param_len as u64, 1 << 8)?;
    let mut cdb = Cdb::new(MODE_SELECT_6, 6);
    cdb.set(1, flag(pf, PF) | flag(sp, SP));
    cdb.set(4, param_len as u8);
    Ok(cdb)
}

pub fn build_mode_select10(pf: bool, sp: bool, param_len: usize) -> Result<Cdb, CdbError> {
    ensure_below("parameter list length", param_len as u64, 1 << 16)?;
    let mut cdb = Cdb::new(MODE_SELECT_10, 10);
    cdb.set(1, flag(pf, PF) | flag(sp, SP));
    cdb.put(7, &(param_len as u16).to_be_bytes());
    Ok(cdb)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub block_count: u64,
    pub block_len: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModePage {
    pub page_code: u8,
    /// `Some` for SPF=1 (sub-page format).
    pub subpage: Option<u8>,
    /// Parameters savable.
    pub ps: bool,
    pub data: Vec<u8>,
}

impl ModePage {
    /// Serializes the page for MODE SELECT (PS is reserved there and sent as 0).
    pub fn encode(&self) -> Vec<u8> {
        let code = self.page_code & 0x3F;
        let mut out = Vec::with_capacity(self.data.len() + 4);
        match self.subpage {
            None => {
                out.push(code);
                out.push(self.data.len() as u8);
            },
            Some(sub) => {
                out.push(0x40 | code);
                out.push(sub);
                out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
            },
        }
        out.extend_from_slice(&self.data);
        out
    }
}

/// Decoded MODE SENSE parameter data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSense {
    pub mode_data_len: u16,
    pub medium_type: u8,
    pub device_specific: u8,
    pub long_lba: bool,
    pub block_descriptors: Vec<BlockDescriptor>,
    pub pages: Vec<ModePage>,
}

impl ModeSense {
    /// WP bit of the device-specific parameter for direct-access devices.
    #[inline]
    pub fn write_protected(&self) -> bool {
        self.device_specific & 0x80 != 0
    }

    pub fn page(&self, code: u8) -> Option<&ModePage> {
        self.pages.iter().find(|p| p.page_code == code)
    }
}

pub fn parse_mode_sense6(buf: &[u8]) -> Result<ModeSense, DataInError> {
    if buf.len() < 4 {
        return Err(DataInError::Truncated {
            what: "MODE SENSE(6) header",
            need: 4,
            got: buf.len(),
        });
    }
    // MODE DATA LENGTH excludes itself.
    let total = (buf[0] as usize + 1).min(buf.len());
    parse_body(
        &buf[..total],
        4,
        buf[3] as usize,
        false,
        ModeSense {
            mode_data_len: u16::from(buf[0]),
            medium_type: buf[1],
            device_specific: buf[2],
            long_lba: false,
            block_descriptors: Vec::new(),
            pages: Vec::new(),
        },
    )
}

pub fn parse_mode_sense10(buf: &[u8]) -> Result<ModeSense, DataInError> {
    if buf.len() < 8 {
        return Err(DataInError::Truncated {
            what: "MODE SENSE(10) header",
            need: 8,
            got: buf.len(),
        });
    }
    let mode_data_len = u16::from_be_bytes([buf[0], buf[1]]);
    let total = (mode_data_len as usize + 2).min(buf.len());
    let long_lba = buf[4] & 0x01 != 0;
    parse_body(
        &buf[..total],
        8,
        u16::from_be_bytes([buf[6], buf[7]]) as usize,
        long_lba,
        ModeSense {
            mode_data_len,
            medium_type: buf[2],
            device_specific: buf[3],
            long_lba,
            block_descriptors: Vec::new(),
            pages: Vec::new(),
        },
    )
}

fn parse_body(
    buf: &[u8],
    header_len: usize,
    bd_len: usize,
    long_lba: bool,
    mut out: ModeSense,
) -> Result<ModeSense, DataInError> {
    let bd_end = header_len + bd_len;
    if buf.len() < bd_end {
        return Err(DataInError::Truncated {
            what: "mode block descriptors",
            need: bd_end,
            got: buf.len(),
        });
    }
    let bd_size = if long_lba { 16 } else { 8 };
    for d in buf[header_len..bd_end].chunks_exact(bd_size) {
        out.block_descriptors.push(if long_lba {
            BlockDescriptor {
                block_count: u64::from_be_bytes([d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]]),
                block_len: u32::from_be_bytes([d[12], d[13], d[14], d[15]]),
            }
        } else {
            BlockDescriptor {
                block_count: u64::from(u32::from_be_bytes([d[0], d[1], d[2], d[3]])),
                block_len: u32::from_be_bytes([0, d[5], d[6], d[7]]),
            }
        });
    }

    let mut off = bd_end;
    while off + 2 <= buf.len() {
        let b0 = buf[off];
        let spf = b0 & 0x40 != 0;
        let (subpage, hdr, len) = if spf {
            if off + 4 > buf.len() {
                break;
            }
            (
                Some(buf[off + 1]),
                4,
                u16::from_be_bytes([buf[off + 2], buf[off + 3]]) as usize,
            )
        } else {
            (None, 2, buf[off + 1] as usize)
        };
        let start = off + hdr;
        let end = start + len;
        if end > buf.len() {
            return Err(DataInError::Truncated {
                what: "mode page",
                need: end,
                got: buf.len(),
            });
        }
        out.pages.push(ModePage {
            page_code: b0 & 0x3F,
            subpage,
            ps: b0 & 0x80 != 0,
            data: buf[start..end].to_vec(),
        });
        off = end;
    }
    Ok(out)
}

/// MODE SELECT(6) parameter list: a 4-byte header without block
/// descriptors, followed by `pages`.
pub fn encode_mode_parameters6(pages: &[ModePage]) -> Vec<u8> {
    let mut out = vec![0u8; 4];
    for p in pages {
        out.extend_from_slice(&p.encode());
    }
    out
}

/// MODE SELECT(10) parameter list: an 8-byte header, then `pages`.
pub fn encode_mode_parameters10(pages: &[ModePage]) -> Vec<u8> {
    let mut out = vec![0u8; 8];
    for p in pages {
        out.extend_from_slice(&p.encode());
    }
    out
}
