// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! REPORT LUNS (0xA0).
//!
//! Response layout:
//!   [0..4] = LUN LIST LENGTH (bytes, multiple of 8)
//!   [4..8] = reserved
//!   [8..]  = LUN entries (8 bytes each)

use crate::{control_block::cdb::Cdb, error::DataInError};

pub const REPORT_LUNS: u8 = 0xA0;

/// SELECT REPORT values (byte 2).
pub mod select_report {
    pub const ALL: u8 = 0x00;
    pub const WELL_KNOWN: u8 = 0x01;
    pub const ALL_MAPPED: u8 = 0x02;
}

#[inline]
pub fn build_report_luns(select: u8, allocation_len: u32) -> Cdb {
    let mut cdb = Cdb::new(REPORT_LUNS, 12);
    cdb.set(2, select);
    cdb.put(6, &allocation_len.to_be_bytes());
    cdb
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLuns {
    /// LUN LIST LENGTH as reported; may exceed what was transferred.
    pub list_len: u32,
    /// Raw 8-byte LUN entries, big-endian.
    pub luns: Vec<u64>,
}

impl ReportLuns {
    /// True when the allocation length cut the list short.
    pub fn is_truncated(&self) -> bool {
        self.luns.len() * 8 < self.list_len as usize
    }

    /// LUN numbers for peripheral (00b) and flat (01b) addressing; other
    /// methods are skipped.
    pub fn lun_ids(&self) -> Vec<u16> {
        self.luns.iter().filter_map(|raw| lun_id(*raw)).collect()
    }
}

/// Decodes the first level of a SAM LUN.
pub fn lun_id(raw: u64) -> Option<u16> {
    let [b0, b1, ..] = raw.to_be_bytes();
    match b0 >> 6 {
        0b00 => Some(u16::from(b1)),
        0b01 => Some(u16::from_be_bytes([b0 & 0x3F, b1])),
        _ => None,
    }
}

/// Encodes a LUN number for the BHS LUN field: peripheral addressing below
/// 256, flat addressing above.
pub fn encode_lun(id: u16) -> u64 {
    let [hi, lo] = id.to_be_bytes();
    let first = if id < 256 { [0, lo] } else { [0x40 | (hi & 0x3F), lo] };
    u64::from(u16::from_be_bytes(first)) << 48
}

pub fn parse_report_luns(buf: &[u8]) -> Result<ReportLuns, DataInError> {
    if buf.len() < 8 {
        return Err(DataInError::Truncated {
            what: "REPORT LUNS header",
            need: 8,
            got: buf.len(),
        });
    }
    let list_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let avail = (buf.len() - 8).min(list_len as usize);
    let luns = buf[8..8 + avail]
        .chunks_exact(8)
        .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    Ok(ReportLuns { list_len, luns })
}
