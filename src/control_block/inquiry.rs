// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (0x12) builders and response parsers.
//!
//! CDB layout (SPC-4):
//!   [1] = EVPD (bit 0)
//!   [2] = PAGE CODE (EVPD=1 only)
//!   [3..5] = ALLOCATION LENGTH (big-endian u16)

use crate::{control_block::cdb::Cdb, error::DataInError};

pub const INQUIRY: u8 = 0x12;

/// VPD pages with a typed parser.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VpdPage {
    SupportedPages = 0x00,
    UnitSerial = 0x80,
    DeviceId = 0x83,
    BlockLimits = 0xB0,
}

impl TryFrom<u8> for VpdPage {
    type Error = DataInError;

    fn try_from(v: u8) -> Result<Self, DataInError> {
        Ok(match v {
            0x00 => VpdPage::SupportedPages,
            0x80 => VpdPage::UnitSerial,
            0x83 => VpdPage::DeviceId,
            0xB0 => VpdPage::BlockLimits,
            _ => return Err(DataInError::Invalid(format!("no parser for VPD page 0x{v:02x}"))),
        })
    }
}

#[inline]
pub fn build_inquiry_standard(allocation_len: u16) -> Cdb {
    let mut cdb = Cdb::new(INQUIRY, 6);
    cdb.put(3, &allocation_len.to_be_bytes());
    cdb
}

#[inline]
pub fn build_inquiry_vpd(page: u8, allocation_len: u16) -> Cdb {
    let mut cdb = Cdb::new(INQUIRY, 6);
    cdb.set(1, 0x01);
    cdb.set(2, page);
    cdb.put(3, &allocation_len.to_be_bytes());
    cdb
}

/// Standard INQUIRY data (EVPD=0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryStandard {
    pub peripheral_qualifier: u8,
    pub device_type: u8,
    /// Removable medium.
    pub rmb: bool,
    pub version: u8,
    pub response_data_format: u8,
    pub additional_length: u8,
    pub vendor_id: String,
    pub product_id: String,
    pub product_rev: String,
}

pub fn parse_inquiry_standard(buf: &[u8]) -> Result<InquiryStandard, DataInError> {
    if buf.len() < 36 {
        return Err(DataInError::Truncated {
            what: "standard INQUIRY",
            need: 36,
            got: buf.len(),
        });
    }
    Ok(InquiryStandard {
        peripheral_qualifier: (buf[0] >> 5) & 0x07,
        device_type: buf[0] & 0x1F,
        rmb: buf[1] & 0x80 != 0,
        version: buf[2],
        response_data_format: buf[3] & 0x0F,
        additional_length: buf[4],
        vendor_id: trim_ascii(&buf[8..16]),
        product_id: trim_ascii(&buf[16..32]),
        product_rev: trim_ascii(&buf[32..36]),
    })
}

/// Splits a VPD page into (page code, payload) after checking its length.
fn vpd_payload(buf: &[u8], want: VpdPage) -> Result<&[u8], DataInError> {
    if buf.len() < 4 {
        return Err(DataInError::Truncated {
            what: "VPD header",
            need: 4,
            got: buf.len(),
        });
    }
    if buf[1] != want as u8 {
        return Err(DataInError::Invalid(format!(
            "expected VPD page 0x{:02x}, got 0x{:02x}",
            want as u8, buf[1]
        )));
    }
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        return Err(DataInError::Truncated {
            what: "VPD page",
            need: 4 + len,
            got: buf.len(),
        });
    }
    Ok(&buf[4..4 + len])
}

/// VPD 0x00: one page code per byte.
pub fn parse_vpd_supported_pages(buf: &[u8]) -> Result<Vec<u8>, DataInError> {
    Ok(vpd_payload(buf, VpdPage::SupportedPages)?.to_vec())
}

/// VPD 0x80: ASCII serial, space padded.
pub fn parse_vpd_unit_serial(buf: &[u8]) -> Result<String, DataInError> {
    Ok(trim_ascii(vpd_payload(buf, VpdPage::UnitSerial)?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdDescriptor {
    pub code_set: u8,
    pub piv: bool,
    pub association: u8,
    pub id_type: u8,
    /// ASCII/UTF-8 identifiers as text, binary ones as upper-case hex.
    pub identifier: String,
}

/// VPD 0x83. A truncated trailing descriptor ends the list.
pub fn parse_vpd_device_id(buf: &[u8]) -> Result<Vec<DeviceIdDescriptor>, DataInError> {
    let p = vpd_payload(buf, VpdPage::DeviceId)?;
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + 4 <= p.len() {
        let (b0, b1) = (p[off], p[off + 1]);
        let len = p[off + 3] as usize;
        let start = off + 4;
        let end = start + len;
        if end > p.len() {
            break;
        }
        let code_set = b0 & 0x0F;
        let id_bytes = &p[start..end];
        out.push(DeviceIdDescriptor {
            code_set,
            piv: b1 & 0x80 != 0,
            association: (b1 >> 4) & 0x03,
            id_type: b1 & 0x0F,
            identifier: match code_set {
                0x02 => trim_ascii(id_bytes),
                0x03 => String::from_utf8_lossy(id_bytes).trim_matches(['\0', ' ']).to_string(),
                _ => hex::encode_upper(id_bytes),
            },
        });
        off = end;
    }
    Ok(out)
}

/// VPD 0xB0, SBC-4 § 6.6.4. Fields beyond what the target returned read 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockLimits {
    pub wsnz: bool,
    pub max_compare_and_write_len: u8,
    pub optimal_transfer_len_granularity: u16,
    pub max_transfer_len: u32,
    pub optimal_transfer_len: u32,
    pub max_prefetch_len: u32,
    pub max_unmap_lba_count: u32,
    pub max_unmap_block_descriptor_count: u32,
    pub optimal_unmap_granularity: u32,
    pub unmap_granularity_alignment: Option<u32>,
    pub max_write_same_len: u64,
}

pub fn parse_vpd_block_limits(buf: &[u8]) -> Result<BlockLimits, DataInError> {
    let p = vpd_payload(buf, VpdPage::BlockLimits)?;
    // Offsets below are relative to the payload (page byte - 4).
    let u32_at = |off: usize| {
        p.get(off..off + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    };
    if p.len() < 12 {
        return Err(DataInError::Truncated {
            what: "block limits VPD",
            need: 16,
            got: buf.len(),
        });
    }
    let alignment = u32_at(28);
    Ok(BlockLimits {
        wsnz: p[0] & 0x01 != 0,
        max_compare_and_write_len: p[1],
        optimal_transfer_len_granularity: u16::from_be_bytes([p[2], p[3]]),
        max_transfer_len: u32_at(4),
        optimal_transfer_len: u32_at(8),
        max_prefetch_len: u32_at(12),
        max_unmap_lba_count: u32_at(16),
        max_unmap_block_descriptor_count: u32_at(20),
        optimal_unmap_granularity: u32_at(24),
        unmap_granularity_alignment: (alignment & 0x8000_0000 != 0)
            .then_some(alignment & 0x7FFF_FFFF),
        max_write_same_len: p
            .get(32..40)
            .map(|b| u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .unwrap_or(0),
    })
}

fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() && b != 0 { b as char } else { ' ' })
        .collect();
    s.trim().to_string()
}
