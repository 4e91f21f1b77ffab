// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCSI sense data, SPC-4 § 4.5.
//!
//! Both the fixed (0x70/0x71) and the descriptor (0x72/0x73) formats are
//! understood. Parsing never fails: a buffer that is too short or carries an
//! unknown response code produces a [`SenseData`] marked
//! [`SenseFormat::Unparsed`] holding whatever fields could be read.

use std::fmt;

/// Sense data must be at least 18 bytes for the full fixed format.
pub const FIXED_MIN_LEN: usize = 18;
/// Header length of descriptor-format sense data.
pub const DESCRIPTOR_HEADER_LEN: usize = 8;

/// ASC/ASCQ pairs the engine and its callers branch on.
pub mod asc {
    pub const NO_ADDITIONAL_SENSE: (u8, u8) = (0x00, 0x00);
    pub const INVALID_COMMAND_OPERATION_CODE: (u8, u8) = (0x20, 0x00);
    pub const LBA_OUT_OF_RANGE: (u8, u8) = (0x21, 0x00);
    pub const INVALID_FIELD_IN_CDB: (u8, u8) = (0x24, 0x00);
    pub const LOGICAL_UNIT_NOT_SUPPORTED: (u8, u8) = (0x25, 0x00);
    pub const INVALID_FIELD_IN_PARAMETER_LIST: (u8, u8) = (0x26, 0x00);
    pub const POWER_ON_RESET: (u8, u8) = (0x29, 0x00);
    pub const PARAMETERS_CHANGED: (u8, u8) = (0x2A, 0x01);
    pub const MEDIUM_NOT_PRESENT: (u8, u8) = (0x3A, 0x00);
    pub const REPORTED_LUNS_DATA_HAS_CHANGED: (u8, u8) = (0x3F, 0x0E);
    pub const MEDIUM_REMOVAL_PREVENTED: (u8, u8) = (0x53, 0x02);
}

/// SPC-4 sense keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SenseKey {
    #[default]
    NoSense,
    RecoveredError,
    NotReady,
    MediumError,
    HardwareError,
    IllegalRequest,
    UnitAttention,
    DataProtect,
    BlankCheck,
    VendorSpecific,
    CopyAborted,
    AbortedCommand,
    VolumeOverflow,
    Miscompare,
    Completed,
    Reserved(u8),
}

impl From<u8> for SenseKey {
    fn from(v: u8) -> Self {
        match v & 0x0F {
            0x0 => SenseKey::NoSense,
            0x1 => SenseKey::RecoveredError,
            0x2 => SenseKey::NotReady,
            0x3 => SenseKey::MediumError,
            0x4 => SenseKey::HardwareError,
            0x5 => SenseKey::IllegalRequest,
            0x6 => SenseKey::UnitAttention,
            0x7 => SenseKey::DataProtect,
            0x8 => SenseKey::BlankCheck,
            0x9 => SenseKey::VendorSpecific,
            0xA => SenseKey::CopyAborted,
            0xB => SenseKey::AbortedCommand,
            0xD => SenseKey::VolumeOverflow,
            0xE => SenseKey::Miscompare,
            0xF => SenseKey::Completed,
            r => SenseKey::Reserved(r),
        }
    }
}

impl From<SenseKey> for u8 {
    fn from(k: SenseKey) -> u8 {
        match k {
            SenseKey::NoSense => 0x0,
            SenseKey::RecoveredError => 0x1,
            SenseKey::NotReady => 0x2,
            SenseKey::MediumError => 0x3,
            SenseKey::HardwareError => 0x4,
            SenseKey::IllegalRequest => 0x5,
            SenseKey::UnitAttention => 0x6,
            SenseKey::DataProtect => 0x7,
            SenseKey::BlankCheck => 0x8,
            SenseKey::VendorSpecific => 0x9,
            SenseKey::CopyAborted => 0xA,
            SenseKey::AbortedCommand => 0xB,
            SenseKey::VolumeOverflow => 0xD,
            SenseKey::Miscompare => 0xE,
            SenseKey::Completed => 0xF,
            SenseKey::Reserved(r) => r & 0x0F,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SenseFormat {
    Fixed,
    Descriptor,
    /// Too short or unknown response code; fields are best effort.
    #[default]
    Unparsed,
}

#[derive(Default, Clone, PartialEq, Eq)]
pub struct SenseData {
    pub format: SenseFormat,
    /// Low seven bits of byte 0.
    pub response_code: u8,
    pub sense_key: SenseKey,
    pub asc: u8,
    pub ascq: u8,
    pub information: Option<u64>,
    pub command_specific: Option<u64>,
    pub sense_key_specific: Option<[u8; 3]>,
    pub filemark: bool,
    pub eom: bool,
    pub ili: bool,
    pub raw: Vec<u8>,
}

impl SenseData {
    pub fn parse(buf: &[u8]) -> Self {
        let mut out = SenseData {
            raw: buf.to_vec(),
            ..Default::default()
        };
        let Some(&b0) = buf.first() else {
            return out;
        };
        out.response_code = b0 & 0x7F;
        match out.response_code {
            0x70 | 0x71 => out.parse_fixed(buf),
            0x72 | 0x73 => out.parse_descriptor(buf),
            _ => {},
        }
        out
    }

    /// Sense data inside a SCSI Response data segment: a two-byte
    /// SenseLength followed by the sense bytes.
    pub fn from_response_segment(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        let sense_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        if sense_len == 0 {
            return None;
        }
        let end = (2 + sense_len).min(data.len());
        let mut sense = Self::parse(&data[2..end]);
        if end - 2 < sense_len {
            sense.format = SenseFormat::Unparsed;
        }
        Some(sense)
    }

    fn parse_fixed(&mut self, buf: &[u8]) {
        if buf.len() < 3 {
            return;
        }
        let valid = buf[0] & 0x80 != 0;
        self.filemark = buf[2] & 0x80 != 0;
        self.eom = buf[2] & 0x40 != 0;
        self.ili = buf[2] & 0x20 != 0;
        self.sense_key = SenseKey::from(buf[2]);

        if valid && buf.len() >= 7 {
            self.information =
                Some(u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as u64);
        }
        if buf.len() >= 12 {
            let cs = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
            self.command_specific = (cs != 0).then_some(cs as u64);
        }
        if buf.len() < 14 {
            return;
        }
        self.asc = buf[12];
        self.ascq = buf[13];
        if buf.len() >= FIXED_MIN_LEN && buf[15] & 0x80 != 0 {
            self.sense_key_specific = Some([buf[15], buf[16], buf[17]]);
        }
        self.format = SenseFormat::Fixed;
    }

    fn parse_descriptor(&mut self, buf: &[u8]) {
        if buf.len() < DESCRIPTOR_HEADER_LEN {
            if buf.len() >= 2 {
                self.sense_key = SenseKey::from(buf[1]);
            }
            return;
        }
        self.sense_key = SenseKey::from(buf[1]);
        self.asc = buf[2];
        self.ascq = buf[3];
        self.format = SenseFormat::Descriptor;

        let additional = buf[7] as usize;
        let end = (DESCRIPTOR_HEADER_LEN + additional).min(buf.len());
        let mut off = DESCRIPTOR_HEADER_LEN;
        while off + 2 <= end {
            let kind = buf[off];
            let len = buf[off + 1] as usize;
            let body_end = off + 2 + len;
            if body_end > end {
                break;
            }
            let d = &buf[off..body_end];
            match kind {
                0x00 if d.len() >= 12 && d[2] & 0x80 != 0 => {
                    self.information = Some(be_u64(&d[4..12]));
                },
                0x01 if d.len() >= 12 => {
                    self.command_specific = Some(be_u64(&d[4..12]));
                },
                0x02 if d.len() >= 7 && d[4] & 0x80 != 0 => {
                    self.sense_key_specific = Some([d[4], d[5], d[6]]);
                },
                0x04 if d.len() >= 4 => {
                    self.filemark = d[3] & 0x80 != 0;
                    self.eom = d[3] & 0x40 != 0;
                    self.ili = d[3] & 0x20 != 0;
                },
                _ => {},
            }
            off = body_end;
        }
    }

    #[inline]
    pub fn asc_ascq(&self) -> (u8, u8) {
        (self.asc, self.ascq)
    }

    #[inline]
    pub fn is_unit_attention(&self) -> bool {
        self.sense_key == SenseKey::UnitAttention
    }

    /// Builds fixed-format sense bytes (18 bytes).
    pub fn fixed(key: SenseKey, (asc, ascq): (u8, u8), information: Option<u32>) -> Vec<u8> {
        let mut b = vec![0u8; FIXED_MIN_LEN];
        b[0] = 0x70;
        b[2] = u8::from(key);
        if let Some(info) = information {
            b[0] |= 0x80;
            b[3..7].copy_from_slice(&info.to_be_bytes());
        }
        b[7] = (FIXED_MIN_LEN - 8) as u8;
        b[12] = asc;
        b[13] = ascq;
        b
    }
}

fn be_u64(b: &[u8]) -> u64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&b[..8]);
    u64::from_be_bytes(a)
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field("format", &self.format)
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &self.sense_key)
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("information", &self.information)
            .field("command_specific", &self.command_specific)
            .field("description", &asc_ascq_to_str(self.asc, self.ascq))
            .finish()
    }
}

/// SPC-4 description for an ASC/ASCQ pair.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    hot_table(asc, ascq).unwrap_or("UNSPECIFIED / vendor specific")
}

fn hot_table(asc: u8, ascq: u8) -> Option<&'static str> {
    Some(match (asc, ascq) {
        (0x00, 0x00) => "No additional sense information",
        (0x04, 0x01) => "Logical unit is in process of becoming ready",
        (0x04, 0x02) => "Logical unit not ready, initializing command required",
        (0x04, 0x03) => "Logical unit not ready, manual intervention required",
        (0x11, 0x00) => "Unrecovered read error",
        (0x1A, 0x00) => "Parameter list length error",
        (0x20, 0x00) => "Invalid command operation code",
        (0x21, 0x00) => "Logical block address out of range",
        (0x24, 0x00) => "Invalid field in CDB",
        (0x25, 0x00) => "Logical unit not supported",
        (0x26, 0x00) => "Invalid field in parameter list",
        (0x27, 0x00) => "Write protected",
        (0x28, 0x00) => "Not ready to ready change, medium may have changed",
        (0x29, 0x00) => "Power on, reset, or bus device reset occurred",
        (0x29, 0x01) => "Power on occurred",
        (0x29, 0x03) => "Bus device reset function occurred",
        (0x2A, 0x01) => "Mode parameters changed",
        (0x2A, 0x03) => "Reservations preempted",
        (0x3A, 0x00) => "Medium not present",
        (0x3A, 0x01) => "Medium not present - tray closed",
        (0x3A, 0x02) => "Medium not present - tray open",
        (0x3F, 0x0E) => "Reported LUNs data has changed",
        (0x53, 0x02) => "Medium removal prevented",
        (0x55, 0x03) => "Insufficient resources",
        _ => return None,
    })
}
