// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN},
    opcode::{Opcode, RawBhsOpcode},
};

/// iSCSI Logout Response Code (RFC 7143 § 11.15.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutResponseCode {
    /// connection or session closed successfully
    Success,
    CidNotFound,
    RecoveryNotSupported,
    /// cleanup failed for various reasons
    CleanupFailed,
    Reserved(u8),
}

impl From<u8> for LogoutResponseCode {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Self::Success,
            0x01 => Self::CidNotFound,
            0x02 => Self::RecoveryNotSupported,
            0x03 => Self::CleanupFailed,
            other => Self::Reserved(other),
        }
    }
}

impl From<LogoutResponseCode> for u8 {
    fn from(c: LogoutResponseCode) -> Self {
        match c {
            LogoutResponseCode::Success => 0x00,
            LogoutResponseCode::CidNotFound => 0x01,
            LogoutResponseCode::RecoveryNotSupported => 0x02,
            LogoutResponseCode::CleanupFailed => 0x03,
            LogoutResponseCode::Reserved(v) => v,
        }
    }
}

impl fmt::Display for LogoutResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogoutResponseCode::Success => f.write_str("Success"),
            LogoutResponseCode::CidNotFound => f.write_str("CidNotFound"),
            LogoutResponseCode::RecoveryNotSupported => f.write_str("RecoveryNotSupported"),
            LogoutResponseCode::CleanupFailed => f.write_str("CleanupFailed"),
            LogoutResponseCode::Reserved(v) => write!(f, "Reserved(0x{v:02x})"),
        }
    }
}

/// BHS for **Logout Response** (opcode 0x26).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogoutResponse {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: u8,                          // 1: F
    pub response: u8,                       // 2
    reserved0: u8,                          // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved1: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved2: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    reserved3: [u8; 4],                     // 36..40
    pub time2wait: U16<BigEndian>,          // 40..42
    pub time2retain: U16<BigEndian>,        // 42..44
    reserved4: [u8; 4],                     // 44..48
}

const _: () = assert!(size_of::<LogoutResponse>() == HEADER_LEN);

impl Default for LogoutResponse {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::LogoutResp),
            flags: 0x80,
            response: 0,
            reserved0: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            reserved1: [0; 8],
            initiator_task_tag: U32::ZERO,
            reserved2: [0; 4],
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            reserved3: [0; 4],
            time2wait: U16::ZERO,
            time2retain: U16::ZERO,
            reserved4: [0; 4],
        }
    }
}

impl LogoutResponse {
    #[inline]
    pub fn response_code(&self) -> LogoutResponseCode {
        LogoutResponseCode::from(self.response)
    }
}

impl BasicHeaderSegment for LogoutResponse {
    const OPCODE: Opcode = Opcode::LogoutResp;
}
