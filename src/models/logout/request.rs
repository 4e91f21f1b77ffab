// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN},
    opcode::{Opcode, RawBhsOpcode},
};

/// iSCSI Logout Reason Code (low 7 bits of byte 1).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogoutReason {
    /// Close the entire session (all connections)
    #[default]
    CloseSession = 0x00,
    /// Close a specific connection identified by CID
    CloseConnection = 0x01,
    /// Remove a connection for recovery purposes
    RemoveConnectionForRecovery = 0x02,
}

impl LogoutReason {
    pub fn from_raw(v: u8) -> Option<Self> {
        match v & 0x7f {
            0x00 => Some(Self::CloseSession),
            0x01 => Some(Self::CloseConnection),
            0x02 => Some(Self::RemoveConnectionForRecovery),
            _ => None,
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogoutReason::CloseSession => "CloseSession",
            LogoutReason::CloseConnection => "CloseConnection",
            LogoutReason::RemoveConnectionForRecovery => "RemoveConnectionForRecovery",
        };
        f.write_str(s)
    }
}

/// BHS for **Logout Request** (opcode 0x06).
///
/// Byte 1 always carries the F bit; the reason code sits in the low bits.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogoutRequest {
    pub opcode: RawBhsOpcode,               // 0
    pub reason: u8,                         // 1: F | reason
    reserved1: [u8; 2],                     // 2..4
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved2: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub cid: U16<BigEndian>,                // 20..22
    reserved3: [u8; 2],                     // 22..24
    pub cmd_sn: U32<BigEndian>,             // 24..28
    pub exp_stat_sn: U32<BigEndian>,        // 28..32
    reserved4: [u8; 16],                    // 32..48
}

const _: () = assert!(size_of::<LogoutRequest>() == HEADER_LEN);

impl Default for LogoutRequest {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::LogoutReq),
            reason: 0x80,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            reserved2: [0; 8],
            initiator_task_tag: U32::ZERO,
            cid: U16::ZERO,
            reserved3: [0; 2],
            cmd_sn: U32::ZERO,
            exp_stat_sn: U32::ZERO,
            reserved4: [0; 16],
        }
    }
}

impl LogoutRequest {
    #[inline]
    pub fn reason_code(&self) -> Option<LogoutReason> {
        LogoutReason::from_raw(self.reason)
    }
}

impl BasicHeaderSegment for LogoutRequest {
    const OPCODE: Opcode = Opcode::LogoutReq;
}

/// Builder for **Logout Request**.
///
/// The request is sent immediate so it overtakes queued commands.
#[derive(Debug, Default)]
pub struct LogoutRequestBuilder {
    pub header: LogoutRequest,
}

impl LogoutRequestBuilder {
    pub fn new(reason: LogoutReason, itt: u32, cid: u16) -> Self {
        let mut header = LogoutRequest {
            reason: 0x80 | reason as u8,
            ..Default::default()
        };
        header.opcode.set_i();
        header.initiator_task_tag.set(itt);
        header.cid.set(cid);
        Self { header }
    }

    pub fn cmd_sn(mut self, sn: u32) -> Self {
        self.header.cmd_sn.set(sn);
        self
    }

    pub fn exp_stat_sn(mut self, sn: u32) -> Self {
        self.header.exp_stat_sn.set(sn);
        self
    }
}
