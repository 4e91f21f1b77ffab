// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The first octet of every iSCSI Basic Header Segment (RFC 7143 § 11.2.1.1):
//!
//! ```text
//!  7   6   5   4   3   2   1   0
//! +---+---+-----------------------+
//! | . | I |   OPCODE (6 bits)     |
//! +---+---+-----------------------+
//! ```
//!
//! `I` marks an immediate PDU: it carries the current CmdSN without advancing
//! it and is delivered ahead of queued commands.

use core::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::CodecError;

const OPCODE_MASK: u8 = 0b0011_1111;
const I_MASK: u8 = 0b0100_0000;

/// Op-codes defined by RFC 7143 § 11.2.1.2. Anything else is reserved and
/// rejected by the codec.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    #[default]
    NopOut = 0x00,
    ScsiCommandReq = 0x01,
    ScsiTaskMgmtReq = 0x02,
    LoginReq = 0x03,
    TextReq = 0x04,
    ScsiDataOut = 0x05,
    LogoutReq = 0x06,
    SnackReq = 0x10,
    NopIn = 0x20,
    ScsiCommandResp = 0x21,
    ScsiTaskMgmtResp = 0x22,
    LoginResp = 0x23,
    TextResp = 0x24,
    ScsiDataIn = 0x25,
    LogoutResp = 0x26,
    ReadyToTransfer = 0x31,
    AsyncMessage = 0x32,
    Reject = 0x3F,
}

impl Opcode {
    #[inline]
    pub fn from_u6(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::NopOut,
            0x01 => Self::ScsiCommandReq,
            0x02 => Self::ScsiTaskMgmtReq,
            0x03 => Self::LoginReq,
            0x04 => Self::TextReq,
            0x05 => Self::ScsiDataOut,
            0x06 => Self::LogoutReq,
            0x10 => Self::SnackReq,
            0x20 => Self::NopIn,
            0x21 => Self::ScsiCommandResp,
            0x22 => Self::ScsiTaskMgmtResp,
            0x23 => Self::LoginResp,
            0x24 => Self::TextResp,
            0x25 => Self::ScsiDataIn,
            0x26 => Self::LogoutResp,
            0x31 => Self::ReadyToTransfer,
            0x32 => Self::AsyncMessage,
            0x3F => Self::Reject,
            _ => return None,
        })
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let code = byte & OPCODE_MASK;
        Opcode::from_u6(code).ok_or(CodecError::ReservedOpcode(code))
    }
}

/// Zero-copy first BHS octet, transparent over `u8`.
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawBhsOpcode(u8);

impl RawBhsOpcode {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn from_raw(v: u8) -> Self {
        Self(v)
    }

    #[inline]
    pub fn new(op: Opcode) -> Self {
        Self(op as u8)
    }

    #[inline]
    pub const fn i(&self) -> bool {
        (self.0 & I_MASK) != 0
    }

    #[inline]
    pub fn set_i(&mut self) {
        self.0 |= I_MASK
    }

    #[inline]
    pub const fn opcode_raw(&self) -> u8 {
        self.0 & OPCODE_MASK
    }

    #[inline]
    pub fn opcode_known(&self) -> Option<Opcode> {
        Opcode::from_u6(self.opcode_raw())
    }
}

impl fmt::Debug for RawBhsOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tmp = f.debug_struct("Opcode");
        if self.i() {
            tmp.field("I", &true);
        }
        match self.opcode_known() {
            Some(op) => tmp.field("opcode", &op),
            None => tmp.field("opcode_raw", &format_args!("0x{:02X}", self.opcode_raw())),
        };
        tmp.finish()
    }
}
