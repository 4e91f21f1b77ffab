// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    opcode::{Opcode, RawBhsOpcode},
    text::common::TextFlags,
};

/// BHS for **Text Request** (opcode 0x04).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TextRequest {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1: F / C
    reserved1: [u8; 2],                      // 2..4
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    pub cmd_sn: U32<BigEndian>,              // 24..28
    pub exp_stat_sn: U32<BigEndian>,         // 28..32
    reserved2: [u8; 16],                     // 32..48
}

const _: () = assert!(size_of::<TextRequest>() == HEADER_LEN);

impl Default for TextRequest {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::TextReq),
            flags: TextFlags::FINAL.bits(),
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::ZERO,
            target_transfer_tag: U32::new(RESERVED_TAG),
            cmd_sn: U32::ZERO,
            exp_stat_sn: U32::ZERO,
            reserved2: [0; 16],
        }
    }
}

impl TextRequest {
    #[inline]
    pub fn flags(&self) -> TextFlags {
        TextFlags::from_bits_retain(self.flags)
    }
}

impl BasicHeaderSegment for TextRequest {
    const OPCODE: Opcode = Opcode::TextReq;
}

/// Builder for Text Request headers.
///
/// A follow-up request that continues a multi-PDU response echoes the TTT
/// returned by the target and carries an empty data segment.
#[derive(Debug, Default)]
pub struct TextRequestBuilder {
    pub header: TextRequest,
}

impl TextRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the I bit; the request then does not advance CmdSN.
    pub fn immediate(mut self) -> Self {
        self.header.opcode.set_i();
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn target_transfer_tag(mut self, tag: u32) -> Self {
        self.header.target_transfer_tag.set(tag);
        self
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
