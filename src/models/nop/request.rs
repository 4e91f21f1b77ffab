// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **NOP-Out** (opcode 0x00).
///
/// Two uses on the wire:
/// - initiator ping: fresh ITT, TTT = 0xffffffff;
/// - answer to a NOP-In: ITT = 0xffffffff, TTT echoed from the NOP-In.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NopOutRequest {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1: F, always set
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

const _: () = assert!(size_of::<NopOutRequest>() == HEADER_LEN);

impl Default for NopOutRequest {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::NopOut),
            flags: 0x80,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::new(RESERVED_TAG),
            target_transfer_tag: U32::new(RESERVED_TAG),
            cmd_sn: U32::ZERO,
            exp_stat_sn: U32::ZERO,
            reserved2: [0; 16],
        }
    }
}

impl BasicHeaderSegment for NopOutRequest {
    const OPCODE: Opcode = Opcode::NopOut;
}

/// Builder for NOP-Out headers; both variants are sent immediate.
#[derive(Debug, Default)]
pub struct NopOutRequestBuilder {
    pub header: NopOutRequest,
}

impl NopOutRequestBuilder {
    pub fn new() -> Self {
        let mut header = NopOutRequest::default();
        header.opcode.set_i();
        Self { header }
    }

    pub fn lun(mut self, lun: u64) -> Self {
        self.header.lun.set(lun);
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
