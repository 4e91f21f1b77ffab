// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **NOP-In** (opcode 0x20).
///
/// A target-initiated ping carries ITT = 0xffffffff and a valid TTT that the
/// initiator must echo; a reply to our ping carries our ITT and TTT =
/// 0xffffffff.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NopInResponse {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1
    reserved1: [u8; 2],                      // 2..4
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    pub stat_sn: U32<BigEndian>,             // 24..28
    pub exp_cmd_sn: U32<BigEndian>,          // 28..32
    pub max_cmd_sn: U32<BigEndian>,          // 32..36
    reserved2: [u8; 12],                     // 36..48
}

const _: () = assert!(size_of::<NopInResponse>() == HEADER_LEN);

impl Default for NopInResponse {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::NopIn),
            flags: 0x80,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::new(RESERVED_TAG),
            target_transfer_tag: U32::new(RESERVED_TAG),
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            reserved2: [0; 12],
        }
    }
}

impl NopInResponse {
    /// The target expects a NOP-Out echoing its TTT.
    #[inline]
    pub fn wants_reply(&self) -> bool {
        self.target_transfer_tag.get() != RESERVED_TAG
    }
}

impl BasicHeaderSegment for NopInResponse {
    const OPCODE: Opcode = Opcode::NopIn;
}
