// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    opcode::{Opcode, RawBhsOpcode},
    reject::reject_description::RejectReason,
};

/// BHS for a **Reject** PDU (opcode 0x3F).
///
/// The data segment carries the complete BHS of the rejected PDU; its ITT
/// identifies the task to fail. The Reject's own ITT is always 0xffffffff.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RejectPdu {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: u8,                          // 1: F
    pub reason: u8,                         // 2
    reserved1: u8,                          // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved2: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved3: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub data_sn_or_r2t_sn: U32<BigEndian>,  // 36..40
    reserved4: [u8; 8],                     // 40..48
}

const _: () = assert!(size_of::<RejectPdu>() == HEADER_LEN);

impl Default for RejectPdu {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::Reject),
            flags: 0x80,
            reason: 0,
            reserved1: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            reserved2: [0; 8],
            initiator_task_tag: U32::new(RESERVED_TAG),
            reserved3: [0; 4],
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            data_sn_or_r2t_sn: U32::ZERO,
            reserved4: [0; 8],
        }
    }
}

impl RejectPdu {
    #[inline]
    pub fn reason_code(&self) -> RejectReason {
        RejectReason::from(self.reason)
    }

    /// ITT of the rejected PDU, taken from the header echoed in `data`.
    pub fn rejected_itt(data: &[u8]) -> Option<u32> {
        if data.len() < HEADER_LEN {
            return None;
        }
        Some(u32::from_be_bytes([data[16], data[17], data[18], data[19]]))
    }
}

impl BasicHeaderSegment for RejectPdu {
    const OPCODE: Opcode = Opcode::Reject;
}
