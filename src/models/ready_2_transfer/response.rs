// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Ready To Transfer (R2T)** (opcode 0x31), RFC 7143 § 11.8.
///
/// Header-only: DataSegmentLength is always zero.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ReadyToTransfer {
    pub opcode: RawBhsOpcode,                         // 0
    pub flags: u8,                                    // 1: F, always set
    reserved1: [u8; 2],                               // 2..4
    pub total_ahs_length: u8,                         // 4
    pub data_segment_length: [u8; 3],                 // 5..8
    pub lun: U64<BigEndian>,                          // 8..16
    pub initiator_task_tag: U32<BigEndian>,           // 16..20
    pub target_transfer_tag: U32<BigEndian>,          // 20..24
    pub stat_sn: U32<BigEndian>,                      // 24..28
    pub exp_cmd_sn: U32<BigEndian>,                   // 28..32
    pub max_cmd_sn: U32<BigEndian>,                   // 32..36
    pub r2t_sn: U32<BigEndian>,                       // 36..40
    pub buffer_offset: U32<BigEndian>,                // 40..44
    pub desired_data_transfer_length: U32<BigEndian>, // 44..48
}

const _: () = assert!(size_of::<ReadyToTransfer>() == HEADER_LEN);

impl Default for ReadyToTransfer {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ReadyToTransfer),
            flags: 0x80,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::ZERO,
            target_transfer_tag: U32::ZERO,
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            r2t_sn: U32::ZERO,
            buffer_offset: U32::ZERO,
            desired_data_transfer_length: U32::ZERO,
        }
    }
}

impl BasicHeaderSegment for ReadyToTransfer {
    const OPCODE: Opcode = Opcode::ReadyToTransfer;
}
