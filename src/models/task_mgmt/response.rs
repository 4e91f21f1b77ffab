// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN},
    opcode::{Opcode, RawBhsOpcode},
    task_mgmt::common::TaskMgmtResponse,
};

/// BHS for **SCSI Task Management Function Response** (opcode 0x22).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TaskMgmtResponsePdu {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: u8,                          // 1: F
    pub response: u8,                       // 2
    reserved1: u8,                          // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved2: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved3: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    reserved4: [u8; 12],                    // 36..48
}

const _: () = assert!(size_of::<TaskMgmtResponsePdu>() == HEADER_LEN);

impl Default for TaskMgmtResponsePdu {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ScsiTaskMgmtResp),
            flags: 0x80,
            response: 0,
            reserved1: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            reserved2: [0; 8],
            initiator_task_tag: U32::ZERO,
            reserved3: [0; 4],
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            reserved4: [0; 12],
        }
    }
}

impl TaskMgmtResponsePdu {
    #[inline]
    pub fn response_code(&self) -> TaskMgmtResponse {
        TaskMgmtResponse::from(self.response)
    }
}

impl BasicHeaderSegment for TaskMgmtResponsePdu {
    const OPCODE: Opcode = Opcode::ScsiTaskMgmtResp;
}
