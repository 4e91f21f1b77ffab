// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    opcode::{Opcode, RawBhsOpcode},
    task_mgmt::common::TaskMgmtFunction,
};

/// BHS for **SCSI Task Management Function Request** (opcode 0x02).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TaskMgmtRequest {
    pub opcode: RawBhsOpcode,                     // 0
    pub function: u8,                             // 1: F | function
    reserved1: [u8; 2],                           // 2..4
    pub total_ahs_length: u8,                     // 4
    pub data_segment_length: [u8; 3],             // 5..8
    pub lun: U64<BigEndian>,                      // 8..16
    pub initiator_task_tag: U32<BigEndian>,       // 16..20
    pub referenced_task_tag: U32<BigEndian>,      // 20..24
    pub cmd_sn: U32<BigEndian>,                   // 24..28
    pub exp_stat_sn: U32<BigEndian>,              // 28..32
    pub ref_cmd_sn: U32<BigEndian>,               // 32..36
    pub exp_data_sn: U32<BigEndian>,              // 36..40
    reserved2: [u8; 8],                           // 40..48
}

const _: () = assert!(size_of::<TaskMgmtRequest>() == HEADER_LEN);

impl Default for TaskMgmtRequest {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ScsiTaskMgmtReq),
            function: 0x80,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::ZERO,
            referenced_task_tag: U32::new(RESERVED_TAG),
            cmd_sn: U32::ZERO,
            exp_stat_sn: U32::ZERO,
            ref_cmd_sn: U32::ZERO,
            exp_data_sn: U32::ZERO,
            reserved2: [0; 8],
        }
    }
}

impl TaskMgmtRequest {
    #[inline]
    pub fn function_code(&self) -> Option<TaskMgmtFunction> {
        TaskMgmtFunction::from_raw(self.function)
    }
}

impl BasicHeaderSegment for TaskMgmtRequest {
    const OPCODE: Opcode = Opcode::ScsiTaskMgmtReq;
}

/// Builder for TMF requests; always immediate.
#[derive(Debug, Default)]
pub struct TaskMgmtRequestBuilder {
    pub header: TaskMgmtRequest,
}

impl TaskMgmtRequestBuilder {
    pub fn new(function: TaskMgmtFunction) -> Self {
        let mut header = TaskMgmtRequest {
            function: 0x80 | function as u8,
            ..Default::default()
        };
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

    pub fn referenced_task_tag(mut self, tag: u32) -> Self {
        self.header.referenced_task_tag.set(tag);
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

    pub fn ref_cmd_sn(mut self, sn: u32) -> Self {
        self.header.ref_cmd_sn.set(sn);
        self
    }
}
