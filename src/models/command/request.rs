// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    command::common::{ScsiCommandRequestFlags, TaskAttribute},
    common::{BasicHeaderSegment, HEADER_LEN},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for ScsiCommandRequest PDU
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiCommandRequest {
    pub opcode: RawBhsOpcode,                          // 0
    pub flags: u8,                                     // 1
    reserved1: [u8; 2],                                // 2..4
    pub total_ahs_length: u8,                          // 4
    pub data_segment_length: [u8; 3],                  // 5..8
    pub lun: U64<BigEndian>,                           // 8..16
    pub initiator_task_tag: U32<BigEndian>,            // 16..20
    pub expected_data_transfer_length: U32<BigEndian>, // 20..24
    pub cmd_sn: U32<BigEndian>,                        // 24..28
    pub exp_stat_sn: U32<BigEndian>,                   // 28..32
    pub scsi_descriptor_block: [u8; 16],               // 32..48
}

const _: () = assert!(size_of::<ScsiCommandRequest>() == HEADER_LEN);

impl Default for ScsiCommandRequest {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ScsiCommandReq),
            flags: 0,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::ZERO,
            expected_data_transfer_length: U32::ZERO,
            cmd_sn: U32::ZERO,
            exp_stat_sn: U32::ZERO,
            scsi_descriptor_block: [0; 16],
        }
    }
}

impl ScsiCommandRequest {
    #[inline]
    pub fn flags(&self) -> ScsiCommandRequestFlags {
        ScsiCommandRequestFlags::from_bits_retain(self.flags)
    }

    #[inline]
    pub fn task_attribute(&self) -> TaskAttribute {
        TaskAttribute::from(self.flags)
    }
}

impl BasicHeaderSegment for ScsiCommandRequest {
    const OPCODE: Opcode = Opcode::ScsiCommandReq;
}

/// Builder for **SCSI Command** PDUs (opcode `0x01`).
///
/// - The CDB is copied verbatim into the 16-byte field; shorter CDBs are
///   zero padded.
/// - `expected_data_transfer_length` is the total payload the command moves
///   in its data direction; the target uses it for residual accounting.
/// - F starts set; `more_data_follows` clears it when unsolicited Data-Out
///   PDUs follow the command.
#[derive(Debug, Default, PartialEq)]
pub struct ScsiCommandRequestBuilder {
    pub header: ScsiCommandRequest,
}

impl ScsiCommandRequestBuilder {
    pub fn new() -> Self {
        let mut header = ScsiCommandRequest::default();
        header.flags = ScsiCommandRequestFlags::FINAL.bits();
        Self { header }
    }

    pub fn immediate(mut self) -> Self {
        self.header.opcode.set_i();
        self
    }

    pub fn read(mut self) -> Self {
        self.header.flags |= ScsiCommandRequestFlags::READ.bits();
        self
    }

    pub fn write(mut self) -> Self {
        self.header.flags |= ScsiCommandRequestFlags::WRITE.bits();
        self
    }

    /// Clears F when unsolicited Data-Out PDUs follow the command.
    pub fn more_data_follows(mut self) -> Self {
        self.header.flags &= !ScsiCommandRequestFlags::FINAL.bits();
        self
    }

    pub fn task_attribute(mut self, task: TaskAttribute) -> Self {
        self.header.flags = (self.header.flags & !ScsiCommandRequestFlags::ATTR_MASK.bits())
            | u8::from(task);
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn expected_data_transfer_length(mut self, len: u32) -> Self {
        self.header.expected_data_transfer_length.set(len);
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

    pub fn lun(mut self, lun: u64) -> Self {
        self.header.lun.set(lun);
        self
    }

    pub fn scsi_descriptor_block(mut self, cdb: &[u8]) -> Self {
        let n = cdb.len().min(16);
        self.header.scsi_descriptor_block = [0; 16];
        self.header.scsi_descriptor_block[..n].copy_from_slice(&cdb[..n]);
        self
    }
}
