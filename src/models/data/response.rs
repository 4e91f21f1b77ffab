// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    command::common::ScsiStatus,
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    data::common::DataInFlags,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **SCSI Data-In** (opcode 0x25).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiDataIn {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1
    reserved1: u8,                           // 2
    pub status_or_rsvd: u8,                  // 3, valid only with S
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    pub stat_sn: U32<BigEndian>,             // 24..28
    pub exp_cmd_sn: U32<BigEndian>,          // 28..32
    pub max_cmd_sn: U32<BigEndian>,          // 32..36
    pub data_sn: U32<BigEndian>,             // 36..40
    pub buffer_offset: U32<BigEndian>,       // 40..44
    pub residual_count: U32<BigEndian>,      // 44..48
}

const _: () = assert!(size_of::<ScsiDataIn>() == HEADER_LEN);

impl Default for ScsiDataIn {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ScsiDataIn),
            flags: 0,
            reserved1: 0,
            status_or_rsvd: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::ZERO,
            target_transfer_tag: U32::new(RESERVED_TAG),
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            data_sn: U32::ZERO,
            buffer_offset: U32::ZERO,
            residual_count: U32::ZERO,
        }
    }
}

impl ScsiDataIn {
    #[inline]
    pub fn flags(&self) -> DataInFlags {
        DataInFlags::from_bits_retain(self.flags)
    }

    /// Status byte when the S bit is set.
    #[inline]
    pub fn status(&self) -> Option<ScsiStatus> {
        self.flags()
            .contains(DataInFlags::S)
            .then(|| ScsiStatus::from(self.status_or_rsvd))
    }

    /// Marks this PDU as the last one and attaches status and residual.
    pub fn set_status(&mut self, status: ScsiStatus, residual: i64) -> &mut Self {
        let mut f = self.flags() | DataInFlags::FINAL | DataInFlags::S;
        f.remove(DataInFlags::U | DataInFlags::O);
        if residual > 0 {
            f |= DataInFlags::U;
        } else if residual < 0 {
            f |= DataInFlags::O;
        }
        self.flags = f.bits();
        self.status_or_rsvd = status.into();
        self.residual_count
            .set(residual.unsigned_abs().min(u32::MAX as u64) as u32);
        self
    }
}

impl BasicHeaderSegment for ScsiDataIn {
    const OPCODE: Opcode = Opcode::ScsiDataIn;
}
