// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::models::{
    command::common::{ResponseCode, ScsiCommandResponseFlags, ScsiStatus},
    common::{BasicHeaderSegment, HEADER_LEN},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for ScsiCommandResponse PDU
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiCommandResponse {
    pub opcode: RawBhsOpcode,                                  // 0
    pub flags: u8,                                             // 1
    pub response: u8,                                          // 2
    pub status: u8,                                            // 3
    pub total_ahs_length: u8,                                  // 4
    pub data_segment_length: [u8; 3],                          // 5..8
    reserved: [u8; 8],                                         // 8..16
    pub initiator_task_tag: U32<BigEndian>,                    // 16..20
    pub snack_tag: U32<BigEndian>,                             // 20..24
    pub stat_sn: U32<BigEndian>,                               // 24..28
    pub exp_cmd_sn: U32<BigEndian>,                            // 28..32
    pub max_cmd_sn: U32<BigEndian>,                            // 32..36
    pub exp_data_sn: U32<BigEndian>,                           // 36..40
    pub bidirectional_read_residual_count: U32<BigEndian>,     // 40..44
    pub residual_count: U32<BigEndian>,                        // 44..48
}

const _: () = assert!(size_of::<ScsiCommandResponse>() == HEADER_LEN);

impl Default for ScsiCommandResponse {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ScsiCommandResp),
            flags: ScsiCommandResponseFlags::FINAL.bits(),
            response: 0,
            status: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            reserved: [0; 8],
            initiator_task_tag: U32::ZERO,
            snack_tag: U32::ZERO,
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            exp_data_sn: U32::ZERO,
            bidirectional_read_residual_count: U32::ZERO,
            residual_count: U32::ZERO,
        }
    }
}

impl ScsiCommandResponse {
    #[inline]
    pub fn flags(&self) -> ScsiCommandResponseFlags {
        ScsiCommandResponseFlags::from_bits_retain(self.flags)
    }

    #[inline]
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from(self.response)
    }

    #[inline]
    pub fn scsi_status(&self) -> ScsiStatus {
        ScsiStatus::from(self.status)
    }

    pub fn set_status(&mut self, status: ScsiStatus) -> &mut Self {
        self.status = status.into();
        self
    }

    /// Sets the residual count together with the matching U/O flag.
    /// Positive values are underflow, negative overflow.
    pub fn set_residual(&mut self, residual: i64) -> &mut Self {
        self.flags &= !(ScsiCommandResponseFlags::U_BIG | ScsiCommandResponseFlags::O_BIG).bits();
        if residual > 0 {
            self.flags |= ScsiCommandResponseFlags::U_BIG.bits();
        } else if residual < 0 {
            self.flags |= ScsiCommandResponseFlags::O_BIG.bits();
        }
        self.residual_count.set(residual.unsigned_abs().min(u32::MAX as u64) as u32);
        self
    }
}

impl BasicHeaderSegment for ScsiCommandResponse {
    const OPCODE: Opcode = Opcode::ScsiCommandResp;
}
