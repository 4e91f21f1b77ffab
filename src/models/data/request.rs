// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    data::common::DataOutFlags,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **SCSI Data-Out** (opcode 0x05).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiDataOut {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1
    reserved1: [u8; 2],                      // 2..4
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    reserved2: [u8; 4],                      // 24..28
    pub exp_stat_sn: U32<BigEndian>,         // 28..32
    reserved3: [u8; 4],                      // 32..36
    pub data_sn: U32<BigEndian>,             // 36..40
    pub buffer_offset: U32<BigEndian>,       // 40..44
    reserved4: [u8; 4],                      // 44..48
}

const _: () = assert!(size_of::<ScsiDataOut>() == HEADER_LEN);

impl Default for ScsiDataOut {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::ScsiDataOut),
            flags: 0,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::ZERO,
            target_transfer_tag: U32::new(RESERVED_TAG),
            reserved2: [0; 4],
            exp_stat_sn: U32::ZERO,
            reserved3: [0; 4],
            data_sn: U32::ZERO,
            buffer_offset: U32::ZERO,
            reserved4: [0; 4],
        }
    }
}

impl ScsiDataOut {
    #[inline]
    pub fn flags(&self) -> DataOutFlags {
        DataOutFlags::from_bits_retain(self.flags)
    }
}

impl BasicHeaderSegment for ScsiDataOut {
    const OPCODE: Opcode = Opcode::ScsiDataOut;
}

/// Builder for Data-Out PDUs.
///
/// Unsolicited Data-Out keeps the reserved Target Transfer Tag; solicited
/// Data-Out echoes the TTT of the R2T it answers.
#[derive(Debug, Default)]
pub struct ScsiDataOutBuilder {
    pub header: ScsiDataOut,
}

impl ScsiDataOutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fin(mut self, on: bool) -> Self {
        if on {
            self.header.flags |= DataOutFlags::FINAL.bits();
        } else {
            self.header.flags &= !DataOutFlags::FINAL.bits();
        }
        self
    }

    pub fn lun(mut self, lun: u64) -> Self {
        self.header.lun.set(lun);
        self
    }

    pub fn initiator_task_tag(mut self, itt: u32) -> Self {
        self.header.initiator_task_tag.set(itt);
        self
    }

    pub fn target_transfer_tag(mut self, ttt: u32) -> Self {
        self.header.target_transfer_tag.set(ttt);
        self
    }

    pub fn exp_stat_sn(mut self, sn: u32) -> Self {
        self.header.exp_stat_sn.set(sn);
        self
    }

    pub fn data_sn(mut self, sn: u32) -> Self {
        self.header.data_sn.set(sn);
        self
    }

    pub fn buffer_offset(mut self, off: u32) -> Self {
        self.header.buffer_offset.set(off);
        self
    }
}
