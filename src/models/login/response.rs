// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN},
    login::{
        common::RawLoginFlags,
        status::{StatusClass, StatusDetail},
    },
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Login Response** (opcode 0x23).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LoginResponse {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: RawLoginFlags,               // 1
    pub version_max: u8,                    // 2
    pub version_active: u8,                 // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub isid: [u8; 6],                      // 8..14
    pub tsih: U16<BigEndian>,               // 14..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved1: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub status_class: u8,                   // 36
    pub status_detail: u8,                  // 37
    reserved2: [u8; 10],                    // 38..48
}

const _: () = assert!(size_of::<LoginResponse>() == HEADER_LEN);

impl Default for LoginResponse {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::LoginResp),
            flags: RawLoginFlags::default(),
            version_max: 0,
            version_active: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            isid: [0; 6],
            tsih: U16::ZERO,
            initiator_task_tag: U32::ZERO,
            reserved1: [0; 4],
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            status_class: 0,
            status_detail: 0,
            reserved2: [0; 10],
        }
    }
}

impl LoginResponse {
    #[inline]
    pub fn class(&self) -> StatusClass {
        StatusClass::from(self.status_class)
    }

    #[inline]
    pub fn detail(&self) -> StatusDetail {
        StatusDetail::decode(self.class(), self.status_detail)
    }
}

impl BasicHeaderSegment for LoginResponse {
    const OPCODE: Opcode = Opcode::LoginResp;
}
