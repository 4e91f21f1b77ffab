// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN},
    login::common::{RawLoginFlags, Stage},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Login Request** (opcode 0x03, always immediate).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LoginRequest {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: RawLoginFlags,               // 1
    pub version_max: u8,                    // 2
    pub version_min: u8,                    // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub isid: [u8; 6],                      // 8..14
    pub tsih: U16<BigEndian>,               // 14..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub cid: U16<BigEndian>,                // 20..22
    reserved1: [u8; 2],                     // 22..24
    pub cmd_sn: U32<BigEndian>,             // 24..28
    pub exp_stat_sn: U32<BigEndian>,        // 28..32
    reserved2: [u8; 16],                    // 32..48
}

const _: () = assert!(size_of::<LoginRequest>() == HEADER_LEN);

impl Default for LoginRequest {
    fn default() -> Self {
        let mut opcode = RawBhsOpcode::new(Opcode::LoginReq);
        opcode.set_i();
        Self {
            opcode,
            flags: RawLoginFlags::default(),
            version_max: 0,
            version_min: 0,
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            isid: [0; 6],
            tsih: U16::ZERO,
            initiator_task_tag: U32::ZERO,
            cid: U16::ZERO,
            reserved1: [0; 2],
            cmd_sn: U32::ZERO,
            exp_stat_sn: U32::ZERO,
            reserved2: [0; 16],
        }
    }
}

impl BasicHeaderSegment for LoginRequest {
    const OPCODE: Opcode = Opcode::LoginReq;
}

/// Builder for Login Request headers.
///
/// The ISID and TSIH identify the session: TSIH 0 asks for a new session,
/// a non-zero TSIH together with the original ISID reinstates one.
#[derive(Debug, Default)]
pub struct LoginRequestBuilder {
    pub header: LoginRequest,
}

impl LoginRequestBuilder {
    pub fn new(isid: [u8; 6], tsih: u16) -> Self {
        let mut header = LoginRequest {
            isid,
            ..Default::default()
        };
        header.tsih.set(tsih);
        Self { header }
    }

    pub fn transit(mut self) -> Self {
        self.header.flags.set_transit(true);
        self
    }

    pub fn cont(mut self) -> Self {
        self.header.flags.set_cont(true);
        self
    }

    pub fn csg(mut self, stage: Stage) -> Self {
        self.header.flags.set_csg(stage);
        self
    }

    pub fn nsg(mut self, stage: Stage) -> Self {
        self.header.flags.set_nsg(stage);
        self
    }

    pub fn versions(mut self, max: u8, min: u8) -> Self {
        self.header.version_max = max;
        self.header.version_min = min;
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn connection_id(mut self, cid: u16) -> Self {
        self.header.cid.set(cid);
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
}
