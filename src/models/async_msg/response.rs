// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32, U64};

use crate::models::{
    common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
    opcode::{Opcode, RawBhsOpcode},
};

/// AsyncEvent codes (RFC 7143 § 11.9.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEvent {
    /// Sense data for a LUN is in the data segment.
    ScsiAsyncEvent,
    /// Target requests a logout within Parameter3 seconds.
    LogoutRequested,
    /// Target will drop this connection.
    ConnectionDrop,
    /// Target will drop all connections of the session.
    SessionDrop,
    /// Target asks for parameter renegotiation.
    Renegotiate,
    VendorSpecific,
    Reserved(u8),
}

impl From<u8> for AsyncEvent {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::ScsiAsyncEvent,
            1 => Self::LogoutRequested,
            2 => Self::ConnectionDrop,
            3 => Self::SessionDrop,
            4 => Self::Renegotiate,
            255 => Self::VendorSpecific,
            other => Self::Reserved(other),
        }
    }
}

impl From<AsyncEvent> for u8 {
    fn from(e: AsyncEvent) -> Self {
        match e {
            AsyncEvent::ScsiAsyncEvent => 0,
            AsyncEvent::LogoutRequested => 1,
            AsyncEvent::ConnectionDrop => 2,
            AsyncEvent::SessionDrop => 3,
            AsyncEvent::Renegotiate => 4,
            AsyncEvent::VendorSpecific => 255,
            AsyncEvent::Reserved(v) => v,
        }
    }
}

/// BHS for **Asynchronous Message** (opcode 0x32).
#[repr(C)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AsyncMessage {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: u8,                          // 1: F
    reserved1: [u8; 2],                     // 2..4
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub lun: U64<BigEndian>,                // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20, always 0xffffffff
    reserved2: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub async_event: u8,                    // 36
    pub async_vcode: u8,                    // 37
    pub parameter1: U16<BigEndian>,         // 38..40
    pub parameter2: U16<BigEndian>,         // 40..42
    pub parameter3: U16<BigEndian>,         // 42..44
    reserved3: [u8; 4],                     // 44..48
}

const _: () = assert!(size_of::<AsyncMessage>() == HEADER_LEN);

impl Default for AsyncMessage {
    fn default() -> Self {
        Self {
            opcode: RawBhsOpcode::new(Opcode::AsyncMessage),
            flags: 0x80,
            reserved1: [0; 2],
            total_ahs_length: 0,
            data_segment_length: [0; 3],
            lun: U64::ZERO,
            initiator_task_tag: U32::new(RESERVED_TAG),
            reserved2: [0; 4],
            stat_sn: U32::ZERO,
            exp_cmd_sn: U32::ZERO,
            max_cmd_sn: U32::ZERO,
            async_event: 0,
            async_vcode: 0,
            parameter1: U16::ZERO,
            parameter2: U16::ZERO,
            parameter3: U16::ZERO,
            reserved3: [0; 4],
        }
    }
}

impl AsyncMessage {
    #[inline]
    pub fn event(&self) -> AsyncEvent {
        AsyncEvent::from(self.async_event)
    }
}

impl BasicHeaderSegment for AsyncMessage {
    const OPCODE: Opcode = Opcode::AsyncMessage;
}
