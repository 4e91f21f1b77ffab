// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use enum_dispatch::enum_dispatch;

use crate::{
    error::CodecError,
    models::{
        async_msg::response::AsyncMessage,
        command::{request::ScsiCommandRequest, response::ScsiCommandResponse},
        common::{BasicHeaderSegment, HEADER_LEN, RESERVED_TAG},
        data::{common::DataInFlags, request::ScsiDataOut, response::ScsiDataIn},
        data_format::{Digests, PduWithData, RawHeader, ZeroCopyType},
        login::{request::LoginRequest, response::LoginResponse},
        logout::{request::LogoutRequest, response::LogoutResponse},
        nop::{request::NopOutRequest, response::NopInResponse},
        opcode::Opcode,
        ready_2_transfer::response::ReadyToTransfer,
        reject::response::RejectPdu,
        task_mgmt::{request::TaskMgmtRequest, response::TaskMgmtResponsePdu},
        text::{request::TextRequest, response::TextResponse},
    },
};

/// Operations every decoded PDU supports regardless of its type.
#[enum_dispatch]
pub trait PduFrame {
    fn header_bytes(&self) -> &[u8; HEADER_LEN];
    fn payload(&self) -> &[u8];
    fn itt(&self) -> u32;
    fn encode_frame(&mut self, digests: Digests) -> Vec<u8>;
}

impl<T: ZeroCopyType> PduFrame for PduWithData<T> {
    #[inline]
    fn header_bytes(&self) -> &[u8; HEADER_LEN] {
        &self.header_buf
    }

    #[inline]
    fn payload(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn itt(&self) -> u32 {
        self.initiator_task_tag()
    }

    fn encode_frame(&mut self, digests: Digests) -> Vec<u8> {
        self.encode(digests)
    }
}

/// A decoded PDU, one variant per op-code.
///
/// SNACK and any other op-code the engine does not interpret land in
/// `Other`; the session treats them as unexpected.
#[enum_dispatch(PduFrame)]
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    NopOut(PduWithData<NopOutRequest>),
    ScsiCommand(PduWithData<ScsiCommandRequest>),
    TaskMgmtRequest(PduWithData<TaskMgmtRequest>),
    LoginRequest(PduWithData<LoginRequest>),
    TextRequest(PduWithData<TextRequest>),
    DataOut(PduWithData<ScsiDataOut>),
    LogoutRequest(PduWithData<LogoutRequest>),
    NopIn(PduWithData<NopInResponse>),
    ScsiResponse(PduWithData<ScsiCommandResponse>),
    TaskMgmtResponse(PduWithData<TaskMgmtResponsePdu>),
    LoginResponse(PduWithData<LoginResponse>),
    TextResponse(PduWithData<TextResponse>),
    DataIn(PduWithData<ScsiDataIn>),
    LogoutResponse(PduWithData<LogoutResponse>),
    ReadyToTransfer(PduWithData<ReadyToTransfer>),
    AsyncMessage(PduWithData<AsyncMessage>),
    Reject(PduWithData<RejectPdu>),
    Other(PduWithData<RawHeader>),
}

fn typed<T: BasicHeaderSegment>(
    bhs: [u8; HEADER_LEN],
    ahs: Vec<u8>,
    data: Vec<u8>,
) -> Result<PduWithData<T>, CodecError> {
    T::view(&bhs)?;
    Ok(PduWithData::from_parts(bhs, ahs, data))
}

impl Pdu {
    /// Builds the typed PDU for an already framed BHS + AHS + data segment.
    pub fn from_parts(
        bhs: [u8; HEADER_LEN],
        ahs: Vec<u8>,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let opcode = Opcode::try_from(bhs[0])?;
        Ok(match opcode {
            Opcode::NopOut => Pdu::NopOut(typed(bhs, ahs, data)?),
            Opcode::ScsiCommandReq => Pdu::ScsiCommand(typed(bhs, ahs, data)?),
            Opcode::ScsiTaskMgmtReq => Pdu::TaskMgmtRequest(typed(bhs, ahs, data)?),
            Opcode::LoginReq => Pdu::LoginRequest(typed(bhs, ahs, data)?),
            Opcode::TextReq => Pdu::TextRequest(typed(bhs, ahs, data)?),
            Opcode::ScsiDataOut => Pdu::DataOut(typed(bhs, ahs, data)?),
            Opcode::LogoutReq => Pdu::LogoutRequest(typed(bhs, ahs, data)?),
            Opcode::NopIn => Pdu::NopIn(typed(bhs, ahs, data)?),
            Opcode::ScsiCommandResp => Pdu::ScsiResponse(typed(bhs, ahs, data)?),
            Opcode::ScsiTaskMgmtResp => Pdu::TaskMgmtResponse(typed(bhs, ahs, data)?),
            Opcode::LoginResp => Pdu::LoginResponse(typed(bhs, ahs, data)?),
            Opcode::TextResp => Pdu::TextResponse(typed(bhs, ahs, data)?),
            Opcode::ScsiDataIn => Pdu::DataIn(typed(bhs, ahs, data)?),
            Opcode::LogoutResp => Pdu::LogoutResponse(typed(bhs, ahs, data)?),
            Opcode::ReadyToTransfer => Pdu::ReadyToTransfer(typed(bhs, ahs, data)?),
            Opcode::AsyncMessage => Pdu::AsyncMessage(typed(bhs, ahs, data)?),
            Opcode::Reject => Pdu::Reject(typed(bhs, ahs, data)?),
            Opcode::SnackReq => Pdu::Other(PduWithData::from_parts(bhs, ahs, data)),
        })
    }

    #[inline]
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u6(self.header_bytes()[0] & 0x3f)
    }

    fn be_u32_at(&self, off: usize) -> u32 {
        let b = self.header_bytes();
        u32::from_be_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
    }

    /// StatSN of a status-bearing target PDU, `None` otherwise.
    ///
    /// Data-In counts only with the S bit; a NOP-In counts only when it
    /// answers one of our pings (ITT != 0xffffffff). R2T echoes the next
    /// StatSN without consuming it.
    pub fn status_sn(&self) -> Option<u32> {
        let carries = match self {
            Pdu::ScsiResponse(_)
            | Pdu::TaskMgmtResponse(_)
            | Pdu::LoginResponse(_)
            | Pdu::TextResponse(_)
            | Pdu::LogoutResponse(_)
            | Pdu::AsyncMessage(_)
            | Pdu::Reject(_) => true,
            Pdu::NopIn(p) => p.initiator_task_tag() != RESERVED_TAG,
            Pdu::DataIn(_) => {
                DataInFlags::from_bits_retain(self.header_bytes()[1]).contains(DataInFlags::S)
            },
            _ => false,
        };
        carries.then(|| self.be_u32_at(24))
    }

    /// `(ExpCmdSN, MaxCmdSN)` carried by every target PDU except SNACK-like
    /// unknowns.
    pub fn cmd_window(&self) -> Option<(u32, u32)> {
        match self {
            Pdu::NopIn(_)
            | Pdu::ScsiResponse(_)
            | Pdu::TaskMgmtResponse(_)
            | Pdu::LoginResponse(_)
            | Pdu::TextResponse(_)
            | Pdu::DataIn(_)
            | Pdu::LogoutResponse(_)
            | Pdu::ReadyToTransfer(_)
            | Pdu::AsyncMessage(_)
            | Pdu::Reject(_) => Some((self.be_u32_at(28), self.be_u32_at(32))),
            _ => None,
        }
    }

    pub fn encode(&mut self, digests: Digests) -> Vec<u8> {
        self.encode_frame(digests)
    }
}
