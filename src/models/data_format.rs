// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, marker::PhantomData};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    error::CodecError,
    models::{
        common::{BasicHeaderSegment, HEADER_LEN},
        data::sense_data::SenseData,
        digest::{self, DIGEST_LEN},
        opcode::{Opcode, RawBhsOpcode},
    },
    utils::pad_len,
};

/// Anything that can be viewed in place over a 48-byte BHS buffer.
pub trait ZeroCopyType: KnownLayout + Immutable + IntoBytes + FromBytes {}

impl<T: KnownLayout + Immutable + IntoBytes + FromBytes> ZeroCopyType for T {}

/// Negotiated digest selection for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Digests {
    pub header: bool,
    pub data: bool,
}

impl Digests {
    pub const NONE: Digests = Digests {
        header: false,
        data: false,
    };

    /// Login PDUs never carry digests, whatever was negotiated.
    #[inline]
    pub fn for_opcode(self, op: Option<Opcode>) -> Digests {
        match op {
            Some(Opcode::LoginReq | Opcode::LoginResp) => Digests::NONE,
            _ => self,
        }
    }
}

/// Untyped header used for op-codes the engine does not interpret.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawHeader(pub [u8; HEADER_LEN]);

impl Default for RawHeader {
    fn default() -> Self {
        Self([0; HEADER_LEN])
    }
}

/// A PDU: owned BHS bytes, AHS and data segment.
///
/// `T` selects the header type the BHS is viewed as. Padding and digests
/// exist only on the wire and are produced by [`PduWithData::encode`].
#[derive(Clone, PartialEq)]
pub struct PduWithData<T> {
    pub header_buf: [u8; HEADER_LEN],
    pub additional_header: Vec<u8>,
    pub data: Vec<u8>,

    _marker: PhantomData<T>,
}

impl<T> PduWithData<T> {
    pub fn from_header_slice(header_buf: [u8; HEADER_LEN]) -> Self {
        Self {
            header_buf,
            additional_header: Vec::new(),
            data: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn from_parts(
        header_buf: [u8; HEADER_LEN],
        additional_header: Vec<u8>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            header_buf,
            additional_header,
            data,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn raw_opcode(&self) -> RawBhsOpcode {
        RawBhsOpcode::from_raw(self.header_buf[0])
    }

    #[inline]
    pub fn opcode(&self) -> Option<Opcode> {
        self.raw_opcode().opcode_known()
    }

    #[inline]
    pub fn initiator_task_tag(&self) -> u32 {
        let b = &self.header_buf;
        u32::from_be_bytes([b[16], b[17], b[18], b[19]])
    }

    fn sync_lengths(&mut self) {
        let be = (self.data.len() as u32).to_be_bytes();
        self.header_buf[5..8].copy_from_slice(&be[1..4]);
        self.header_buf[4] = (self.additional_header.len().div_ceil(4)) as u8;
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self.sync_lengths();
        self
    }

    /// Serializes the PDU: BHS, AHS, header digest, data, pad, data digest.
    ///
    /// Length fields are refreshed from the owned buffers first, so the BHS
    /// always matches what follows it.
    pub fn encode(&mut self, digests: Digests) -> Vec<u8> {
        self.sync_lengths();
        let digests = digests.for_opcode(self.opcode());

        let ahs_pad = pad_len(self.additional_header.len());
        let data_pad = pad_len(self.data.len());
        let with_dd = digests.data && !self.data.is_empty();

        let mut out = Vec::with_capacity(
            HEADER_LEN
                + self.additional_header.len()
                + ahs_pad
                + usize::from(digests.header) * DIGEST_LEN
                + self.data.len()
                + data_pad
                + usize::from(with_dd) * DIGEST_LEN,
        );
        out.extend_from_slice(&self.header_buf);
        out.extend_from_slice(&self.additional_header);
        out.extend(std::iter::repeat_n(0u8, ahs_pad));
        if digests.header {
            let hd = digest::header_digest(&self.header_buf, &self.additional_header);
            out.extend_from_slice(&digest::to_wire(hd));
        }
        out.extend_from_slice(&self.data);
        out.extend(std::iter::repeat_n(0u8, data_pad));
        if with_dd {
            out.extend_from_slice(&digest::to_wire(digest::data_digest(&self.data)));
        }
        out
    }

    /// Re-types the PDU, checking that the BHS op-code matches `U`.
    pub fn rebind<U: BasicHeaderSegment>(self) -> Result<PduWithData<U>, CodecError> {
        if self.opcode() != Some(U::OPCODE) {
            return Err(CodecError::Malformed {
                opcode: Some(U::OPCODE),
                reason: format!("opcode byte 0x{:02x}", self.header_buf[0]),
            });
        }
        Ok(PduWithData::from_parts(
            self.header_buf,
            self.additional_header,
            self.data,
        ))
    }
}

impl<T: ZeroCopyType> PduWithData<T> {
    /// Starts a PDU from a built header.
    pub fn from_header(header: &T) -> Self {
        let mut header_buf = [0u8; HEADER_LEN];
        header_buf.copy_from_slice(header.as_bytes());
        Self::from_header_slice(header_buf)
    }

    /// Header view (`&T`) backed by `self.header_buf`.
    #[inline]
    pub fn header_view(&self) -> Result<&T, CodecError> {
        T::ref_from_bytes(self.header_buf.as_slice()).map_err(|e| CodecError::Malformed {
            opcode: self.opcode(),
            reason: e.to_string(),
        })
    }
}

struct HexPreview<'a>(&'a [u8]);

impl fmt::Debug for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX: usize = 64;
        let slice = &self.0[..self.0.len().min(MAX)];
        write!(f, "\"{}", hex::encode(slice))?;
        if self.0.len() > MAX {
            write!(f, " ... (+{} bytes)", self.0.len() - MAX)?;
        }
        write!(f, "\"")
    }
}

impl<T> fmt::Debug for PduWithData<T>
where T: ZeroCopyType + fmt::Debug
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("PduWithData");
        match self.header_view() {
            Ok(h) => ds.field("header", h),
            Err(_) => ds.field("header", &HexPreview(&self.header_buf)),
        };
        if !self.additional_header.is_empty() {
            ds.field("ahs_len", &self.additional_header.len());
        }
        ds.field("data_len", &self.data.len());

        match SenseData::from_response_segment(&self.data) {
            Some(sense) if self.opcode() == Some(Opcode::ScsiCommandResp) => {
                ds.field("sense", &sense);
            },
            _ if !self.data.is_empty() => {
                ds.field("data_preview", &HexPreview(&self.data));
            },
            _ => {},
        }
        ds.finish()
    }
}
