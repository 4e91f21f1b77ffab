// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Framing of PDUs over a byte stream.
//!
//! Wire layout: BHS(48) + AHS + pad(AHS) + [HeaderDigest] + Data + pad(Data)
//! + [DataDigest]. Decoding is resumable: once the BHS is in, the codec keeps
//! it and only waits for the remaining body bytes on later calls.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::{
    error::{CodecError, IscsiError},
    models::{
        common::HEADER_LEN,
        data_format::Digests,
        digest::{self, DIGEST_LEN},
        opcode::Opcode,
        parse::Pdu,
    },
    utils::pad_len,
};

/// Largest value DataSegmentLength can express.
pub const MAX_DATA_SEGMENT_WIRE: usize = 0x00FF_FFFF;

/// Result of one decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    Complete(Pdu),
    /// At least `needed` more bytes are required before progress is possible.
    Incomplete { needed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BodyLayout {
    ahs_len: usize,
    data_len: usize,
    header_digest: bool,
    data_digest: bool,
}

impl BodyLayout {
    fn total(&self) -> usize {
        self.ahs_len
            + pad_len(self.ahs_len)
            + usize::from(self.header_digest) * DIGEST_LEN
            + self.data_len
            + pad_len(self.data_len)
            + usize::from(self.data_digest) * DIGEST_LEN
    }
}

#[derive(Debug)]
enum DecodeState {
    Header,
    Body {
        bhs: [u8; HEADER_LEN],
        layout: BodyLayout,
    },
}

/// Resumable PDU encoder/decoder.
#[derive(Debug)]
pub struct PduCodec {
    max_data_segment: usize,
    digests: Digests,
    state: DecodeState,
}

impl PduCodec {
    /// `max_data_segment` bounds the inbound DataSegmentLength the codec is
    /// willing to buffer.
    pub fn new(max_data_segment: usize) -> Self {
        Self {
            max_data_segment: max_data_segment.min(MAX_DATA_SEGMENT_WIRE),
            digests: Digests::NONE,
            state: DecodeState::Header,
        }
    }

    #[inline]
    pub fn digests(&self) -> Digests {
        self.digests
    }

    /// Switches digest handling; takes effect for the next PDU boundary.
    pub fn set_digests(&mut self, digests: Digests) {
        self.digests = digests;
    }

    #[inline]
    pub fn max_data_segment(&self) -> usize {
        self.max_data_segment
    }

    pub fn set_max_data_segment(&mut self, max: usize) {
        self.max_data_segment = max.min(MAX_DATA_SEGMENT_WIRE);
    }

    /// Drops any half-decoded PDU, e.g. when the connection is replaced.
    pub fn reset(&mut self) {
        self.state = DecodeState::Header;
    }

    /// True while a BHS has been consumed but its body has not.
    pub fn is_mid_pdu(&self) -> bool {
        matches!(self.state, DecodeState::Body { .. })
    }

    /// Consumes at most one PDU from the front of `buf`.
    pub fn decode_frame(&mut self, buf: &mut BytesMut) -> Result<Decoded, CodecError> {
        if let DecodeState::Header = self.state {
            if buf.len() < HEADER_LEN {
                return Ok(Decoded::Incomplete {
                    needed: HEADER_LEN - buf.len(),
                });
            }
            let mut bhs = [0u8; HEADER_LEN];
            bhs.copy_from_slice(&buf[..HEADER_LEN]);
            let layout = self.layout_for(&bhs)?;
            buf.advance(HEADER_LEN);
            self.state = DecodeState::Body { bhs, layout };
        }

        let DecodeState::Body { bhs, layout } = &self.state else {
            return Ok(Decoded::Incomplete { needed: HEADER_LEN });
        };
        let (bhs, layout) = (*bhs, *layout);

        let total = layout.total();
        if buf.len() < total {
            return Ok(Decoded::Incomplete {
                needed: total - buf.len(),
            });
        }
        let body = buf.split_to(total);
        self.state = DecodeState::Header;

        let mut off = 0;
        let ahs = body[off..off + layout.ahs_len].to_vec();
        off += layout.ahs_len + pad_len(layout.ahs_len);

        if layout.header_digest {
            let got = read_digest(&body[off..off + DIGEST_LEN]);
            let want = digest::header_digest(&bhs, &ahs);
            if got != want {
                return Err(CodecError::HeaderDigest { got, want });
            }
            off += DIGEST_LEN;
        }

        let data = body[off..off + layout.data_len].to_vec();
        off += layout.data_len + pad_len(layout.data_len);

        if layout.data_digest {
            let got = read_digest(&body[off..off + DIGEST_LEN]);
            let want = digest::data_digest(&data);
            if got != want {
                return Err(CodecError::DataDigest { got, want });
            }
        }

        let pdu = Pdu::from_parts(bhs, ahs, data)?;
        trace!(opcode = ?pdu.opcode(), bytes = HEADER_LEN + total, "decoded PDU");
        Ok(Decoded::Complete(pdu))
    }

    fn layout_for(&self, bhs: &[u8; HEADER_LEN]) -> Result<BodyLayout, CodecError> {
        let opcode = Opcode::try_from(bhs[0])?;
        let ahs_len = bhs[4] as usize * 4;
        let data_len = u32::from_be_bytes([0, bhs[5], bhs[6], bhs[7]]) as usize;
        if data_len > self.max_data_segment {
            return Err(CodecError::SegmentTooLarge {
                declared: data_len,
                max: self.max_data_segment,
            });
        }
        let digests = self.digests.for_opcode(Some(opcode));
        Ok(BodyLayout {
            ahs_len,
            data_len,
            header_digest: digests.header,
            data_digest: digests.data && data_len > 0,
        })
    }

    /// Serializes a PDU with the current digest selection.
    pub fn encode_pdu(&self, pdu: &mut Pdu) -> Vec<u8> {
        pdu.encode(self.digests)
    }
}

fn read_digest(b: &[u8]) -> u32 {
    digest::from_wire([b[0], b[1], b[2], b[3]])
}

impl Decoder for PduCodec {
    type Error = IscsiError;
    type Item = Pdu;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Pdu>, IscsiError> {
        match self.decode_frame(src)? {
            Decoded::Complete(pdu) => Ok(Some(pdu)),
            Decoded::Incomplete { needed } => {
                src.reserve(needed);
                Ok(None)
            },
        }
    }
}

impl Encoder<Pdu> for PduCodec {
    type Error = IscsiError;

    fn encode(&mut self, mut item: Pdu, dst: &mut BytesMut) -> Result<(), IscsiError> {
        dst.extend_from_slice(&self.encode_pdu(&mut item));
        Ok(())
    }
}
