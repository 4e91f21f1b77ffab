// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    error::CodecError,
    models::opcode::{Opcode, RawBhsOpcode},
};

/// Size of the Basic Header Segment.
pub const HEADER_LEN: usize = 48;

/// Reserved tag value ("no task" / "no transfer").
pub const RESERVED_TAG: u32 = 0xFFFF_FFFF;

/// Common view over any iSCSI Basic Header Segment.
///
/// Every BHS shares the same first eight octets (opcode, flags, TotalAHSLength,
/// DataSegmentLength) and keeps the Initiator Task Tag at 16..20, so those
/// accessors are implemented once over the raw bytes. Implementors only bind
/// the header type to its op-code.
pub trait BasicHeaderSegment: FromBytes + IntoBytes + KnownLayout + Immutable {
    const OPCODE: Opcode;

    #[inline]
    fn raw_opcode(&self) -> RawBhsOpcode {
        RawBhsOpcode::from_raw(self.as_bytes()[0])
    }

    #[inline]
    fn get_opcode(&self) -> Option<Opcode> {
        self.raw_opcode().opcode_known()
    }

    #[inline]
    fn is_immediate(&self) -> bool {
        self.raw_opcode().i()
    }

    #[inline]
    fn flags_byte(&self) -> u8 {
        self.as_bytes()[1]
    }

    /// F bit shared by every PDU that has one.
    #[inline]
    fn get_final_bit(&self) -> bool {
        self.flags_byte() & 0x80 != 0
    }

    #[inline]
    fn get_initiator_task_tag(&self) -> u32 {
        let b = self.as_bytes();
        u32::from_be_bytes([b[16], b[17], b[18], b[19]])
    }

    #[inline]
    fn get_ahs_length_bytes(&self) -> usize {
        self.as_bytes()[4] as usize * 4
    }

    /// `len` is in bytes and must be a multiple of four.
    #[inline]
    fn set_ahs_length_bytes(&mut self, len: usize) {
        self.as_mut_bytes()[4] = (len / 4) as u8;
    }

    #[inline]
    fn get_data_length_bytes(&self) -> usize {
        let b = self.as_bytes();
        u32::from_be_bytes([0, b[5], b[6], b[7]]) as usize
    }

    #[inline]
    fn set_data_length_bytes(&mut self, len: u32) {
        let be = len.to_be_bytes();
        self.as_mut_bytes()[5..8].copy_from_slice(&be[1..4]);
    }

    /// Borrow a header of this type from a raw BHS, checking the op-code.
    fn view(buf: &[u8]) -> Result<&Self, CodecError>
    where Self: Sized {
        let hdr = Self::ref_from_bytes(buf).map_err(|e| CodecError::Malformed {
            opcode: Some(Self::OPCODE),
            reason: e.to_string(),
        })?;
        if hdr.get_opcode() != Some(Self::OPCODE) {
            return Err(CodecError::Malformed {
                opcode: Some(Self::OPCODE),
                reason: format!("opcode byte 0x{:02x}", hdr.raw_opcode().raw()),
            });
        }
        Ok(hdr)
    }
}
