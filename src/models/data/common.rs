// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    /// Byte 1 of a SCSI Data-Out PDU.
    pub struct DataOutFlags: u8 {
        /// Last Data-Out PDU of the burst.
        const FINAL = 0b1000_0000;
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    /// Byte 1 of a SCSI Data-In PDU.
    pub struct DataInFlags: u8 {
        /// Last Data-In PDU of the sequence.
        const FINAL = 1 << 7;
        /// Acknowledge requested (ERL > 0 only).
        const A = 1 << 6;
        /// Residual overflow, valid with S.
        const O = 1 << 2;
        /// Residual underflow, valid with S.
        const U = 1 << 1;
        /// Status carried in this PDU; implies F.
        const S = 1 << 0;
    }
}

impl DataInFlags {
    /// Protocol consistency: S needs F, and U/O are exclusive and only
    /// valid with S.
    pub fn is_consistent(self) -> bool {
        if self.contains(DataInFlags::S) && !self.contains(DataInFlags::FINAL) {
            return false;
        }
        if self.contains(DataInFlags::U | DataInFlags::O) {
            return false;
        }
        if !self.contains(DataInFlags::S) && self.intersects(DataInFlags::U | DataInFlags::O) {
            return false;
        }
        true
    }
}
