// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

bitflags::bitflags! {
    #[derive(Default, Clone, Copy, PartialEq, Eq)]
    pub struct LoginFlags: u8 {
        /// Transit bit (next stage)
        const TRANSIT = 0x80;
        /// Continue bit (more text)
        const CONTINUE = 0x40;
        /// Current Stage bits (bits 3-2)
        const CSG_MASK = 0b0000_1100;
        /// Next Stage bits (bits 1-0)
        const NSG_MASK = 0b0000_0011;
    }
}

/// Login stage codes carried in CSG / NSG.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    #[default]
    Security = 0,
    Operational = 1,
    FullFeature = 3,
}

impl Stage {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0 => Some(Stage::Security),
            1 => Some(Stage::Operational),
            3 => Some(Stage::FullFeature),
            _ => None,
        }
    }
}

/// Zero-copy login flags byte.
///
/// ```text
///   bit7: TRANSIT   bit6: CONTINUE
///   bits3..2: CSG   bits1..0: NSG   (0=Security, 1=Operational, 3=FullFeature)
/// ```
#[repr(transparent)]
#[derive(
    Copy, Clone, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawLoginFlags(u8);

impl RawLoginFlags {
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn flags(self) -> LoginFlags {
        LoginFlags::from_bits_retain(self.0)
    }

    #[inline]
    pub fn transit(self) -> bool {
        self.flags().contains(LoginFlags::TRANSIT)
    }

    #[inline]
    pub fn set_transit(&mut self, on: bool) {
        self.set(LoginFlags::TRANSIT, on)
    }

    #[inline]
    pub fn cont(self) -> bool {
        self.flags().contains(LoginFlags::CONTINUE)
    }

    #[inline]
    pub fn set_cont(&mut self, on: bool) {
        self.set(LoginFlags::CONTINUE, on)
    }

    /// `None` for the reserved stage encoding 2.
    #[inline]
    pub fn csg(self) -> Option<Stage> {
        Stage::from_bits((self.0 & LoginFlags::CSG_MASK.bits()) >> 2)
    }

    #[inline]
    pub fn set_csg(&mut self, s: Stage) {
        self.0 = (self.0 & !LoginFlags::CSG_MASK.bits()) | (((s as u8) & 0b11) << 2);
    }

    #[inline]
    pub fn nsg(self) -> Option<Stage> {
        Stage::from_bits(self.0 & LoginFlags::NSG_MASK.bits())
    }

    #[inline]
    pub fn set_nsg(&mut self, s: Stage) {
        self.0 = (self.0 & !LoginFlags::NSG_MASK.bits()) | ((s as u8) & 0b11);
    }

    fn set(&mut self, bit: LoginFlags, on: bool) {
        if on {
            self.0 |= bit.bits();
        } else {
            self.0 &= !bit.bits();
        }
    }
}

impl fmt::Debug for RawLoginFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.transit() {
            parts.push("TRANSIT".to_string());
        }
        if self.cont() {
            parts.push("CONTINUE".to_string());
        }
        parts.push(format!("CSG={:?}", self.csg()));
        parts.push(format!("NSG={:?}", self.nsg()));
        write!(f, "LoginFlags({})", parts.join("|"))
    }
}
