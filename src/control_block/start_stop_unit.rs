// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! START STOP UNIT (0x1B).
//!
//! CDB layout (SBC-4):
//!   [1] = IMMED (bit 0)
//!   [3] = POWER CONDITION MODIFIER (bits 3..0)
//!   [4] = POWER CONDITION (7..4) | NO_FLUSH (2) | LOEJ (1) | START (0)

use crate::{
    control_block::cdb::{Cdb, ensure_below},
    error::CdbError,
};

pub const START_STOP_UNIT: u8 = 0x1B;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StartStop {
    pub immed: bool,
    pub power_condition: u8,
    pub power_condition_modifier: u8,
    pub no_flush: bool,
    pub loej: bool,
    pub start: bool,
}

impl StartStop {
    /// Eject the medium (LOEJ=1, START=0).
    pub fn eject() -> Self {
        Self {
            loej: true,
            ..Default::default()
        }
    }

    /// Load the medium and spin up (LOEJ=1, START=1).
    pub fn load() -> Self {
        Self {
            loej: true,
            start: true,
            ..Default::default()
        }
    }
}

pub fn build_start_stop_unit(p: StartStop) -> Result<Cdb, CdbError> {
    ensure_below("power condition", u64::from(p.power_condition), 16)?;
    ensure_below(
        "power condition modifier",
        u64::from(p.power_condition_modifier),
        16,
    )?;
    let mut cdb = Cdb::new(START_STOP_UNIT, 6);
    cdb.set(1, u8::from(p.immed));
    cdb.set(3, p.power_condition_modifier);
    cdb.set(
        4,
        (p.power_condition << 4)
            | (u8::from(p.no_flush) << 2)
            | (u8::from(p.loej) << 1)
            | u8::from(p.start),
    );
    Ok(cdb)
}
