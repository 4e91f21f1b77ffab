// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::control_block::cdb::Cdb;

pub const TEST_UNIT_READY: u8 = 0x00;

/// Build a standard TEST UNIT READY(6) CDB with control = 0x00.
#[inline]
pub fn build_test_unit_ready() -> Cdb {
    Cdb::new(TEST_UNIT_READY, 6)
}
