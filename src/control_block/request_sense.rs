// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! REQUEST SENSE (0x03).
//!
//!   [1] = DESC (bit 0)
//!   [4] = ALLOCATION LENGTH
//!
//! `desc` asks for descriptor format; the target may still answer in its
//! configured format. The returned data is decoded by
//! [`SenseData::parse`](crate::models::data::sense_data::SenseData::parse).

use crate::control_block::cdb::Cdb;

pub const REQUEST_SENSE: u8 = 0x03;

#[inline]
pub fn build_request_sense(desc: bool, allocation_len: u8) -> Cdb {
    let mut cdb = Cdb::new(REQUEST_SENSE, 6);
    cdb.set(1, u8::from(desc));
    cdb.set(4, allocation_len);
    cdb
}
