// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCSI command descriptor blocks and data-in decoding.

pub mod cdb;
pub mod datain;
pub mod inquiry;
pub mod mod_sense;
pub mod persistent_reservation;
pub mod prevent_allow;
pub mod read;
pub mod read_capacity;
pub mod report_luns;
pub mod request_sense;
pub mod start_stop_unit;
pub mod synchronize_cache;
pub mod test_unit_ready;
pub mod verify;
pub mod write;
