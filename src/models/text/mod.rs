//! Text Request (0x04) / Text Response (0x24) PDUs and the key=value text
//! format they share with Login.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Text flags and key/value segment helpers.
pub mod common;
/// Defines the structures for iSCSI Text Request PDUs.
pub mod request;
/// Defines the structures for iSCSI Text Response PDUs.
pub mod response;
