//! SCSI Data-In / Data-Out PDUs and the sense data they may carry.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Data-In and Data-Out flag definitions.
pub mod common;
/// SCSI Data-Out header and builder.
pub mod request;
/// SCSI Data-In header.
pub mod response;
/// Fixed and descriptor format sense data.
pub mod sense_data;
