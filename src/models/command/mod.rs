//! SCSI Command (0x01) and SCSI Response (0x21) PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Flags, task attributes, response and status codes.
pub mod common;
/// SCSI Command request header and builder.
pub mod request;
/// SCSI Response header.
pub mod response;
