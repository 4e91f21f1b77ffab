//! SCSI Task Management Function Request (0x02) / Response (0x22) PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Function and response codes.
pub mod common;
/// Defines the TMF request header and builder.
pub mod request;
/// Defines the TMF response header.
pub mod response;
