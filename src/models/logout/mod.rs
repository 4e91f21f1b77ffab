//! Logout Request (0x06) and Logout Response (0x26) PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the Logout Request header and reason codes.
pub mod request;
/// Defines the Logout Response header and response codes.
pub mod response;
