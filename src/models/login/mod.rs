// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Login Request (0x03) and Login Response (0x23) PDUs.

/// Login flags and stage codes.
pub mod common;
/// Login Request header and builder.
pub mod request;
/// Login Response header.
pub mod response;
/// Status class and detail codes.
pub mod status;
