//! Ready To Transfer (R2T, 0x31) PDU.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the R2T header.
pub mod response;
