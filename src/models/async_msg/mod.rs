//! Asynchronous Message PDU (0x32).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the Async Message header and event codes.
pub mod response;
