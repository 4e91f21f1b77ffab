//! This module defines the structures for iSCSI NOP-Out and NOP-In PDUs.
//! It includes submodules for requests and responses.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the structures for iSCSI NOP-Out PDUs.
pub mod request;
/// Defines the structures for iSCSI NOP-In PDUs.
pub mod response;
