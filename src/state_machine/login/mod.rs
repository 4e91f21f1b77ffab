// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Login phase: security stage (none or CHAP), operational negotiation and
//! the hand-off to full-feature phase.

pub mod common;
pub mod login_chap;
pub mod negotiation;
