// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sans-io state machines driven by the session controller.

pub mod common;
pub mod login;
