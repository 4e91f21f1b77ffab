// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-PDU handling, written as `impl Session` blocks.

/// Asynchronous Message events.
pub mod async_msg;
/// Data-In placement and completion.
pub mod data_in;
/// Login Response routing into the login state machine.
pub mod login;
/// Logout request and response.
pub mod logout;
/// Initiator pings and target NOP-In replies.
pub mod nop;
/// Solicited Data-Out for R2T.
pub mod r2t;
/// Reject handling.
pub mod reject;
/// SCSI Command issue and SCSI Response handling.
pub mod scsi_command;
/// Task management functions.
pub mod task_mgmt;
/// Text requests and SendTargets discovery.
pub mod text;
