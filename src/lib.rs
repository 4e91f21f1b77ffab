//! Initiator-side iSCSI protocol engine: PDU codec, login negotiation,
//! command sequencing, task tracking and SCSI marshalling over a
//! non-blocking transport.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, command-line parsing, and logging.
pub mod cfg;
/// Sessions, tasks and the transports and front ends driving them.
pub mod client;
/// SCSI command builders and data-in decoders.
pub mod control_block;
/// Error types.
pub mod error;
/// Per-PDU handlers of the session.
pub mod handlers;
/// Defines the data structures for iSCSI PDUs and SCSI commands.
pub mod models;
/// Login negotiation state machine.
pub mod state_machine;
/// Provides utility functions used throughout the crate.
pub mod utils;

pub use client::{AsyncSession, Session, SessionState};
pub use error::{IscsiError, Result};
