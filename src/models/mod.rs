// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! This module defines the data structures for iSCSI PDUs and SCSI commands.

/// Defines the structure for Asynchronous Message PDUs.
pub mod async_msg;
/// Resumable PDU framing over a byte stream.
pub mod codec;
/// Defines the structures for SCSI Command PDUs.
pub mod command;
/// Defines common structures and traits for iSCSI models.
pub mod common;
/// Defines the structures for Data-In and Data-Out PDUs.
pub mod data;
/// Defines the generic PDU container.
pub mod data_format;
/// CRC32C header and data digests.
pub mod digest;
/// Defines the structures for Login PDUs.
pub mod login;
/// Defines the structures for Logout PDUs.
pub mod logout;
/// Defines the structures for NOP-In and NOP-Out PDUs.
pub mod nop;
/// Defines the iSCSI opcode enumeration.
pub mod opcode;
/// The `Pdu` sum type keyed by op-code.
pub mod parse;
/// Defines the structure for Ready To Transfer (R2T) PDUs.
pub mod ready_2_transfer;
/// Defines the structure for Reject PDUs.
pub mod reject;
/// Defines the structures for Task Management Function PDUs.
pub mod task_mgmt;
/// Defines the structures for Text PDUs.
pub mod text;
