// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

/// Reject reason codes (RFC 7143 § 11.17.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DataDigestError,
    SnackReject,
    ProtocolError,
    CommandNotSupported,
    ImmediateCommandReject,
    TaskInProgress,
    InvalidDataAck,
    InvalidPduField,
    LongOperationReject,
    DeprecatedNegotiationReset,
    WaitingForLogout,
    /// Reserved or unassigned code, kept verbatim.
    Other(u8),
}

impl From<u8> for RejectReason {
    fn from(code: u8) -> Self {
        match code {
            0x04 => RejectReason::DataDigestError,
            0x05 => RejectReason::SnackReject,
            0x06 => RejectReason::ProtocolError,
            0x07 => RejectReason::CommandNotSupported,
            0x08 => RejectReason::ImmediateCommandReject,
            0x09 => RejectReason::TaskInProgress,
            0x0a => RejectReason::InvalidDataAck,
            0x0b => RejectReason::InvalidPduField,
            0x0c => RejectReason::LongOperationReject,
            0x0d => RejectReason::DeprecatedNegotiationReset,
            0x0e => RejectReason::WaitingForLogout,
            other => RejectReason::Other(other),
        }
    }
}

impl From<RejectReason> for u8 {
    fn from(r: RejectReason) -> u8 {
        match r {
            RejectReason::DataDigestError => 0x04,
            RejectReason::SnackReject => 0x05,
            RejectReason::ProtocolError => 0x06,
            RejectReason::CommandNotSupported => 0x07,
            RejectReason::ImmediateCommandReject => 0x08,
            RejectReason::TaskInProgress => 0x09,
            RejectReason::InvalidDataAck => 0x0a,
            RejectReason::InvalidPduField => 0x0b,
            RejectReason::LongOperationReject => 0x0c,
            RejectReason::DeprecatedNegotiationReset => 0x0d,
            RejectReason::WaitingForLogout => 0x0e,
            RejectReason::Other(code) => code,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::DataDigestError => "Data (payload) Digest Error",
            RejectReason::SnackReject => "SNACK Reject",
            RejectReason::ProtocolError => "Protocol Error",
            RejectReason::CommandNotSupported => "Command Not Supported",
            RejectReason::ImmediateCommandReject => "Immediate Command Reject",
            RejectReason::TaskInProgress => "Task In Progress",
            RejectReason::InvalidDataAck => "Invalid Data ACK",
            RejectReason::InvalidPduField => "Invalid PDU Field",
            RejectReason::LongOperationReject => "Long Operation Reject",
            RejectReason::DeprecatedNegotiationReset => "Deprecated (Negotiation Reset)",
            RejectReason::WaitingForLogout => "Waiting for Logout",
            RejectReason::Other(_) => "Reserved",
        };
        write!(f, "{name} (0x{:02X})", u8::from(*self))
    }
}
