//! Status-Class / Status-Detail of Login Response PDUs (RFC 7143 § 11.13.5).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// target accepted the request
    Success,
    /// initiator must follow TargetAddress
    Redirection,
    /// mistake on initiator side; do not retry
    InitiatorError,
    /// target temporarily cannot fulfil; may retry
    TargetError,
    Unknown(u8),
}

impl From<u8> for StatusClass {
    fn from(b: u8) -> Self {
        match b {
            0 => StatusClass::Success,
            1 => StatusClass::Redirection,
            2 => StatusClass::InitiatorError,
            3 => StatusClass::TargetError,
            other => StatusClass::Unknown(other),
        }
    }
}

impl From<StatusClass> for u8 {
    fn from(class: StatusClass) -> Self {
        match class {
            StatusClass::Success => 0x00,
            StatusClass::Redirection => 0x01,
            StatusClass::InitiatorError => 0x02,
            StatusClass::TargetError => 0x03,
            StatusClass::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionDetail {
    MovedTemporarily,
    MovedPermanently,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorErrorDetail {
    InitiatorError,
    AuthFailed,
    AuthzFailed,
    NotFound,
    TargetRemoved,
    UnsupportedVersion,
    TooManyConnections,
    MissingParameter,
    CantIncludeInSession,
    SessionTypeNotSupported,
    SessionDoesNotExist,
    InvalidDuringLogin,
    Reserved(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetErrorDetail {
    TargetError,
    ServiceUnavailable,
    OutOfResources,
    Reserved(u8),
}

/// Status-Detail interpreted in the context of its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDetail {
    Success,
    Redirection(RedirectionDetail),
    InitiatorErr(InitiatorErrorDetail),
    TargetErr(TargetErrorDetail),
    Unknown { class: u8, detail: u8 },
}

impl StatusDetail {
    pub fn decode(class: StatusClass, raw: u8) -> Self {
        match class {
            StatusClass::Success => StatusDetail::Success,
            StatusClass::Redirection => StatusDetail::Redirection(match raw {
                0x01 => RedirectionDetail::MovedTemporarily,
                0x02 => RedirectionDetail::MovedPermanently,
                other => RedirectionDetail::Other(other),
            }),
            StatusClass::InitiatorError => {
                use InitiatorErrorDetail::*;
                StatusDetail::InitiatorErr(match raw {
                    0x00 => InitiatorError,
                    0x01 => AuthFailed,
                    0x02 => AuthzFailed,
                    0x03 => NotFound,
                    0x04 => TargetRemoved,
                    0x05 => UnsupportedVersion,
                    0x06 => TooManyConnections,
                    0x07 => MissingParameter,
                    0x08 => CantIncludeInSession,
                    0x09 => SessionTypeNotSupported,
                    0x0a => SessionDoesNotExist,
                    0x0b => InvalidDuringLogin,
                    other => Reserved(other),
                })
            },
            StatusClass::TargetError => StatusDetail::TargetErr(match raw {
                0x00 => TargetErrorDetail::TargetError,
                0x01 => TargetErrorDetail::ServiceUnavailable,
                0x02 => TargetErrorDetail::OutOfResources,
                other => TargetErrorDetail::Reserved(other),
            }),
            StatusClass::Unknown(class) => StatusDetail::Unknown { class, detail: raw },
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            StatusDetail::InitiatorErr(
                InitiatorErrorDetail::AuthFailed | InitiatorErrorDetail::AuthzFailed
            )
        )
    }
}
