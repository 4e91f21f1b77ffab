// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

bitflags::bitflags! {
    #[derive(Default, Clone, Copy, PartialEq, Eq)]
    /// Byte 1 of a SCSI Command PDU.
    pub struct ScsiCommandRequestFlags: u8 {
        const FINAL     = 0x80;
        const READ      = 0x40;
        const WRITE     = 0x20;
        /// lowest 3 bits carry the TaskAttribute
        const ATTR_MASK = 0b0000_0111;
    }
}

impl fmt::Debug for ScsiCommandRequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ScsiCommandRequestFlags as F;

        write!(f, "ScsiCommandRequestFlags(")?;
        for (name, flag) in [("FINAL|", F::FINAL), ("READ|", F::READ), ("WRITE|", F::WRITE)]
        {
            if self.contains(flag) {
                f.write_str(name)?;
            }
        }
        let attr = TaskAttribute::from(self.bits() & F::ATTR_MASK.bits());
        write!(f, "ATTR={attr:?})")
    }
}

/// SCSI Task Attributes (SAM-5), including reserved encodings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TaskAttribute {
    Untagged,
    #[default]
    Simple,
    Ordered,
    HeadOfQueue,
    ACA,
    Reserved(u8),
}

impl From<u8> for TaskAttribute {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            0 => TaskAttribute::Untagged,
            1 => TaskAttribute::Simple,
            2 => TaskAttribute::Ordered,
            3 => TaskAttribute::HeadOfQueue,
            4 => TaskAttribute::ACA,
            r => TaskAttribute::Reserved(r),
        }
    }
}

impl From<TaskAttribute> for u8 {
    fn from(value: TaskAttribute) -> Self {
        match value {
            TaskAttribute::Untagged => 0,
            TaskAttribute::Simple => 1,
            TaskAttribute::Ordered => 2,
            TaskAttribute::HeadOfQueue => 3,
            TaskAttribute::ACA => 4,
            TaskAttribute::Reserved(v) => v & 0x07,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    /// Byte 1 of a SCSI Response PDU.
    pub struct ScsiCommandResponseFlags: u8 {
        const FINAL   = 0b1000_0000;
        /// Bidirectional read residual overflow (o)
        const O_SMALL = 0b0001_0000;
        /// Bidirectional read residual underflow (u)
        const U_SMALL = 0b0000_1000;
        /// Residual overflow (O)
        const O_BIG   = 0b0000_0100;
        /// Residual underflow (U)
        const U_BIG   = 0b0000_0010;
    }
}

/// iSCSI service response, RFC 7143 § 11.4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    CommandCompleted,
    TargetFailure,
    VendorSpecific(u8),
    Reserved(u8),
}

impl From<u8> for ResponseCode {
    fn from(b: u8) -> Self {
        match b {
            0x00 => ResponseCode::CommandCompleted,
            0x01 => ResponseCode::TargetFailure,
            0x80..=0xFF => ResponseCode::VendorSpecific(b),
            r => ResponseCode::Reserved(r),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        match value {
            ResponseCode::CommandCompleted => 0x00,
            ResponseCode::TargetFailure => 0x01,
            ResponseCode::VendorSpecific(v) | ResponseCode::Reserved(v) => v,
        }
    }
}

/// SCSI status byte (SAM-5). Only meaningful with
/// `ResponseCode::CommandCompleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScsiStatus {
    Good,
    CheckCondition,
    ConditionMet,
    Busy,
    ReservationConflict,
    TaskSetFull,
    AcaActive,
    TaskAborted,
    Other(u8),
}

impl From<u8> for ScsiStatus {
    fn from(b: u8) -> Self {
        match b {
            0x00 => ScsiStatus::Good,
            0x02 => ScsiStatus::CheckCondition,
            0x04 => ScsiStatus::ConditionMet,
            0x08 => ScsiStatus::Busy,
            0x18 => ScsiStatus::ReservationConflict,
            0x28 => ScsiStatus::TaskSetFull,
            0x30 => ScsiStatus::AcaActive,
            0x40 => ScsiStatus::TaskAborted,
            other => ScsiStatus::Other(other),
        }
    }
}

impl From<ScsiStatus> for u8 {
    fn from(s: ScsiStatus) -> Self {
        match s {
            ScsiStatus::Good => 0x00,
            ScsiStatus::CheckCondition => 0x02,
            ScsiStatus::ConditionMet => 0x04,
            ScsiStatus::Busy => 0x08,
            ScsiStatus::ReservationConflict => 0x18,
            ScsiStatus::TaskSetFull => 0x28,
            ScsiStatus::AcaActive => 0x30,
            ScsiStatus::TaskAborted => 0x40,
            ScsiStatus::Other(v) => v,
        }
    }
}
