// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

/// Task management function codes (RFC 7143 § 11.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskMgmtFunction {
    AbortTask = 1,
    AbortTaskSet = 2,
    ClearAca = 3,
    ClearTaskSet = 4,
    LogicalUnitReset = 5,
    TargetWarmReset = 6,
    TargetColdReset = 7,
    TaskReassign = 8,
}

impl TaskMgmtFunction {
    pub fn from_raw(v: u8) -> Option<Self> {
        Some(match v & 0x7f {
            1 => Self::AbortTask,
            2 => Self::AbortTaskSet,
            3 => Self::ClearAca,
            4 => Self::ClearTaskSet,
            5 => Self::LogicalUnitReset,
            6 => Self::TargetWarmReset,
            7 => Self::TargetColdReset,
            8 => Self::TaskReassign,
            _ => return None,
        })
    }
}

/// Task management response codes (RFC 7143 § 11.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMgmtResponse {
    FunctionComplete,
    TaskDoesNotExist,
    LunDoesNotExist,
    TaskStillAllegiant,
    ReassignmentNotSupported,
    FunctionNotSupported,
    AuthorizationFailed,
    FunctionRejected,
    Reserved(u8),
}

impl From<u8> for TaskMgmtResponse {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::FunctionComplete,
            1 => Self::TaskDoesNotExist,
            2 => Self::LunDoesNotExist,
            3 => Self::TaskStillAllegiant,
            4 => Self::ReassignmentNotSupported,
            5 => Self::FunctionNotSupported,
            6 => Self::AuthorizationFailed,
            255 => Self::FunctionRejected,
            other => Self::Reserved(other),
        }
    }
}

impl From<TaskMgmtResponse> for u8 {
    fn from(r: TaskMgmtResponse) -> Self {
        match r {
            TaskMgmtResponse::FunctionComplete => 0,
            TaskMgmtResponse::TaskDoesNotExist => 1,
            TaskMgmtResponse::LunDoesNotExist => 2,
            TaskMgmtResponse::TaskStillAllegiant => 3,
            TaskMgmtResponse::ReassignmentNotSupported => 4,
            TaskMgmtResponse::FunctionNotSupported => 5,
            TaskMgmtResponse::AuthorizationFailed => 6,
            TaskMgmtResponse::FunctionRejected => 255,
            TaskMgmtResponse::Reserved(v) => v,
        }
    }
}

impl fmt::Display for TaskMgmtResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved(v) => write!(f, "Reserved({v})"),
            other => write!(f, "{other:?}"),
        }
    }
}
