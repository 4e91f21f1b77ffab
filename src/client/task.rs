// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use tokio::sync::oneshot;
use tracing::warn;

use crate::{
    control_block::{
        cdb::Cdb,
        datain::{DataIn, unmarshal_datain},
    },
    error::{DataInError, TaskError},
    models::{
        command::common::{ResponseCode, ScsiStatus, TaskAttribute},
        data::sense_data::{SenseData, SenseKey},
        task_mgmt::common::{TaskMgmtFunction, TaskMgmtResponse},
    },
};

/// Data transfer direction of a SCSI task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    Read,
    Write,
}

/// A SCSI command as submitted by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct ScsiTask {
    pub lun: u16,
    pub cdb: Cdb,
    pub direction: Direction,
    /// Expected data transfer length in bytes.
    pub expected_len: u32,
    pub data_out: Vec<u8>,
    pub attribute: TaskAttribute,
}

impl ScsiTask {
    /// A command without data transfer (TEST UNIT READY, START STOP UNIT...).
    pub fn no_data(lun: u16, cdb: Cdb) -> Self {
        Self {
            lun,
            cdb,
            direction: Direction::None,
            expected_len: 0,
            data_out: Vec::new(),
            attribute: TaskAttribute::Simple,
        }
    }

    pub fn read(lun: u16, cdb: Cdb, expected_len: u32) -> Self {
        Self {
            direction: Direction::Read,
            expected_len,
            ..Self::no_data(lun, cdb)
        }
    }

    pub fn write(lun: u16, cdb: Cdb, data: Vec<u8>) -> Self {
        Self {
            direction: Direction::Write,
            expected_len: data.len() as u32,
            data_out: data,
            ..Self::no_data(lun, cdb)
        }
    }

    pub fn with_attribute(mut self, attribute: TaskAttribute) -> Self {
        self.attribute = attribute;
        self
    }
}

impl fmt::Debug for ScsiTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScsiTask")
            .field("lun", &self.lun)
            .field("cdb", &self.cdb)
            .field("direction", &self.direction)
            .field("expected_len", &self.expected_len)
            .field("data_out_len", &self.data_out.len())
            .finish()
    }
}

/// Residual reported by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residual {
    /// Fewer bytes than expected were transferred.
    Underflow(u32),
    /// The target wanted to transfer more than expected.
    Overflow(u32),
}

/// Outcome of a SCSI command the target answered.
///
/// CHECK CONDITION and friends are successful exchanges; inspect `status`
/// and `sense`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScsiResult {
    pub itt: u32,
    pub status: ScsiStatus,
    pub response: ResponseCode,
    pub sense: Option<SenseData>,
    pub data: Vec<u8>,
    pub residual: Option<Residual>,
    /// CDB the result belongs to, used to unmarshal `data`.
    pub cdb: Cdb,
}

impl ScsiResult {
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status == ScsiStatus::Good && self.response == ResponseCode::CommandCompleted
    }

    pub fn sense_key(&self) -> Option<SenseKey> {
        self.sense.as_ref().map(|s| s.sense_key)
    }

    pub fn asc_ascq(&self) -> Option<(u8, u8)> {
        self.sense.as_ref().map(SenseData::asc_ascq)
    }

    pub fn is_unit_attention(&self) -> bool {
        self.status == ScsiStatus::CheckCondition
            && self.sense.as_ref().is_some_and(SenseData::is_unit_attention)
    }

    /// Typed view of the data-in payload, chosen by the CDB operation code.
    pub fn datain(&self) -> Result<DataIn, DataInError> {
        unmarshal_datain(self.cdb.as_bytes(), &self.data)
    }
}

/// What a completed task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReply {
    Scsi(ScsiResult),
    TaskMgmt {
        function: TaskMgmtFunction,
        response: TaskMgmtResponse,
    },
    /// NOP-In echo data.
    Nop(Vec<u8>),
    /// Text response key/value pairs.
    Text(Vec<(String, String)>),
}

impl TaskReply {
    pub fn into_scsi(self) -> Option<ScsiResult> {
        match self {
            TaskReply::Scsi(r) => Some(r),
            _ => None,
        }
    }
}

pub type TaskOutcome = Result<TaskReply, TaskError>;

/// Where a task's outcome goes. Fired exactly once.
pub enum Completion {
    Callback(Box<dyn FnOnce(TaskOutcome) + Send>),
    Channel(oneshot::Sender<TaskOutcome>),
}

impl Completion {
    pub fn callback(f: impl FnOnce(TaskOutcome) + Send + 'static) -> Self {
        Completion::Callback(Box::new(f))
    }

    pub fn channel() -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Completion::Channel(tx), rx)
    }

    pub(crate) fn deliver(self, outcome: TaskOutcome) {
        match self {
            Completion::Callback(f) => f(outcome),
            Completion::Channel(tx) => {
                if tx.send(outcome).is_err() {
                    warn!("task completion receiver dropped");
                }
            },
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Callback(_) => f.write_str("Completion::Callback"),
            Completion::Channel(_) => f.write_str("Completion::Channel"),
        }
    }
}

/// Reference to an outstanding task, usable for ABORT TASK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub itt: u32,
}
