// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Outstanding tasks of one session, keyed by Initiator Task Tag.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    client::task::{Completion, ScsiTask, TaskOutcome},
    error::{IscsiError, TaskError},
    models::{common::RESERVED_TAG, task_mgmt::common::TaskMgmtFunction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Waiting for the CmdSN window to open.
    Queued,
    /// Command PDU queued for the wire; waiting for status.
    Sent,
    /// Waiting for Data-In or an R2T.
    AwaitingData,
    Completed,
}

/// Per-command transfer state.
#[derive(Debug)]
pub(crate) struct ScsiState {
    pub task: ScsiTask,
    /// Data-In, placed by buffer offset.
    pub data_in: Vec<u8>,
    /// Highest byte offset received so far.
    pub received: usize,
    /// Data-Out bytes already queued (immediate + unsolicited + solicited).
    pub sent: usize,
    /// Unit attention retries used.
    pub retries: u32,
}

impl ScsiState {
    pub fn new(task: ScsiTask) -> Self {
        Self {
            task,
            data_in: Vec::new(),
            received: 0,
            sent: 0,
            retries: 0,
        }
    }

    /// Forgets transfer progress before the command is issued again.
    pub fn reset_transfer(&mut self) {
        self.data_in.clear();
        self.received = 0;
        self.sent = 0;
    }
}

#[derive(Debug)]
pub(crate) enum TaskKind {
    Scsi(Box<ScsiState>),
    TaskMgmt {
        function: TaskMgmtFunction,
        lun: u16,
        referenced: Option<u32>,
    },
    Nop,
    Text {
        /// Data of C=1 responses waiting for the final one.
        partial: Vec<u8>,
    },
    Logout,
}

#[derive(Debug)]
pub(crate) struct Task {
    pub itt: u32,
    pub kind: TaskKind,
    pub phase: TaskPhase,
    /// CmdSN the command was issued with, for RefCmdSN.
    pub cmd_sn: u32,
    seq: u64,
    completion: Option<Completion>,
}

impl Task {
    pub fn new(kind: TaskKind, completion: Option<Completion>) -> Self {
        Self {
            itt: RESERVED_TAG,
            kind,
            phase: TaskPhase::Queued,
            cmd_sn: 0,
            seq: 0,
            completion,
        }
    }

    pub fn lun(&self) -> Option<u16> {
        match &self.kind {
            TaskKind::Scsi(s) => Some(s.task.lun),
            TaskKind::TaskMgmt { lun, .. } => Some(*lun),
            _ => None,
        }
    }

    #[inline]
    pub fn is_scsi(&self) -> bool {
        matches!(self.kind, TaskKind::Scsi(_))
    }

    pub fn scsi_mut(&mut self) -> Option<&mut ScsiState> {
        match &mut self.kind {
            TaskKind::Scsi(s) => Some(&mut **s),
            _ => None,
        }
    }

    pub fn finish(mut self, outcome: TaskOutcome) {
        self.phase = TaskPhase::Completed;
        if let Some(c) = self.completion.take() {
            c.deliver(outcome);
        }
    }
}

#[derive(Debug)]
pub(crate) struct TaskTable {
    tasks: HashMap<u32, Task>,
    next_tag: u32,
    next_seq: u64,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(tag: u32) -> Self {
        Self {
            tasks: HashMap::new(),
            next_tag: tag,
            next_seq: 0,
        }
    }

    /// Next tag not used by an outstanding task. Increases with wraparound,
    /// never yields 0xffffffff.
    pub fn alloc_tag(&mut self) -> u32 {
        loop {
            let tag = self.next_tag;
            self.next_tag = self.next_tag.wrapping_add(1);
            if tag != RESERVED_TAG && !self.tasks.contains_key(&tag) {
                return tag;
            }
        }
    }

    /// Stores `task` under a fresh tag and returns the tag.
    pub fn register(&mut self, mut task: Task) -> u32 {
        let tag = self.alloc_tag();
        task.itt = tag;
        task.seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.insert(tag, task);
        tag
    }

    #[inline]
    pub fn get(&self, tag: u32) -> Option<&Task> {
        self.tasks.get(&tag)
    }

    #[inline]
    pub fn get_mut(&mut self, tag: u32) -> Option<&mut Task> {
        self.tasks.get_mut(&tag)
    }

    /// Removes the task and delivers `outcome`. `false` for unknown tags.
    pub fn complete(&mut self, tag: u32, outcome: TaskOutcome) -> bool {
        match self.tasks.remove(&tag) {
            Some(task) => {
                debug!(itt = tag, ok = outcome.is_ok(), "task complete");
                task.finish(outcome);
                true
            },
            None => {
                warn!(itt = tag, "completion for unknown task dropped");
                false
            },
        }
    }

    /// Fails every outstanding task with `err`, oldest first. Each task is
    /// completed exactly once; the table is empty afterwards.
    pub fn cancel_all(&mut self, err: TaskError) -> usize {
        let mut all: Vec<Task> = self.tasks.drain().map(|(_, t)| t).collect();
        all.sort_by_key(|t| t.seq);
        let n = all.len();
        for task in all {
            task.finish(Err(err.clone()));
        }
        if n > 0 {
            debug!(cancelled = n, error = %err, "outstanding tasks cancelled");
        }
        n
    }

    /// Removes a task without completing it (for re-issue).
    pub fn take(&mut self, tag: u32) -> Option<Task> {
        self.tasks.remove(&tag)
    }

    /// Puts back a task obtained from [`TaskTable::take`] under its tag.
    pub fn reinsert(&mut self, task: Task) -> Result<(), IscsiError> {
        if task.itt == RESERVED_TAG || self.tasks.contains_key(&task.itt) {
            return Err(IscsiError::Internal(format!(
                "task tag {:#x} already outstanding",
                task.itt
            )));
        }
        self.tasks.insert(task.itt, task);
        Ok(())
    }

    /// SCSI tasks addressed to `lun`, oldest first.
    pub fn tags_for_lun(&self, lun: u16) -> Vec<u32> {
        self.ordered(|t| t.is_scsi() && t.lun() == Some(lun))
    }

    /// Every SCSI task, oldest first.
    pub fn scsi_tags(&self) -> Vec<u32> {
        self.ordered(Task::is_scsi)
    }

    pub fn scsi_len(&self) -> usize {
        self.tasks.values().filter(|t| t.is_scsi()).count()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn ordered(&self, keep: impl Fn(&Task) -> bool) -> Vec<u32> {
        let mut v: Vec<(u64, u32)> = self
            .tasks
            .values()
            .filter(|t| keep(t))
            .map(|t| (t.seq, t.itt))
            .collect();
        v.sort_unstable();
        v.into_iter().map(|(_, tag)| tag).collect()
    }
}
