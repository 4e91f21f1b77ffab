// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Task management requests and the local effect of their responses.

use tracing::{debug, info, warn};

use crate::{
    client::{
        session::{Session, SessionState},
        task::{Completion, TaskHandle, TaskReply},
        task_table::{Task, TaskKind, TaskPhase},
    },
    control_block::report_luns::encode_lun,
    error::{IscsiError, Result, TaskError},
    models::{
        common::RESERVED_TAG,
        data_format::PduWithData,
        parse::Pdu,
        task_mgmt::{
            common::{TaskMgmtFunction, TaskMgmtResponse},
            request::{TaskMgmtRequest, TaskMgmtRequestBuilder},
            response::TaskMgmtResponsePdu,
        },
    },
};

impl Session {
    /// ABORT TASK for an outstanding SCSI task. A task still waiting for the
    /// CmdSN window is aborted locally right away.
    pub fn abort_task(&mut self, task: TaskHandle, completion: Completion) -> Result<TaskHandle> {
        let Some(lun) = self.tasks.get(task.itt).filter(|t| t.is_scsi()).and_then(Task::lun)
        else {
            return Err(IscsiError::InvalidState {
                op: "abort task",
                state: format!("no outstanding SCSI task {:#x}", task.itt),
            });
        };
        self.send_task_mgmt(TaskMgmtFunction::AbortTask, lun, Some(task.itt), completion)
    }

    pub fn abort_task_set(&mut self, lun: u16, completion: Completion) -> Result<TaskHandle> {
        self.send_task_mgmt(TaskMgmtFunction::AbortTaskSet, lun, None, completion)
    }

    pub fn clear_aca(&mut self, lun: u16, completion: Completion) -> Result<TaskHandle> {
        self.send_task_mgmt(TaskMgmtFunction::ClearAca, lun, None, completion)
    }

    pub fn clear_task_set(&mut self, lun: u16, completion: Completion) -> Result<TaskHandle> {
        self.send_task_mgmt(TaskMgmtFunction::ClearTaskSet, lun, None, completion)
    }

    pub fn lun_reset(&mut self, lun: u16, completion: Completion) -> Result<TaskHandle> {
        self.send_task_mgmt(TaskMgmtFunction::LogicalUnitReset, lun, None, completion)
    }

    pub fn target_warm_reset(&mut self, completion: Completion) -> Result<TaskHandle> {
        self.send_task_mgmt(TaskMgmtFunction::TargetWarmReset, 0, None, completion)
    }

    /// The target drops every connection after answering; expect the
    /// session to end up `Reconnecting` or `Dead`.
    pub fn target_cold_reset(&mut self, completion: Completion) -> Result<TaskHandle> {
        self.send_task_mgmt(TaskMgmtFunction::TargetColdReset, 0, None, completion)
    }

    /// Any function but ABORT TASK and TASK REASSIGN, which need a
    /// referenced task.
    pub fn task_mgmt(
        &mut self,
        function: TaskMgmtFunction,
        lun: u16,
        completion: Completion,
    ) -> Result<TaskHandle> {
        if matches!(
            function,
            TaskMgmtFunction::AbortTask | TaskMgmtFunction::TaskReassign
        ) {
            return Err(IscsiError::InvalidState {
                op: "task management",
                state: format!("{function:?} needs a referenced task"),
            });
        }
        self.send_task_mgmt(function, lun, None, completion)
    }

    /// Releases a task whose caller stopped waiting: it completes with
    /// [`TaskError::Timeout`] and its tag is free again. A SCSI command the
    /// target has already seen is aborted there as well, so a late answer
    /// cannot reach the released tag.
    pub(crate) fn expire_task(&mut self, itt: u32) {
        let Some(task) = self.tasks.get(itt) else {
            return;
        };
        let queued = task.phase == TaskPhase::Queued;
        let abort_lun = task.lun().filter(|_| task.is_scsi() && !queued);
        if queued {
            self.pending.retain(|t| *t != itt);
        }
        if let Some(lun) = abort_lun.filter(|_| self.state == SessionState::FullFeature) {
            let report = Completion::callback(move |outcome| {
                debug!(itt, ?outcome, "abort of timed-out task answered");
            });
            if let Err(e) = self.send_task_mgmt(TaskMgmtFunction::AbortTask, lun, Some(itt), report)
            {
                warn!(itt, error = %e, "timed-out task not aborted at the target");
            }
        }
        warn!(itt, "task timed out");
        self.tasks.complete(itt, Err(TaskError::Timeout));
    }

    fn send_task_mgmt(
        &mut self,
        function: TaskMgmtFunction,
        lun: u16,
        referenced: Option<u32>,
        completion: Completion,
    ) -> Result<TaskHandle> {
        self.require_full_feature("task management")?;

        let mut ref_cmd_sn = self.cmd_sn;
        if let Some(r) = referenced {
            let queued = self
                .tasks
                .get(r)
                .map(|t| (t.phase == TaskPhase::Queued, t.cmd_sn));
            if let Some((true, _)) = queued {
                debug!(itt = r, "aborting task that was never sent");
                self.pending.retain(|t| *t != r);
                self.tasks.complete(r, Err(TaskError::Aborted));
            } else if let Some((false, sn)) = queued {
                ref_cmd_sn = sn;
            }
        }

        let itt = self.tasks.register(Task::new(
            TaskKind::TaskMgmt {
                function,
                lun,
                referenced,
            },
            Some(completion),
        ));
        let cmd_sn = self.immediate_cmd_sn();
        if let Some(t) = self.tasks.get_mut(itt) {
            t.cmd_sn = cmd_sn;
            t.phase = TaskPhase::Sent;
        }
        let hdr = TaskMgmtRequestBuilder::new(function)
            .lun(encode_lun(lun))
            .initiator_task_tag(itt)
            .referenced_task_tag(referenced.unwrap_or(RESERVED_TAG))
            .cmd_sn(cmd_sn)
            .exp_stat_sn(self.exp_stat_sn)
            .ref_cmd_sn(ref_cmd_sn)
            .header;
        info!(itt, ?function, lun, referenced = ?referenced, "task management request");
        self.queue_pdu(Pdu::from(PduWithData::<TaskMgmtRequest>::from_header(&hdr)));
        Ok(TaskHandle { itt })
    }

    pub(crate) fn handle_task_mgmt_response(
        &mut self,
        pdu: PduWithData<TaskMgmtResponsePdu>,
    ) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        let response = hdr.response_code();

        let Some(task) = self.tasks.take(itt) else {
            warn!(itt, ?response, "task management response for unknown task dropped");
            return Ok(());
        };
        let TaskKind::TaskMgmt {
            function,
            lun,
            referenced,
        } = task.kind
        else {
            self.tasks.reinsert(task)?;
            return Err(IscsiError::protocol(format!(
                "task management response for task {itt:#x} of another kind"
            )));
        };
        info!(itt, ?function, ?response, "task management response");

        if response == TaskMgmtResponse::FunctionComplete {
            let affected: Vec<u32> = match function {
                TaskMgmtFunction::AbortTask => referenced.into_iter().collect(),
                TaskMgmtFunction::AbortTaskSet
                | TaskMgmtFunction::ClearTaskSet
                | TaskMgmtFunction::LogicalUnitReset => self.tasks.tags_for_lun(lun),
                TaskMgmtFunction::TargetWarmReset | TaskMgmtFunction::TargetColdReset => {
                    self.tasks.scsi_tags()
                },
                TaskMgmtFunction::ClearAca | TaskMgmtFunction::TaskReassign => Vec::new(),
            };
            for tag in affected {
                if self.tasks.get(tag).is_some_and(Task::is_scsi) {
                    self.tasks.complete(tag, Err(TaskError::Aborted));
                }
            }
            self.pending.retain(|t| self.tasks.get(*t).is_some());
        }

        task.finish(Ok(TaskReply::TaskMgmt { function, response }));
        Ok(())
    }
}
