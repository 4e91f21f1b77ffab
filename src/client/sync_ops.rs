// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Blocking conveniences built on the event-driven core.
//!
//! Each helper queues its request, then alternates [`Transport::wait`] and
//! [`Session::service`] until the request finishes or `TimeoutIo` passes.
//!
//! [`Transport::wait`]: crate::client::transport::Transport::wait

use std::time::Instant;

use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    client::{
        session::{Session, SessionState},
        task::{Completion, ScsiResult, ScsiTask, TaskHandle, TaskOutcome, TaskReply},
        transport::Interest,
    },
    control_block::{
        cdb::RwFlags,
        read::build_read16,
        read_capacity::build_read_capacity16,
        test_unit_ready::build_test_unit_ready,
        write::build_write16,
    },
    error::{IscsiError, Result},
    handlers::text::{DiscoveredTarget, parse_send_targets},
    models::task_mgmt::common::{TaskMgmtFunction, TaskMgmtResponse},
};

impl Session {
    /// Drives I/O until `done` reports true or `TimeoutIo` passes.
    ///
    /// A connection error after `done` became true is not reported: the
    /// caller already has what it waited for.
    pub fn pump_until(
        &mut self,
        what: &'static str,
        mut done: impl FnMut(&Session) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + self.cfg.runtime.timeout_io;
        if let Err(e) = self.service(false, true) {
            return if done(self) { Ok(()) } else { Err(e) };
        }
        loop {
            if done(self) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(what, "synchronous wait timed out");
                self.on_wait_timeout(what);
                return Err(IscsiError::Timeout(what));
            }
            let interest = self.which_events();
            if interest.is_empty() {
                return Err(IscsiError::ConnectionLost);
            }
            let ready = match self.wait_transport(interest, deadline - now) {
                Ok(r) => r,
                Err(e) => {
                    let e = IscsiError::from(e);
                    self.fail_connection(&e);
                    return if done(self) { Ok(()) } else { Err(e) };
                },
            };
            if let Err(e) = self.service(
                ready.contains(Interest::READ),
                ready.contains(Interest::WRITE),
            ) {
                return if done(self) { Ok(()) } else { Err(e) };
            }
        }
    }

    /// Waits for the outcome of `task`. On timeout the task is released
    /// with [`TaskError::Timeout`](crate::error::TaskError::Timeout).
    fn await_outcome(
        &mut self,
        what: &'static str,
        task: TaskHandle,
        mut rx: oneshot::Receiver<TaskOutcome>,
    ) -> Result<TaskReply> {
        let mut out = None;
        let waited = self.pump_until(what, |_| {
            if out.is_none() {
                out = rx.try_recv().ok();
            }
            out.is_some()
        });
        if let Err(e) = waited {
            if matches!(e, IscsiError::Timeout(_)) {
                self.expire_task(task.itt);
            }
            return Err(e);
        }
        match out {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(e.into()),
            None => Err(IscsiError::Timeout(what)),
        }
    }

    /// Runs one SCSI task to completion.
    pub fn execute_sync(&mut self, task: ScsiTask) -> Result<ScsiResult> {
        let (completion, rx) = Completion::channel();
        let handle = self.send_task(task, completion)?;
        match self.await_outcome("scsi task", handle, rx)? {
            TaskReply::Scsi(r) => Ok(r),
            other => Err(IscsiError::Internal(format!(
                "SCSI task completed with {other:?}"
            ))),
        }
    }

    /// Connects (if needed) and logs in.
    pub fn login_sync(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::Created | SessionState::Closed) {
            let target = self.target.clone();
            self.connect(&target)?;
        }
        if self.state == SessionState::Connecting {
            self.login()?;
        }
        self.await_login()
    }

    fn await_login(&mut self) -> Result<()> {
        if let Err(e) = self.pump_until("login", |s| s.state != SessionState::LoggingIn) {
            if self.state == SessionState::LoggingIn {
                self.fail_connection(&e);
            }
            return Err(e);
        }
        match self.state {
            SessionState::FullFeature => Ok(()),
            _ => Err(self
                .login_error
                .clone()
                .map(IscsiError::Login)
                .unwrap_or(IscsiError::ConnectionLost)),
        }
    }

    pub fn logout_sync(&mut self) -> Result<()> {
        self.logout()?;
        if let Err(e) = self.pump_until("logout", |s| s.state != SessionState::LoggingOut) {
            if self.state == SessionState::LoggingOut {
                self.fail_connection(&e);
            }
            return Err(e);
        }
        match self.state {
            SessionState::Closed => Ok(()),
            SessionState::FullFeature => Err(IscsiError::protocol("logout rejected by target")),
            _ => Err(IscsiError::ConnectionLost),
        }
    }

    pub fn reconnect_sync(&mut self) -> Result<()> {
        self.reconnect()?;
        self.await_login()
    }

    /// Ping; returns the echoed data.
    pub fn nop_sync(&mut self, data: Vec<u8>) -> Result<Vec<u8>> {
        let (completion, rx) = Completion::channel();
        let handle = self.nop(data, completion)?;
        match self.await_outcome("nop", handle, rx)? {
            TaskReply::Nop(echo) => Ok(echo),
            other => Err(IscsiError::Internal(format!("NOP completed with {other:?}"))),
        }
    }

    pub fn send_targets_sync(&mut self) -> Result<Vec<DiscoveredTarget>> {
        let (completion, rx) = Completion::channel();
        let handle = self.send_targets(completion)?;
        match self.await_outcome("send targets", handle, rx)? {
            TaskReply::Text(pairs) => Ok(parse_send_targets(&pairs)),
            other => Err(IscsiError::Internal(format!(
                "text request completed with {other:?}"
            ))),
        }
    }

    pub fn task_mgmt_sync(
        &mut self,
        function: TaskMgmtFunction,
        lun: u16,
    ) -> Result<TaskMgmtResponse> {
        let (completion, rx) = Completion::channel();
        let handle = self.task_mgmt(function, lun, completion)?;
        tmf_response(self.await_outcome("task management", handle, rx)?)
    }

    pub fn abort_task_sync(&mut self, task: TaskHandle) -> Result<TaskMgmtResponse> {
        let (completion, rx) = Completion::channel();
        let handle = self.abort_task(task, completion)?;
        tmf_response(self.await_outcome("abort task", handle, rx)?)
    }

    pub fn test_unit_ready_sync(&mut self, lun: u16) -> Result<ScsiResult> {
        self.execute_sync(ScsiTask::no_data(lun, build_test_unit_ready()))
    }

    pub fn read_capacity16_sync(&mut self, lun: u16) -> Result<ScsiResult> {
        self.execute_sync(ScsiTask::read(lun, build_read_capacity16(32), 32))
    }

    pub fn read16_sync(
        &mut self,
        lun: u16,
        lba: u64,
        blocks: u32,
        block_len: u32,
    ) -> Result<ScsiResult> {
        let cdb = build_read16(lba, blocks, RwFlags::empty())?;
        let len = blocks.saturating_mul(block_len);
        self.execute_sync(ScsiTask::read(lun, cdb, len))
    }

    /// `data` must hold a whole number of blocks.
    pub fn write16_sync(
        &mut self,
        lun: u16,
        lba: u64,
        block_len: u32,
        data: Vec<u8>,
    ) -> Result<ScsiResult> {
        let blocks = (data.len() / block_len.max(1) as usize) as u32;
        let cdb = build_write16(lba, blocks, RwFlags::empty())?;
        self.execute_sync(ScsiTask::write(lun, cdb, data))
    }
}

fn tmf_response(reply: TaskReply) -> Result<TaskMgmtResponse> {
    match reply {
        TaskReply::TaskMgmt { response, .. } => Ok(response),
        other => Err(IscsiError::Internal(format!(
            "task management completed with {other:?}"
        ))),
    }
}
