// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tokio front end for [`Session`].
//!
//! The session stays non-blocking and runtime-agnostic; this wrapper
//! registers its descriptor with the reactor through [`AsyncFd`] and feeds
//! readiness back into [`Session::service`].

use std::os::fd::{AsRawFd, RawFd};

use tokio::{
    io::{Interest as TokioInterest, Ready, unix::AsyncFd},
    net::TcpStream,
    sync::oneshot,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    cfg::config::Config,
    client::{
        common::io_with_timeout,
        session::{Session, SessionState},
        task::{Completion, ScsiResult, ScsiTask, TaskHandle, TaskOutcome, TaskReply},
        transport::{Interest, TargetAddress, TcpTransport, Transport, with_default_port},
    },
    error::{IscsiError, Result},
    handlers::text::{DiscoveredTarget, parse_send_targets},
    models::task_mgmt::common::{TaskMgmtFunction, TaskMgmtResponse},
};

/// Borrowed descriptor; the session's transport owns the socket.
struct SessionFd(RawFd);

impl AsRawFd for SessionFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

pub struct AsyncSession {
    session: Session,
    fd: Option<AsyncFd<SessionFd>>,
    fd_generation: u64,
    cancel: CancellationToken,
}

impl AsyncSession {
    pub fn new(cfg: Config) -> Self {
        Self::from_session(Session::new(cfg))
    }

    pub fn from_session(session: Session) -> Self {
        Self {
            session,
            fd: None,
            fd_generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[inline]
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Cancelling the token makes every pending call return
    /// [`IscsiError::Cancelled`]. Outstanding tasks stay registered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    // ── connection ──────────────────────────────────────────────────────────

    async fn dial(&self, portal: &str) -> Result<Box<dyn Transport>> {
        let addr = with_default_port(portal);
        let stream = timeout(
            self.session.cfg.runtime.timeout_connection,
            TcpStream::connect(addr.as_str()),
        )
        .await
        .map_err(|_| IscsiError::Timeout("connect"))??;
        debug!(peer = %addr, "tcp connected");
        let std = stream.into_std()?;
        Ok(Box::new(TcpTransport::from_stream(std)?))
    }

    /// Dials `addr` without blocking the runtime.
    pub async fn connect(&mut self, addr: &TargetAddress) -> Result<()> {
        if !matches!(
            self.session.state,
            SessionState::Created | SessionState::Closed
        ) {
            return Err(self.session.invalid("connect"));
        }
        let transport = self.dial(&addr.portal).await?;
        self.session.set_target(addr);
        self.session.attach(transport)
    }

    /// Connects to the configured target when needed and logs in.
    pub async fn login(&mut self) -> Result<()> {
        if matches!(
            self.session.state,
            SessionState::Created | SessionState::Closed
        ) {
            let target = self.session.target.clone();
            self.connect(&target).await?;
        }
        if self.session.state == SessionState::Connecting {
            self.session.login()?;
        }
        self.await_login().await
    }

    async fn await_login(&mut self) -> Result<()> {
        let waited = self
            .drive("login", |s| (s.state != SessionState::LoggingIn).then_some(()))
            .await;
        if let Err(e) = waited {
            if self.session.state == SessionState::LoggingIn {
                self.session.fail_connection(&e);
            }
            return Err(e);
        }
        match self.session.state {
            SessionState::FullFeature => Ok(()),
            _ => Err(self
                .session
                .login_error
                .clone()
                .map(IscsiError::Login)
                .unwrap_or(IscsiError::ConnectionLost)),
        }
    }

    /// New connection, same ISID and TSIH.
    pub async fn reconnect(&mut self) -> Result<()> {
        if !matches!(
            self.session.state,
            SessionState::Reconnecting | SessionState::FullFeature
        ) {
            return Err(self.session.invalid("reconnect"));
        }
        let portal = self.session.target.portal.clone();
        let transport = self.dial(&portal).await?;
        info!(%portal, "reconnecting");
        self.session.reconnect_with(transport)?;
        self.await_login().await
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.session.logout()?;
        let waited = self
            .drive("logout", |s| {
                (s.state != SessionState::LoggingOut).then_some(())
            })
            .await;
        if let Err(e) = waited {
            if self.session.state == SessionState::LoggingOut {
                self.session.fail_connection(&e);
            }
            return Err(e);
        }
        match self.session.state {
            SessionState::Closed => Ok(()),
            SessionState::FullFeature => Err(IscsiError::protocol("logout rejected by target")),
            _ => Err(IscsiError::ConnectionLost),
        }
    }

    // ── requests ────────────────────────────────────────────────────────────

    pub async fn execute(&mut self, task: ScsiTask) -> Result<ScsiResult> {
        let (completion, rx) = Completion::channel();
        let handle = self.session.send_task(task, completion)?;
        scsi_result(self.await_outcome("scsi task", handle, rx).await?)
    }

    /// Submits every task at once (subject to the CmdSN window and queue
    /// depth) and returns the outcomes in submission order.
    pub async fn execute_all(&mut self, tasks: Vec<ScsiTask>) -> Result<Vec<TaskOutcome>> {
        let mut handles = Vec::with_capacity(tasks.len());
        let mut rxs = Vec::with_capacity(tasks.len());
        for task in tasks {
            let (completion, rx) = Completion::channel();
            handles.push(self.session.send_task(task, completion)?);
            rxs.push(rx);
        }
        let mut outcomes: Vec<Option<TaskOutcome>> = rxs.iter().map(|_| None).collect();
        let waited = self
            .drive("scsi tasks", |_| {
                for (slot, rx) in outcomes.iter_mut().zip(rxs.iter_mut()) {
                    if slot.is_none() {
                        *slot = rx.try_recv().ok();
                    }
                }
                outcomes.iter().all(Option::is_some).then_some(())
            })
            .await;
        if let Err(e) = waited {
            if matches!(e, IscsiError::Timeout(_)) {
                for handle in handles {
                    self.session.expire_task(handle.itt);
                }
            }
            return Err(e);
        }
        Ok(outcomes.into_iter().flatten().collect())
    }

    pub async fn nop(&mut self, data: Vec<u8>) -> Result<Vec<u8>> {
        let (completion, rx) = Completion::channel();
        let handle = self.session.nop(data, completion)?;
        match self.await_outcome("nop", handle, rx).await? {
            TaskReply::Nop(echo) => Ok(echo),
            other => Err(IscsiError::Internal(format!("NOP completed with {other:?}"))),
        }
    }

    pub async fn send_targets(&mut self) -> Result<Vec<DiscoveredTarget>> {
        let (completion, rx) = Completion::channel();
        let handle = self.session.send_targets(completion)?;
        match self.await_outcome("send targets", handle, rx).await? {
            TaskReply::Text(pairs) => Ok(parse_send_targets(&pairs)),
            other => Err(IscsiError::Internal(format!(
                "text request completed with {other:?}"
            ))),
        }
    }

    pub async fn task_mgmt(
        &mut self,
        function: TaskMgmtFunction,
        lun: u16,
    ) -> Result<TaskMgmtResponse> {
        let (completion, rx) = Completion::channel();
        let handle = self.session.task_mgmt(function, lun, completion)?;
        tmf_response(self.await_outcome("task management", handle, rx).await?)
    }

    pub async fn abort_task(&mut self, task: TaskHandle) -> Result<TaskMgmtResponse> {
        let (completion, rx) = Completion::channel();
        let handle = self.session.abort_task(task, completion)?;
        tmf_response(self.await_outcome("abort task", handle, rx).await?)
    }

    /// A timed-out task is released with `TaskError::Timeout`.
    async fn await_outcome(
        &mut self,
        what: &'static str,
        task: TaskHandle,
        mut rx: oneshot::Receiver<TaskOutcome>,
    ) -> Result<TaskReply> {
        match self.drive(what, |_| rx.try_recv().ok()).await {
            Ok(outcome) => outcome.map_err(IscsiError::from),
            Err(e) => {
                if matches!(e, IscsiError::Timeout(_)) {
                    self.session.expire_task(task.itt);
                }
                Err(e)
            },
        }
    }

    // ── driving ─────────────────────────────────────────────────────────────

    /// Runs the session until `done` yields, bounded by `TimeoutIo` and the
    /// cancellation token.
    async fn drive<T>(
        &mut self,
        what: &'static str,
        done: impl FnMut(&Session) -> Option<T>,
    ) -> Result<T> {
        let cancel = self.cancel.clone();
        let io_timeout = self.session.cfg.runtime.timeout_io;
        let res = io_with_timeout(what, self.drive_inner(done), io_timeout, &cancel).await;
        if matches!(res, Err(IscsiError::Timeout(_))) {
            self.session.on_wait_timeout(what);
        }
        res
    }

    async fn drive_inner<T>(&mut self, mut done: impl FnMut(&Session) -> Option<T>) -> Result<T> {
        if let Err(e) = self.session.service(false, true) {
            return done(&self.session).ok_or(e);
        }
        loop {
            if let Some(v) = done(&self.session) {
                return Ok(v);
            }
            let interest = self.session.which_events();
            if interest.is_empty() {
                return Err(IscsiError::ConnectionLost);
            }
            self.refresh_fd()?;
            let Some(afd) = self.fd.as_ref() else {
                return Err(IscsiError::ConnectionLost);
            };

            let guard = if interest.contains(Interest::WRITE) {
                tokio::select! {
                    g = afd.readable() => g,
                    g = afd.writable() => g,
                }
            } else {
                afd.readable().await
            };
            let mut guard = match guard {
                Ok(g) => g,
                Err(e) => {
                    let e = IscsiError::from(e);
                    self.session.fail_connection(&e);
                    return done(&self.session).ok_or(e);
                },
            };

            let ready = guard.ready();
            let readable = ready.is_readable() || ready.is_read_closed() || ready.is_error();
            let writable = ready.is_writable() || ready.is_write_closed();
            match self.session.service(readable, writable) {
                Ok(blocked) => {
                    let mut clear = Ready::EMPTY;
                    if blocked.contains(Interest::READ) {
                        clear |= Ready::READABLE;
                    }
                    if blocked.contains(Interest::WRITE) {
                        clear |= Ready::WRITABLE;
                    }
                    guard.clear_ready_matching(clear);
                },
                Err(e) => {
                    drop(guard);
                    return done(&self.session).ok_or(e);
                },
            }
        }
    }

    /// Re-registers with the reactor when the session switched transports.
    fn refresh_fd(&mut self) -> Result<()> {
        let generation = self.session.connection_generation();
        if self.fd.is_some() && self.fd_generation == generation {
            return Ok(());
        }
        self.fd = None;
        let Some(raw) = self.session.get_fd() else {
            return Err(IscsiError::Internal(
                "transport without a descriptor cannot be driven by tokio".into(),
            ));
        };
        self.fd = Some(AsyncFd::with_interest(
            SessionFd(raw),
            TokioInterest::READABLE | TokioInterest::WRITABLE,
        )?);
        self.fd_generation = generation;
        debug!(fd = raw, generation, "descriptor registered");
        Ok(())
    }
}

fn scsi_result(reply: TaskReply) -> Result<ScsiResult> {
    match reply {
        TaskReply::Scsi(r) => Ok(r),
        other => Err(IscsiError::Internal(format!(
            "SCSI task completed with {other:?}"
        ))),
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
