// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Event-driven initiator session over one connection.
//!
//! The session never blocks on the network. Callers ask which readiness it
//! waits for ([`Session::which_events`]), poll the descriptor themselves and
//! report readiness back through [`Session::service`]. Everything else
//! (login, commands, task management) only queues PDUs and registers tasks.

use std::{collections::VecDeque, fmt, os::fd::RawFd, time::Duration};

use bytes::BytesMut;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use crate::{
    cfg::{
        config::Config,
        enums::ReconnectPolicy,
    },
    client::{
        task::{Completion, Direction, ScsiTask, TaskHandle, TaskOutcome},
        task_table::{ScsiState, Task, TaskKind, TaskTable},
        transport::{Connector, Interest, TargetAddress, TcpConnector, Transport},
    },
    error::{IscsiError, LoginError, Result, TaskError},
    models::{
        codec::{Decoded, PduCodec},
        data_format::Digests,
        parse::{Pdu, PduFrame},
    },
    state_machine::login::{
        common::{LoginIds, LoginMachine, LoginOutcome},
        negotiation::NegotiatedParams,
    },
    utils::{generate_isid, sn_le, sn_lt},
};

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    /// Transport up, login not started yet.
    Connecting,
    LoggingIn,
    FullFeature,
    LoggingOut,
    /// Clean logout finished.
    Closed,
    /// Connection lost; waiting for [`Session::reconnect`].
    Reconnecting,
    Dead,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Session {
    pub(crate) cfg: Config,
    pub(crate) target: TargetAddress,
    connector: Option<Box<dyn Connector>>,
    transport: Option<Box<dyn Transport>>,
    pub(crate) state: SessionState,
    /// Bumped every time a transport is installed.
    generation: u64,

    codec: PduCodec,
    rx: BytesMut,
    scratch: Vec<u8>,
    tx: VecDeque<Vec<u8>>,
    tx_off: usize,

    pub(crate) isid: [u8; 6],
    pub(crate) tsih: u16,
    pub(crate) cid: u16,
    pub(crate) cmd_sn: u32,
    pub(crate) exp_stat_sn: u32,
    pub(crate) exp_cmd_sn: u32,
    pub(crate) max_cmd_sn: u32,
    pub(crate) params: NegotiatedParams,

    pub(crate) login: Option<LoginMachine>,
    pub(crate) login_error: Option<LoginError>,
    pub(crate) logout_itt: Option<u32>,
    /// Login redirections followed since the last successful login.
    pub(crate) redirects: u32,

    pub(crate) tasks: TaskTable,
    /// SCSI tasks waiting for the CmdSN window, in submission order.
    pub(crate) pending: VecDeque<u32>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("isid", &hex::encode(self.isid))
            .field("tsih", &self.tsih)
            .field("cmd_sn", &self.cmd_sn)
            .field("exp_stat_sn", &self.exp_stat_sn)
            .field("max_cmd_sn", &self.max_cmd_sn)
            .field("tasks", &self.tasks.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Session {
    /// Session dialing the configured portal over TCP.
    pub fn new(cfg: Config) -> Self {
        Self::with_connector(cfg, Box::new(TcpConnector))
    }

    pub fn with_connector(cfg: Config, connector: Box<dyn Connector>) -> Self {
        let mut s = Self::detached(cfg);
        s.connector = Some(connector);
        s
    }

    /// Session without a connector; the caller attaches transports itself
    /// and [`Session::reconnect`] is unavailable.
    pub fn detached(cfg: Config) -> Self {
        let (isid, isid_hex) = generate_isid();
        debug!(isid = %isid_hex, "new session");
        Self {
            target: TargetAddress::from_config(&cfg),
            codec: PduCodec::new(cfg.runtime.max_pdu_data),
            cfg,
            connector: None,
            transport: None,
            state: SessionState::Created,
            generation: 0,
            rx: BytesMut::with_capacity(READ_CHUNK),
            scratch: vec![0; READ_CHUNK],
            tx: VecDeque::new(),
            tx_off: 0,
            isid,
            tsih: 0,
            cid: 0,
            cmd_sn: 1,
            exp_stat_sn: 0,
            exp_cmd_sn: 1,
            max_cmd_sn: 1,
            params: NegotiatedParams::default(),
            login: None,
            login_error: None,
            logout_itt: None,
            redirects: 0,
            tasks: TaskTable::new(),
            pending: VecDeque::new(),
        }
    }

    // ── accessors ───────────────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    #[inline]
    pub fn negotiated(&self) -> &NegotiatedParams {
        &self.params
    }

    #[inline]
    pub fn isid(&self) -> [u8; 6] {
        self.isid
    }

    #[inline]
    pub fn tsih(&self) -> u16 {
        self.tsih
    }

    #[inline]
    pub fn cmd_sn(&self) -> u32 {
        self.cmd_sn
    }

    #[inline]
    pub fn exp_stat_sn(&self) -> u32 {
        self.exp_stat_sn
    }

    #[inline]
    pub fn max_cmd_sn(&self) -> u32 {
        self.max_cmd_sn
    }

    /// Tasks registered and not yet completed.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Why the last login failed, if it did.
    pub fn last_login_error(&self) -> Option<&LoginError> {
        self.login_error.as_ref()
    }

    /// Changes on every new transport; lets event loops notice a new fd.
    #[inline]
    pub fn connection_generation(&self) -> u64 {
        self.generation
    }

    // ── event-loop surface ──────────────────────────────────────────────────

    /// Readiness the session waits for. Empty when no transport is up.
    pub fn which_events(&self) -> Interest {
        if self.transport.is_none() {
            return Interest::empty();
        }
        let mut interest = Interest::READ;
        if !self.tx.is_empty() {
            interest |= Interest::WRITE;
        }
        interest
    }

    pub fn get_fd(&self) -> Option<RawFd> {
        self.transport.as_ref().and_then(|t| t.raw_fd())
    }

    /// Blocks on the transport until `interest` is ready or `timeout`
    /// passes. Used by the synchronous helpers only.
    pub(crate) fn wait_transport(
        &mut self,
        interest: Interest,
        timeout: Duration,
    ) -> std::io::Result<Interest> {
        match self.transport.as_mut() {
            Some(t) => t.wait(interest, Some(timeout)),
            None => Err(std::io::ErrorKind::NotConnected.into()),
        }
    }

    /// Performs the I/O the reported readiness allows: reads and handles
    /// every complete PDU, then writes queued bytes. Returns the directions
    /// that hit `WouldBlock`.
    ///
    /// A fatal error tears the connection down (every outstanding task is
    /// completed with `ConnectionLost`) before it is returned.
    pub fn service(&mut self, readable: bool, writable: bool) -> Result<Interest> {
        if self.transport.is_none() {
            return Ok(Interest::empty());
        }
        match self.service_inner(readable, writable) {
            Ok(blocked) => Ok(blocked),
            Err(e) => {
                self.fail_connection(&e);
                Err(e)
            },
        }
    }

    fn service_inner(&mut self, readable: bool, writable: bool) -> Result<Interest> {
        let mut blocked = Interest::empty();
        if readable && self.read_available()? {
            blocked |= Interest::READ;
        }
        if (writable || !self.tx.is_empty()) && self.flush()? {
            blocked |= Interest::WRITE;
        }
        Ok(blocked)
    }

    /// `true` once the transport reported `WouldBlock`.
    fn read_available(&mut self) -> Result<bool> {
        loop {
            let Some(t) = self.transport.as_mut() else {
                return Ok(false);
            };
            match t.try_read(&mut self.scratch) {
                Ok(0) => {
                    debug!("peer closed the connection");
                    return Err(IscsiError::ConnectionLost);
                },
                Ok(n) => {
                    trace!(bytes = n, "rx");
                    self.rx.extend_from_slice(&self.scratch[..n]);
                    self.drain_frames()?;
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn drain_frames(&mut self) -> Result<()> {
        while self.transport.is_some() {
            match self.codec.decode_frame(&mut self.rx)? {
                Decoded::Complete(pdu) => self.on_pdu(pdu)?,
                Decoded::Incomplete { .. } => break,
            }
        }
        Ok(())
    }

    /// `true` once the transport reported `WouldBlock`.
    fn flush(&mut self) -> Result<bool> {
        while let Some(front) = self.tx.front() {
            let Some(t) = self.transport.as_mut() else {
                return Ok(false);
            };
            match t.try_write(&front[self.tx_off..]) {
                Ok(0) => return Err(IscsiError::ConnectionLost),
                Ok(n) => {
                    self.tx_off += n;
                    if self.tx_off == front.len() {
                        self.tx.pop_front();
                        self.tx_off = 0;
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    /// Serializes `pdu` with the current digest settings and queues it.
    pub(crate) fn queue_pdu(&mut self, mut pdu: Pdu) {
        let bytes = self.codec.encode_pdu(&mut pdu);
        debug!(opcode = ?pdu.opcode(), itt = pdu.itt(), bytes = bytes.len(), "tx queued");
        self.tx.push_back(bytes);
    }

    // ── connection lifecycle ────────────────────────────────────────────────

    /// Dials `addr` through the connector (blocking, bounded by
    /// `TimeoutConnection`).
    pub fn connect(&mut self, addr: &TargetAddress) -> Result<()> {
        if !matches!(self.state, SessionState::Created | SessionState::Closed) {
            return Err(self.invalid("connect"));
        }
        self.set_target(addr);
        self.open_transport()
    }

    pub(crate) fn set_target(&mut self, addr: &TargetAddress) {
        self.target = addr.clone();
        if !addr.target_name.is_empty() {
            self.cfg.login.identity.target_name = addr.target_name.clone();
        }
    }

    /// Uses an already connected transport instead of dialing.
    pub fn attach(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        if !matches!(self.state, SessionState::Created | SessionState::Closed) {
            return Err(self.invalid("attach"));
        }
        self.install(transport);
        Ok(())
    }

    fn open_transport(&mut self) -> Result<()> {
        let timeout = self.cfg.runtime.timeout_connection;
        let Some(connector) = self.connector.as_mut() else {
            return Err(IscsiError::InvalidState {
                op: "connect",
                state: "no connector".into(),
            });
        };
        let transport = connector.connect(&self.target.portal, timeout)?;
        info!(portal = %self.target.portal, "connected");
        self.install(transport);
        Ok(())
    }

    fn install(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
        self.generation += 1;
        self.codec.reset();
        self.codec.set_digests(Digests::NONE);
        self.codec.set_max_data_segment(self.cfg.runtime.max_pdu_data);
        self.rx.clear();
        self.tx.clear();
        self.tx_off = 0;
        self.state = SessionState::Connecting;
    }

    /// Starts the login exchange on a connected transport.
    pub fn login(&mut self) -> Result<()> {
        if self.state != SessionState::Connecting {
            return Err(self.invalid("login"));
        }
        let ids = LoginIds {
            isid: self.isid,
            tsih: self.tsih,
            cid: self.cid,
            itt: self.tasks.alloc_tag(),
            cmd_sn: self.cmd_sn,
            exp_stat_sn: self.exp_stat_sn,
        };
        let mut machine = LoginMachine::new(self.cfg.login.clone(), ids);
        machine.on_connected();
        let req = machine.start()?;
        info!(tsih = self.tsih, itt = ids.itt, "login started");
        self.login = Some(machine);
        self.login_error = None;
        self.state = SessionState::LoggingIn;
        self.queue_pdu(Pdu::LoginRequest(req));
        Ok(())
    }

    pub(crate) fn enter_full_feature(&mut self, outcome: LoginOutcome) {
        self.tsih = outcome.tsih;
        self.exp_stat_sn = outcome.stat_sn.wrapping_add(1);
        self.exp_cmd_sn = outcome.exp_cmd_sn;
        self.max_cmd_sn = outcome.max_cmd_sn;
        self.cmd_sn = outcome.exp_cmd_sn;
        self.params = outcome.params;
        self.codec.set_digests(Digests {
            header: self.params.header_digest,
            data: self.params.data_digest,
        });
        self.login = None;
        self.redirects = 0;
        self.state = SessionState::FullFeature;
        info!(
            tsih = self.tsih,
            cmd_sn = self.cmd_sn,
            max_cmd_sn = self.max_cmd_sn,
            "full-feature phase"
        );
    }

    /// Replaces a lost (or live) connection and logs in again with the same
    /// ISID and TSIH. Tasks outstanding on the old connection are completed
    /// with `ConnectionLost`.
    pub fn reconnect(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::Reconnecting | SessionState::FullFeature
        ) {
            return Err(self.invalid("reconnect"));
        }
        if self.connector.is_none() {
            return Err(IscsiError::InvalidState {
                op: "reconnect",
                state: "no connector".into(),
            });
        }
        self.teardown(SessionState::Reconnecting);
        self.open_transport()?;
        self.login()
    }

    /// [`Session::reconnect`] with a transport the caller already opened.
    pub fn reconnect_with(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::Reconnecting | SessionState::FullFeature
        ) {
            return Err(self.invalid("reconnect"));
        }
        self.teardown(SessionState::Reconnecting);
        self.install(transport);
        self.login()
    }

    /// Drops the connection and starts a new login on a fresh one, at
    /// another portal (login redirection) or as a brand-new session when
    /// the target no longer knows our TSIH.
    pub(crate) fn restart_login(&mut self, portal: Option<&str>, new_session: bool) -> Result<()> {
        self.teardown(SessionState::Reconnecting);
        if let Some(p) = portal {
            info!(from = %self.target.portal, to = %p, "login redirected");
            self.target.portal = p.to_string();
        }
        if new_session {
            warn!(tsih = self.tsih, "target dropped the session, logging in as new");
            self.tsih = 0;
        }
        self.open_transport()?;
        self.login()
    }

    pub(crate) fn has_connector(&self) -> bool {
        self.connector.is_some()
    }

    /// Drops the transport and completes every task with `ConnectionLost`.
    pub(crate) fn teardown(&mut self, next: SessionState) {
        if let Some(mut t) = self.transport.take() {
            t.shutdown();
        }
        self.codec.reset();
        self.rx.clear();
        self.tx.clear();
        self.tx_off = 0;
        self.pending.clear();
        self.login = None;
        self.logout_itt = None;
        self.tasks.cancel_all(TaskError::ConnectionLost);
        self.state = next;
    }

    /// Handles an error that invalidated the connection.
    pub(crate) fn fail_connection(&mut self, err: &IscsiError) {
        let next = match err {
            IscsiError::Internal(_) => SessionState::Dead,
            _ if self.state == SessionState::LoggingOut => SessionState::Closed,
            IscsiError::Login(e) if e.is_authentication() => SessionState::Dead,
            _ if self.cfg.runtime.reconnect == ReconnectPolicy::Reconnect => {
                SessionState::Reconnecting
            },
            _ => SessionState::Dead,
        };
        if next == SessionState::Closed {
            debug!(error = %err, "connection ended during logout");
        } else {
            error!(error = %err, state = %self.state, next = %next, "connection failed");
        }
        self.teardown(next);
    }

    /// A wait for `what` ran out. Bytes still queued after a whole
    /// `TimeoutIo` mean the peer stopped reading, which fails the connection.
    pub(crate) fn on_wait_timeout(&mut self, what: &'static str) {
        if self.transport.is_none() || self.tx.is_empty() {
            return;
        }
        warn!(what, queued = self.tx.len(), "transmit stalled");
        self.fail_connection(&IscsiError::Timeout(what));
    }

    pub(crate) fn invalid(&self, op: &'static str) -> IscsiError {
        IscsiError::InvalidState {
            op,
            state: self.state.to_string(),
        }
    }

    pub(crate) fn require_full_feature(&self, op: &'static str) -> Result<()> {
        if self.state == SessionState::FullFeature {
            Ok(())
        } else {
            Err(self.invalid(op))
        }
    }

    // ── inbound ─────────────────────────────────────────────────────────────

    fn on_pdu(&mut self, pdu: Pdu) -> Result<()> {
        trace!(opcode = ?pdu.opcode(), itt = pdu.itt(), len = pdu.payload().len(), "rx pdu");
        match self.state {
            SessionState::LoggingIn => {
                return match pdu {
                    Pdu::LoginResponse(rsp) => self.handle_login_response(rsp),
                    other => Err(IscsiError::protocol(format!(
                        "unexpected {:?} during login",
                        other.opcode()
                    ))),
                };
            },
            SessionState::FullFeature | SessionState::LoggingOut => {},
            other => {
                return Err(IscsiError::protocol(format!(
                    "{:?} received in state {other}",
                    pdu.opcode()
                )));
            },
        }

        if let Some(sn) = pdu.status_sn() {
            self.ack_status(sn);
        }
        if let Some((exp, max)) = pdu.cmd_window() {
            self.update_window(exp, max);
        }

        match pdu {
            Pdu::DataIn(p) => self.handle_data_in(p)?,
            Pdu::ScsiResponse(p) => self.handle_scsi_response(p)?,
            Pdu::ReadyToTransfer(p) => self.handle_r2t(p)?,
            Pdu::NopIn(p) => self.handle_nop_in(p)?,
            Pdu::Reject(p) => self.handle_reject(p)?,
            Pdu::AsyncMessage(p) => self.handle_async_message(p)?,
            Pdu::TaskMgmtResponse(p) => self.handle_task_mgmt_response(p)?,
            Pdu::TextResponse(p) => self.handle_text_response(p)?,
            Pdu::LogoutResponse(p) => self.handle_logout_response(p)?,
            other => {
                return Err(IscsiError::protocol(format!(
                    "unexpected {:?} in state {}",
                    other.opcode(),
                    self.state
                )));
            },
        }
        self.flush_pending()
    }

    fn ack_status(&mut self, stat_sn: u32) {
        if sn_le(self.exp_stat_sn, stat_sn) {
            if stat_sn != self.exp_stat_sn {
                debug!(expected = self.exp_stat_sn, got = stat_sn, "StatSN gap");
            }
            self.exp_stat_sn = stat_sn.wrapping_add(1);
        } else {
            trace!(expected = self.exp_stat_sn, got = stat_sn, "stale StatSN");
        }
    }

    /// Applies ExpCmdSN/MaxCmdSN unless the pair is invalid
    /// (MaxCmdSN < ExpCmdSN - 1) or older than what we have.
    fn update_window(&mut self, exp: u32, max: u32) {
        if sn_lt(max, exp.wrapping_sub(1)) {
            debug!(exp, max, "ignoring invalid command window");
            return;
        }
        if sn_lt(self.exp_cmd_sn, exp) {
            self.exp_cmd_sn = exp;
        }
        if sn_lt(self.max_cmd_sn, max) {
            self.max_cmd_sn = max;
        }
    }

    // ── submission ──────────────────────────────────────────────────────────

    /// Registers a SCSI task and issues it as soon as the CmdSN window
    /// allows. The outcome goes to `completion` exactly once.
    pub fn send_task(&mut self, mut task: ScsiTask, completion: Completion) -> Result<TaskHandle> {
        self.require_full_feature("send_task")?;
        if self.cfg.login.identity.session_type.is_discovery() {
            return Err(IscsiError::InvalidState {
                op: "send_task",
                state: "discovery session".into(),
            });
        }
        let limit = self.cfg.runtime.queue_depth;
        if self.tasks.scsi_len() >= limit {
            return Err(IscsiError::QueueFull { limit });
        }
        if task.direction == Direction::Write {
            task.expected_len = task.data_out.len() as u32;
        }
        let itt = self.tasks.register(Task::new(
            TaskKind::Scsi(Box::new(ScsiState::new(task))),
            Some(completion),
        ));
        self.pending.push_back(itt);
        if let Err(e) = self.flush_pending() {
            self.fail_connection(&e);
            return Err(e);
        }
        Ok(TaskHandle { itt })
    }

    /// [`Session::send_task`] delivering into a channel.
    pub fn submit(&mut self, task: ScsiTask) -> Result<oneshot::Receiver<TaskOutcome>> {
        let (completion, rx) = Completion::channel();
        self.send_task(task, completion)?;
        Ok(rx)
    }

    /// Issues queued SCSI tasks while CmdSN <= MaxCmdSN.
    pub(crate) fn flush_pending(&mut self) -> Result<()> {
        if self.state != SessionState::FullFeature {
            return Ok(());
        }
        while let Some(&itt) = self.pending.front() {
            if !sn_le(self.cmd_sn, self.max_cmd_sn) {
                trace!(
                    cmd_sn = self.cmd_sn,
                    max_cmd_sn = self.max_cmd_sn,
                    waiting = self.pending.len(),
                    "command window closed"
                );
                break;
            }
            self.pending.pop_front();
            if self.tasks.get(itt).is_none() {
                continue;
            }
            self.issue_scsi(itt)?;
        }
        Ok(())
    }

    /// CmdSN for an immediate PDU: carried, not consumed.
    #[inline]
    pub(crate) fn immediate_cmd_sn(&self) -> u32 {
        self.cmd_sn
    }

    /// CmdSN for a non-immediate PDU; advances the counter.
    #[inline]
    pub(crate) fn next_cmd_sn(&mut self) -> u32 {
        let sn = self.cmd_sn;
        self.cmd_sn = self.cmd_sn.wrapping_add(1);
        sn
    }
}
