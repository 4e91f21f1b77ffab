// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Byte-stream transports the session drives.
//!
//! A [`Transport`] is non-blocking: reads and writes return
//! `io::ErrorKind::WouldBlock` instead of waiting. Waiting is a separate,
//! explicit call ([`Transport::wait`]) used only by the synchronous helpers.

use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    os::fd::{AsRawFd, RawFd},
    time::Duration,
};

use tracing::debug;

use crate::cfg::config::Config;

/// Default iSCSI portal port.
pub const DEFAULT_PORT: u16 = 3260;

bitflags::bitflags! {
    /// Readiness directions.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

/// Non-blocking byte stream carrying one iSCSI connection.
pub trait Transport: Send {
    /// `Ok(0)` means the peer closed the stream.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Blocks until one of `interest` is ready or `timeout` passes; returns
    /// the ready subset (empty on timeout).
    fn wait(&mut self, interest: Interest, timeout: Option<Duration>) -> io::Result<Interest>;

    /// Descriptor for external event loops, if the transport has one.
    fn raw_fd(&self) -> Option<RawFd>;

    fn shutdown(&mut self);
}

/// Opens transports for a portal; the session keeps one around so it can
/// replace a lost connection.
pub trait Connector: Send {
    fn connect(&mut self, portal: &str, timeout: Duration) -> io::Result<Box<dyn Transport>>;
}

/// Where a session connects to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetAddress {
    /// `host[:port]`; the port defaults to 3260.
    pub portal: String,
    pub target_name: String,
    pub lun: u16,
}

impl TargetAddress {
    pub fn new(portal: impl Into<String>, target_name: impl Into<String>, lun: u16) -> Self {
        Self {
            portal: portal.into(),
            target_name: target_name.into(),
            lun,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            portal: cfg.login.transport.target_address.clone(),
            target_name: cfg.login.identity.target_name.clone(),
            lun: cfg.login.transport.lun,
        }
    }

    /// Portal with an explicit port.
    pub fn socket_addr(&self) -> String {
        with_default_port(&self.portal)
    }
}

pub(crate) fn with_default_port(portal: &str) -> String {
    // Bracketed IPv6 ("[::1]:3260") and host:port both end in ":<digits>".
    let has_port = match portal.rsplit_once(':') {
        Some((host, port)) => {
            !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && (!host.contains(':') || host.ends_with(']'))
        },
        None => false,
    };
    if has_port {
        portal.to_string()
    } else {
        format!("{portal}:{DEFAULT_PORT}")
    }
}

/// TCP stream in non-blocking mode; `wait` uses `poll(2)`.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Dials `portal` (blocking, bounded by `timeout`) and switches the
    /// stream to non-blocking mode.
    pub fn connect(portal: &str, timeout: Duration) -> io::Result<Self> {
        let addr = with_default_port(portal);
        let mut last_err = None;
        for sa in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sa, timeout) {
                Ok(stream) => {
                    debug!(peer = %sa, "tcp connected");
                    return Self::from_stream(stream);
                },
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr}"))
        }))
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("fd", &self.stream.as_raw_fd())
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}

impl Transport for TcpTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn wait(&mut self, interest: Interest, timeout: Option<Duration>) -> io::Result<Interest> {
        poll_fd(self.stream.as_raw_fd(), interest, timeout)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.stream.as_raw_fd())
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Single-descriptor `poll(2)`.
pub fn poll_fd(fd: RawFd, interest: Interest, timeout: Option<Duration>) -> io::Result<Interest> {
    let mut events: libc::c_short = 0;
    if interest.contains(Interest::READ) {
        events |= libc::POLLIN;
    }
    if interest.contains(Interest::WRITE) {
        events |= libc::POLLOUT;
    }
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms: libc::c_int = match timeout {
        Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };

    // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
    // count passed is 1.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Interest::empty());
        }
        return Err(err);
    }

    let mut ready = Interest::empty();
    // Errors and hang-ups surface as readable so the next read sees them.
    if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
        ready |= Interest::READ;
    }
    if pfd.revents & libc::POLLOUT != 0 {
        ready |= Interest::WRITE;
    }
    Ok(ready & (interest | Interest::READ))
}

/// Plain TCP dialer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&mut self, portal: &str, timeout: Duration) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(TcpTransport::connect(portal, timeout)?))
    }
}
