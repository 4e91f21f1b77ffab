// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session, task tracking and the I/O front ends that drive them.

/// Tokio driver for a session.
pub mod async_driver;
pub(crate) mod common;
/// The event-driven session core.
pub mod session;
/// Blocking helpers over the session core.
pub mod sync_ops;
/// Caller-facing task types.
pub mod task;
/// Outstanding commands keyed by Initiator Task Tag.
pub mod task_table;
/// Non-blocking transports.
pub mod transport;

pub use async_driver::AsyncSession;
pub use session::{Session, SessionState};
pub use task::{Completion, Direction, Residual, ScsiResult, ScsiTask, TaskHandle, TaskOutcome, TaskReply};
pub use transport::{Connector, Interest, TargetAddress, TcpConnector, TcpTransport, Transport};
