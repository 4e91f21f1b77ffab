// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds surfaced by the engine.
//!
//! Configuration, logging and the demo binary use `anyhow`; everything a
//! caller of the engine has to branch on is a typed error from this module.

use std::io;

use thiserror::Error;

use crate::models::{
    login::status::{StatusClass, StatusDetail},
    opcode::Opcode,
    reject::reject_description::RejectReason,
};

pub type Result<T, E = IscsiError> = std::result::Result<T, E>;

/// Framing failures reported by the PDU codec. Every variant is fatal for
/// the connection that produced the bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("reserved opcode 0x{0:02x}")]
    ReservedOpcode(u8),
    #[error("data segment of {declared} bytes exceeds the limit of {max}")]
    SegmentTooLarge { declared: usize, max: usize },
    #[error("header digest mismatch: got {got:#010x}, want {want:#010x}")]
    HeaderDigest { got: u32, want: u32 },
    #[error("data digest mismatch: got {got:#010x}, want {want:#010x}")]
    DataDigest { got: u32, want: u32 },
    #[error("malformed {opcode:?} PDU: {reason}")]
    Malformed { opcode: Option<Opcode>, reason: String },
}

/// Out-of-range input to a CDB builder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CdbError {
    #[error("invalid parameter {field}={value} (limit {limit})")]
    InvalidParameter {
        field: &'static str,
        value: u64,
        limit: u64,
    },
}

/// A data-in payload that could not be turned into a typed structure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataInError {
    #[error("no data-in decoder for operation code 0x{0:02x}")]
    Unsupported(u8),
    #[error("{what}: need {need} bytes, got {got}")]
    Truncated {
        what: &'static str,
        need: usize,
        got: usize,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Reasons a login exchange did not reach full-feature phase.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("login rejected by target: {class:?} / {detail:?}")]
    Rejected {
        class: StatusClass,
        detail: StatusDetail,
        /// `TargetAddress` sent with a redirection status.
        redirect: Option<String>,
    },
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("login protocol violation: {0}")]
    Protocol(String),
}

impl LoginError {
    /// Failures that must not be retried by reconnecting.
    pub fn is_authentication(&self) -> bool {
        match self {
            LoginError::Authentication(_) => true,
            LoginError::Rejected { detail, .. } => detail.is_auth_failure(),
            LoginError::Protocol(_) => false,
        }
    }
}

/// Why a task finished without a response from the target.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("connection lost")]
    ConnectionLost,
    #[error("rejected by target: {0:?}")]
    Rejected(RejectReason),
    #[error("aborted by task management")]
    Aborted,
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The caller stopped waiting; the tag was released locally.
    #[error("timed out waiting for the target")]
    Timeout,
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum IscsiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cdb(#[from] CdbError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    DataIn(#[from] DataInError),
    #[error("outstanding task limit of {limit} reached")]
    QueueFull { limit: usize },
    #[error("{op} not allowed in state {state}")]
    InvalidState { op: &'static str, state: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection lost")]
    ConnectionLost,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("{0} cancelled")]
    Cancelled(&'static str),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl IscsiError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        IscsiError::Protocol(msg.into())
    }
}
