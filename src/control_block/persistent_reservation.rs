// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PERSISTENT RESERVE IN (0x5E) / OUT (0x5F), SPC-4 § 6.15-6.16.

use crate::{control_block::cdb::Cdb, error::DataInError};

pub const PERSISTENT_RESERVE_IN: u8 = 0x5E;
pub const PERSISTENT_RESERVE_OUT: u8 = 0x5F;

/// PR OUT parameter list length without transport IDs.
pub const PR_OUT_PARAM_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrInAction {
    ReadKeys = 0x00,
    ReadReservation = 0x01,
    ReportCapabilities = 0x02,
    ReadFullStatus = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrOutAction {
    Register = 0x00,
    Reserve = 0x01,
    Release = 0x02,
    Clear = 0x03,
    Preempt = 0x04,
    PreemptAndAbort = 0x05,
    RegisterAndIgnoreExistingKey = 0x06,
    RegisterAndMove = 0x07,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrType {
    WriteExclusive = 0x1,
    ExclusiveAccess = 0x3,
    WriteExclusiveRegistrantsOnly = 0x5,
    ExclusiveAccessRegistrantsOnly = 0x6,
    WriteExclusiveAllRegistrants = 0x7,
    ExclusiveAccessAllRegistrants = 0x8,
}

impl PrType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v & 0x0F {
            0x1 => PrType::WriteExclusive,
            0x3 => PrType::ExclusiveAccess,
            0x5 => PrType::WriteExclusiveRegistrantsOnly,
            0x6 => PrType::ExclusiveAccessRegistrantsOnly,
            0x7 => PrType::WriteExclusiveAllRegistrants,
            0x8 => PrType::ExclusiveAccessAllRegistrants,
            _ => return None,
        })
    }
}

/// LU_SCOPE is the only scope SPC-4 still defines.
const LU_SCOPE: u8 = 0x00;

#[inline]
pub fn build_persistent_reserve_in(action: PrInAction, allocation_len: u16) -> Cdb {
    let mut cdb = Cdb::new(PERSISTENT_RESERVE_IN, 10);
    cdb.set(1, action as u8);
    cdb.put(7, &allocation_len.to_be_bytes());
    cdb
}

/// PR OUT CDB; the parameter list from [`PrOutParams::encode`] goes out as
/// Data-Out. `pr_type` is ignored by the target for actions that do not
/// take one.
#[inline]
pub fn build_persistent_reserve_out(action: PrOutAction, pr_type: Option<PrType>) -> Cdb {
    let mut cdb = Cdb::new(PERSISTENT_RESERVE_OUT, 10);
    cdb.set(1, action as u8);
    cdb.set(2, LU_SCOPE | pr_type.map_or(0, |t| t as u8));
    cdb.put(5, &(PR_OUT_PARAM_LEN as u32).to_be_bytes());
    cdb
}

/// Basic PR OUT parameter list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrOutParams {
    pub reservation_key: u64,
    pub service_action_key: u64,
    pub all_tg_pt: bool,
    /// Activate persist through power loss.
    pub aptpl: bool,
}

impl PrOutParams {
    pub fn encode(&self) -> [u8; PR_OUT_PARAM_LEN] {
        let mut out = [0u8; PR_OUT_PARAM_LEN];
        out[0..8].copy_from_slice(&self.reservation_key.to_be_bytes());
        out[8..16].copy_from_slice(&self.service_action_key.to_be_bytes());
        out[20] = (u8::from(self.all_tg_pt) << 2) | u8::from(self.aptpl);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReadKeys {
    pub generation: u32,
    pub keys: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReservation {
    pub key: u64,
    pub scope: u8,
    /// Raw type nibble; see [`PrType::from_u8`].
    pub pr_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrReadReservation {
    pub generation: u32,
    pub reservation: Option<PrReservation>,
}

fn pr_header<'a>(buf: &'a [u8], what: &'static str) -> Result<(u32, &'a [u8]), DataInError> {
    if buf.len() < 8 {
        return Err(DataInError::Truncated {
            what,
            need: 8,
            got: buf.len(),
        });
    }
    let generation = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let add_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    let end = 8 + add_len.min(buf.len() - 8);
    Ok((generation, &buf[8..end]))
}

pub fn parse_pr_read_keys(buf: &[u8]) -> Result<PrReadKeys, DataInError> {
    let (generation, body) = pr_header(buf, "PR IN READ KEYS")?;
    let keys = body
        .chunks_exact(8)
        .map(|c| u64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    Ok(PrReadKeys { generation, keys })
}

pub fn parse_pr_read_reservation(buf: &[u8]) -> Result<PrReadReservation, DataInError> {
    let (generation, body) = pr_header(buf, "PR IN READ RESERVATION")?;
    let reservation = match body.len() {
        0 => None,
        n if n >= 16 => Some(PrReservation {
            key: u64::from_be_bytes([
                body[0], body[1], body[2], body[3], body[4], body[5], body[6], body[7],
            ]),
            scope: body[13] >> 4,
            pr_type: body[13] & 0x0F,
        }),
        n => {
            return Err(DataInError::Truncated {
                what: "PR IN reservation descriptor",
                need: 24,
                got: 8 + n,
            });
        },
    };
    Ok(PrReadReservation {
        generation,
        reservation,
    })
}
