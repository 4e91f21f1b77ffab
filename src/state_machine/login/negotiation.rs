// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Operational parameter negotiation (RFC 7143 § 13).
//!
//! The initiator offers every key up front. Each answer is folded into
//! [`NegotiatedParams`] with the key's result function; keys the target
//! offers on its own are answered with the same result.

use tracing::{debug, warn};

use crate::{
    cfg::config::{KeyOffer, LoginConfig},
    error::LoginError,
};

/// Values in effect for the full-feature phase. Defaults are the RFC 7143
/// defaults, used for any key the target did not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedParams {
    pub header_digest: bool,
    pub data_digest: bool,
    /// What we declared we can receive.
    pub max_recv_data_segment_length: u32,
    /// What the target declared it can receive; bounds every PDU we send.
    pub max_xmit_data_segment_length: u32,
    pub max_burst_length: u32,
    pub first_burst_length: u32,
    pub initial_r2t: bool,
    pub immediate_data: bool,
    pub max_outstanding_r2t: u32,
    pub data_pdu_in_order: bool,
    pub data_sequence_in_order: bool,
    pub error_recovery_level: u8,
    pub default_time2wait: u32,
    pub default_time2retain: u32,
    pub max_connections: u32,
    pub target_alias: Option<String>,
    pub target_portal_group_tag: Option<u16>,
}

impl Default for NegotiatedParams {
    fn default() -> Self {
        Self {
            header_digest: false,
            data_digest: false,
            max_recv_data_segment_length: 8192,
            max_xmit_data_segment_length: 8192,
            max_burst_length: 262_144,
            first_burst_length: 65_536,
            initial_r2t: true,
            immediate_data: true,
            max_outstanding_r2t: 1,
            data_pdu_in_order: true,
            data_sequence_in_order: true,
            error_recovery_level: 0,
            default_time2wait: 2,
            default_time2retain: 20,
            max_connections: 1,
            target_alias: None,
            target_portal_group_tag: None,
        }
    }
}

/// How a key's result is computed from the two sides' values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Min,
    Max,
    Or,
    And,
    /// Target picks one value from the initiator's list.
    List,
    /// Each side states its own limit; no result is computed.
    Declarative,
}

fn rule_for(key: &str) -> Option<Rule> {
    Some(match key {
        "HeaderDigest" | "DataDigest" => Rule::List,
        "MaxBurstLength" | "FirstBurstLength" | "MaxOutstandingR2T" | "ErrorRecoveryLevel"
        | "DefaultTime2Retain" | "MaxConnections" => Rule::Min,
        "DefaultTime2Wait" => Rule::Max,
        "InitialR2T" | "DataPDUInOrder" | "DataSequenceInOrder" => Rule::Or,
        "ImmediateData" => Rule::And,
        "MaxRecvDataSegmentLength" | "TargetAlias" | "TargetPortalGroupTag" | "TargetAddress" => {
            Rule::Declarative
        },
        _ => return None,
    })
}

/// Values that carry no answer and leave the key at its default.
fn is_non_answer(v: &str) -> bool {
    matches!(v, "NotUnderstood" | "Irrelevant" | "Reject")
}

fn yes(v: &str) -> Option<bool> {
    match v {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "Yes" } else { "No" }
}

/// Folds target answers into the negotiated set.
#[derive(Debug, Clone)]
pub struct Negotiator {
    offered: Vec<KeyOffer>,
    params: NegotiatedParams,
}

impl Negotiator {
    pub fn new(cfg: &LoginConfig) -> Self {
        let params = NegotiatedParams {
            max_recv_data_segment_length: cfg.flow.max_recv_data_segment_length,
            ..Default::default()
        };
        Self {
            offered: Vec::new(),
            params,
        }
    }

    /// Records what we sent so answers can be checked against it.
    pub fn offer(&mut self, keys: &[KeyOffer]) {
        for (k, v) in keys {
            match self.offered.iter_mut().find(|(ok, _)| ok == k) {
                Some(slot) => slot.1 = v.clone(),
                None => self.offered.push((k.clone(), v.clone())),
            }
        }
    }

    fn offered(&self, key: &str) -> Option<&str> {
        self.offered
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> &NegotiatedParams {
        &self.params
    }

    /// Applies one batch of target keys. Returns the answers owed for keys
    /// the target offered without us offering them first.
    pub fn apply(&mut self, pairs: &[(String, String)]) -> Result<Vec<KeyOffer>, LoginError> {
        let mut replies = Vec::new();
        for (key, value) in pairs {
            let Some(rule) = rule_for(key) else {
                debug!(key = %key, value = %value, "ignoring unknown login key");
                continue;
            };
            if is_non_answer(value) {
                warn!(key = %key, value = %value, "target did not negotiate key");
                continue;
            }
            let ours = self.offered(key).map(str::to_string);
            let result = match (rule, ours.as_deref()) {
                (Rule::Declarative, _) => {
                    self.declare(key, value);
                    continue;
                },
                (Rule::List, Some(list)) => {
                    if !list.split(',').any(|v| v == value) {
                        return Err(LoginError::Protocol(format!(
                            "target chose {key}={value}, not in offered {list}"
                        )));
                    }
                    value.clone()
                },
                (Rule::List, None) => {
                    // Target offered a list: pick the first value we support.
                    let pick = value
                        .split(',')
                        .find(|v| *v == "None" || *v == "CRC32C")
                        .unwrap_or("None");
                    replies.push((key.clone(), pick.to_string()));
                    pick.to_string()
                },
                (rule, ours) => {
                    let r = combine(rule, key, ours, value)?;
                    if ours.is_none() {
                        replies.push((key.clone(), r.clone()));
                    }
                    r
                },
            };
            self.store(key, &result)?;
        }
        Ok(replies)
    }

    fn declare(&mut self, key: &str, value: &str) {
        match key {
            "MaxRecvDataSegmentLength" => match value.parse::<u32>() {
                Ok(v) if v >= 512 => self.params.max_xmit_data_segment_length = v,
                _ => warn!(value = %value, "ignoring invalid target MaxRecvDataSegmentLength"),
            },
            "TargetAlias" => self.params.target_alias = Some(value.to_string()),
            "TargetPortalGroupTag" => self.params.target_portal_group_tag = value.parse().ok(),
            _ => {},
        }
    }

    fn store(&mut self, key: &str, v: &str) -> Result<(), LoginError> {
        let p = &mut self.params;
        let num = || {
            v.parse::<u32>()
                .map_err(|_| LoginError::Protocol(format!("non-numeric {key}={v}")))
        };
        let flag = || yes(v).ok_or_else(|| LoginError::Protocol(format!("non-boolean {key}={v}")));
        match key {
            "HeaderDigest" => p.header_digest = v == "CRC32C",
            "DataDigest" => p.data_digest = v == "CRC32C",
            "MaxBurstLength" => p.max_burst_length = num()?,
            "FirstBurstLength" => p.first_burst_length = num()?,
            "MaxOutstandingR2T" => p.max_outstanding_r2t = num()?,
            "ErrorRecoveryLevel" => p.error_recovery_level = num()?.min(2) as u8,
            "DefaultTime2Wait" => p.default_time2wait = num()?,
            "DefaultTime2Retain" => p.default_time2retain = num()?,
            "MaxConnections" => p.max_connections = num()?,
            "InitialR2T" => p.initial_r2t = flag()?,
            "ImmediateData" => p.immediate_data = flag()?,
            "DataPDUInOrder" => p.data_pdu_in_order = flag()?,
            "DataSequenceInOrder" => p.data_sequence_in_order = flag()?,
            _ => {},
        }
        if p.first_burst_length > p.max_burst_length {
            p.first_burst_length = p.max_burst_length;
        }
        Ok(())
    }
}

/// Result of a numeric or boolean key. Without an offer of ours, the RFC
/// default stands in for our side.
fn combine(rule: Rule, key: &str, ours: Option<&str>, theirs: &str) -> Result<String, LoginError> {
    let bad = || LoginError::Protocol(format!("invalid value {key}={theirs}"));
    match rule {
        Rule::Min | Rule::Max => {
            let t: u32 = theirs.parse().map_err(|_| bad())?;
            let Some(o) = ours.and_then(|o| o.parse::<u32>().ok()) else {
                return Ok(t.to_string());
            };
            if rule == Rule::Min && t > o {
                return Err(LoginError::Protocol(format!(
                    "target answered {key}={t}, above our offer {o}"
                )));
            }
            Ok(if rule == Rule::Min { t.min(o) } else { t.max(o) }.to_string())
        },
        Rule::Or | Rule::And => {
            let t = yes(theirs).ok_or_else(bad)?;
            let o = ours.and_then(yes);
            let r = match (rule, o) {
                (_, None) => t,
                (Rule::Or, Some(o)) => t || o,
                (_, Some(o)) => t && o,
            };
            Ok(yes_no(r).to_string())
        },
        Rule::List | Rule::Declarative => Ok(theirs.to_string()),
    }
}
