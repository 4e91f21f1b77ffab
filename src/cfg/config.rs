// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{Digest, ReconnectPolicy, SessionType, UnitAttentionPolicy, YesNo},
    models::codec::MAX_DATA_SEGMENT_WIRE,
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Parameters that travel over the wire during Login(Security) and
    /// Operational negotiation.
    pub login: LoginConfig,
    /// Engine parameters that live outside the iSCSI protocol.
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Combined Login(Security) + Operational negotiation settings grouped by
/// logical domains.
pub struct LoginConfig {
    /// Session identity (SessionType, Initiator, Target).
    pub identity: Identity,
    /// Authentication strategy (AuthMethod / CHAP).
    pub auth: AuthConfig,
    /// Header/Data digest preferences.
    pub integrity: Integrity,
    /// MaxRecvDataSegmentLength / MaxBurst / FirstBurst.
    pub flow: Flow,
    /// InitialR2T / ImmediateData / MaxOutstandingR2T.
    pub write_flow: WriteFlow,
    /// DataPDUInOrder / DataSequenceInOrder.
    pub ordering: Ordering,
    /// ErrorRecoveryLevel.
    pub recovery: Recovery,
    /// DefaultTime2Wait / DefaultTime2Retain.
    pub timers: Timers,
    /// MaxConnections negotiation cap.
    pub limits: Limits,
    /// RFC7143 extensions plus custom vendor keys.
    #[serde(default)]
    pub extensions: Extensions,
    /// Where to connect; kept locally and never sent on the wire.
    #[serde(default)]
    pub transport: TransportHints,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Identity {
    #[serde(rename = "SessionType")]
    pub session_type: SessionType,

    #[serde(rename = "InitiatorName")]
    /// Initiator IQN (mandatory).
    pub initiator_name: String,

    #[serde(default, rename = "InitiatorAlias")]
    pub initiator_alias: String,

    #[serde(default, rename = "TargetName")]
    /// Required for Normal sessions; ignored during Discovery.
    pub target_name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TransportHints {
    #[serde(default, rename = "TargetAddress")]
    /// `host:port` of the portal.
    pub target_address: String,
    #[serde(default, rename = "Lun")]
    /// Logical unit addressed by the demo binary and the sync helpers.
    pub lun: u16,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "AuthMethod")]
pub enum AuthConfig {
    #[serde(rename = "None")]
    None,
    #[serde(rename = "CHAP")]
    Chap(ChapConfig),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChapConfig {
    /// Username advertised via CHAP_N.
    pub username: String,
    /// Shared secret used to generate CHAP_R.
    pub secret: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Integrity {
    #[serde(rename = "HeaderDigest")]
    pub header_digest: Digest,
    #[serde(rename = "DataDigest")]
    pub data_digest: Digest,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Flow {
    #[serde(rename = "MaxRecvDataSegmentLength")]
    /// Largest data segment the initiator accepts.
    pub max_recv_data_segment_length: u32,
    #[serde(rename = "MaxBurstLength")]
    pub max_burst_length: u32,
    #[serde(rename = "FirstBurstLength")]
    /// Unsolicited burst size before an R2T is required.
    pub first_burst_length: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WriteFlow {
    #[serde(rename = "InitialR2T")]
    pub initial_r2t: YesNo,
    #[serde(rename = "ImmediateData")]
    pub immediate_data: YesNo,
    #[serde(rename = "MaxOutstandingR2T")]
    pub max_outstanding_r2t: u16,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Ordering {
    #[serde(rename = "DataPDUInOrder")]
    pub data_pdu_in_order: YesNo,
    #[serde(rename = "DataSequenceInOrder")]
    pub data_sequence_in_order: YesNo,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Recovery {
    #[serde(rename = "ErrorRecoveryLevel")]
    pub error_recovery_level: u8,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Login timer keys expressed as seconds.
pub struct Timers {
    #[serde(rename = "DefaultTime2Wait", with = "serde_secs")]
    pub default_time2wait: Duration,
    #[serde(rename = "DefaultTime2Retain", with = "serde_secs")]
    pub default_time2retain: Duration,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Limits {
    #[serde(rename = "MaxConnections")]
    pub max_connections: u16,
}

// ─────────────────────────────────────────────────────────────────────────────
// RFC7143 extensions + custom keys

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Extensions {
    #[serde(rename = "TaskReporting", skip_serializing_if = "Option::is_none")]
    pub task_reporting: Option<TaskReporting>,

    #[serde(rename = "iSCSIProtocolLevel", skip_serializing_if = "Option::is_none")]
    /// Defaults to 1 when omitted.
    pub iscsi_protocol_level: Option<u8>,

    #[serde(flatten)]
    /// Vendor keys (X-*, Z-*) sent verbatim during operational negotiation.
    pub custom: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub enum TaskReporting {
    RFC3720,
    ResponseFence,
    FastAbort,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// Engine settings that do not map to RFC keys.
pub struct RuntimeConfig {
    #[serde(rename = "TimeoutConnection", with = "serde_secs")]
    /// Bound on establishing the TCP connection.
    pub timeout_connection: Duration,

    #[serde(rename = "TimeoutIo", with = "serde_secs")]
    /// Bound on each synchronous wait (login, logout, task completion).
    pub timeout_io: Duration,

    #[serde(rename = "QueueDepth")]
    /// Maximum number of outstanding tasks per session.
    pub queue_depth: usize,

    #[serde(rename = "MaxPduData", default = "default_max_pdu_data")]
    /// Largest inbound data segment the codec buffers.
    pub max_pdu_data: usize,

    #[serde(rename = "Reconnect", default)]
    pub reconnect: ReconnectPolicy,

    #[serde(rename = "UnitAttention", default)]
    pub unit_attention: UnitAttentionPolicy,
}

fn default_max_pdu_data() -> usize {
    1 << 20
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {path:?}"))?;
        Self::from_yaml_str(&s)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let mut cfg: Config = serde_yaml::from_str(s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        // Discovery sessions always use MaxConnections=1 and ERL=0.
        if self.login.identity.session_type.is_discovery() {
            self.login.limits.max_connections = 1;
            self.login.recovery.error_recovery_level = 0;
        }

        if let Some(lv) = self.login.extensions.iscsi_protocol_level {
            ensure!(lv >= 1, "iSCSIProtocolLevel must be >= 1");
        }

        ensure!(
            !self.login.identity.initiator_name.is_empty(),
            "InitiatorName must not be empty"
        );
        if self.login.identity.session_type.is_normal() {
            ensure!(
                !self.login.identity.target_name.is_empty(),
                "TargetName is required for Normal session"
            );
        }

        let flow = &self.login.flow;
        ensure!(
            (512..=MAX_DATA_SEGMENT_WIRE as u32).contains(&flow.max_recv_data_segment_length),
            "MaxRecvDataSegmentLength must be within 512..=16777215"
        );
        ensure!(
            flow.first_burst_length <= flow.max_burst_length,
            "FirstBurstLength must not exceed MaxBurstLength"
        );
        ensure!(
            self.login.write_flow.max_outstanding_r2t >= 1,
            "MaxOutstandingR2T must be >= 1"
        );
        ensure!(
            self.login.recovery.error_recovery_level <= 2,
            "ErrorRecoveryLevel must be 0, 1 or 2"
        );
        ensure!(
            self.login.limits.max_connections >= 1,
            "MaxConnections must be >= 1"
        );
        ensure!(self.runtime.queue_depth >= 1, "QueueDepth must be >= 1");

        // The codec has to accept whatever we told the target we can receive.
        self.runtime.max_pdu_data = self
            .runtime
            .max_pdu_data
            .max(flow.max_recv_data_segment_length as usize)
            .min(MAX_DATA_SEGMENT_WIRE);

        Ok(())
    }
}

impl SessionType {
    pub fn is_discovery(&self) -> bool {
        matches!(self, SessionType::Discovery)
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, SessionType::Normal)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Login key generation (Security / CHAP / Operational)

/// A key offered by the initiator together with its value.
pub type KeyOffer = (String, String);

fn kv(k: &str, v: impl ToString) -> KeyOffer {
    (k.to_string(), v.to_string())
}

/// Sorts by key name for a canonical order.
fn sorted(mut items: Vec<KeyOffer>) -> Vec<KeyOffer> {
    items.sort_by(|a, b| a.0.cmp(&b.0));
    items
}

/// Login(Security) keys: SessionType, InitiatorName, optional alias,
/// TargetName for Normal sessions and AuthMethod.
pub fn login_keys_security(cfg: &LoginConfig) -> Vec<KeyOffer> {
    let id = &cfg.identity;
    let mut items = vec![
        kv("SessionType", id.session_type),
        kv("InitiatorName", &id.initiator_name),
        kv(
            "AuthMethod",
            match cfg.auth {
                AuthConfig::None => "None",
                AuthConfig::Chap(_) => "CHAP,None",
            },
        ),
    ];
    if !id.initiator_alias.is_empty() {
        items.push(kv("InitiatorAlias", &id.initiator_alias));
    }
    if id.session_type.is_normal() {
        items.push(kv("TargetName", &id.target_name));
    }
    sorted(items)
}

/// CHAP_N / CHAP_R answer to a challenge.
pub fn login_keys_chap_response(user: &str, chap_r: &str) -> Vec<KeyOffer> {
    vec![kv("CHAP_N", user), kv("CHAP_R", chap_r)]
}

/// Operational keys. Discovery sessions only carry the digests and
/// MaxRecvDataSegmentLength; the remaining keys are irrelevant there.
pub fn login_keys_operational(cfg: &LoginConfig) -> Vec<KeyOffer> {
    let n = cfg;
    let mut items = vec![
        kv("HeaderDigest", n.integrity.header_digest.offer()),
        kv("DataDigest", n.integrity.data_digest.offer()),
        kv(
            "MaxRecvDataSegmentLength",
            n.flow.max_recv_data_segment_length,
        ),
    ];
    if n.identity.session_type.is_discovery() {
        return sorted(items);
    }

    items.extend([
        kv("DataPDUInOrder", n.ordering.data_pdu_in_order),
        kv("DataSequenceInOrder", n.ordering.data_sequence_in_order),
        kv("ErrorRecoveryLevel", n.recovery.error_recovery_level),
        kv("FirstBurstLength", n.flow.first_burst_length),
        kv("MaxBurstLength", n.flow.max_burst_length),
        kv("ImmediateData", n.write_flow.immediate_data),
        kv("InitialR2T", n.write_flow.initial_r2t),
        kv("MaxOutstandingR2T", n.write_flow.max_outstanding_r2t),
        kv("DefaultTime2Retain", n.timers.default_time2retain.as_secs()),
        kv("DefaultTime2Wait", n.timers.default_time2wait.as_secs()),
        kv("MaxConnections", n.limits.max_connections),
    ]);

    if let Some(tr) = &n.extensions.task_reporting {
        let v = match tr {
            TaskReporting::RFC3720 => "RFC3720",
            TaskReporting::ResponseFence => "ResponseFence",
            TaskReporting::FastAbort => "FastAbort",
        };
        items.push(kv("TaskReporting", v));
    }
    if let Some(pl) = n.extensions.iscsi_protocol_level {
        items.push(kv("iSCSIProtocolLevel", pl));
    }
    let mut items = sorted(items);

    // Vendor keys go last, in a stable order; anything that is not an
    // X-/Z- key is a typo and stays local.
    let mut custom: Vec<_> = n
        .extensions
        .custom
        .iter()
        .filter(|(k, _)| k.starts_with("X-") || k.starts_with("X#") || k.starts_with("Z-"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    custom.sort();
    items.extend(custom);
    items
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
