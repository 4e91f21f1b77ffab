// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-process iSCSI target used by the integration tests: a RAM disk behind
//! a login/SCSI/task-management responder, reachable through a loopback
//! transport or a real TCP socket.

use std::{
    collections::HashMap,
    io::{self, Read, Write},
    net::{Shutdown, TcpListener},
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use bytes::BytesMut;
use iscsi_engine::{
    cfg::config::Config,
    client::{Connector, Interest, Session, Transport},
    control_block::{
        inquiry::INQUIRY,
        prevent_allow::PREVENT_ALLOW_MEDIUM_REMOVAL,
        read::READ_16,
        read_capacity::{READ_CAPACITY_10, SA_READ_CAPACITY_16, SERVICE_ACTION_IN_16},
        report_luns::{REPORT_LUNS, encode_lun, lun_id},
        start_stop_unit::START_STOP_UNIT,
        synchronize_cache::SYNCHRONIZE_CACHE_10,
        test_unit_ready::TEST_UNIT_READY,
        verify::{VERIFY_10, VERIFY_16},
        write::WRITE_16,
    },
    models::{
        async_msg::response::AsyncMessage,
        codec::{Decoded, PduCodec},
        command::{
            common::{ScsiCommandRequestFlags, ScsiStatus},
            request::ScsiCommandRequest,
            response::ScsiCommandResponse,
        },
        common::{BasicHeaderSegment, RESERVED_TAG},
        data::{
            common::DataOutFlags,
            request::ScsiDataOut,
            response::ScsiDataIn,
            sense_data::{SenseData, SenseKey, asc},
        },
        data_format::{Digests, PduWithData},
        login::{common::Stage, request::LoginRequest, response::LoginResponse},
        logout::{request::LogoutRequest, response::LogoutResponse},
        nop::{request::NopOutRequest, response::NopInResponse},
        parse::Pdu,
        ready_2_transfer::response::ReadyToTransfer,
        reject::response::RejectPdu,
        task_mgmt::{
            common::TaskMgmtFunction, request::TaskMgmtRequest, response::TaskMgmtResponsePdu,
        },
        text::{
            common::{TextFlags, build_kv, parse_kv},
            request::TextRequest,
            response::TextResponse,
        },
    },
};

pub const TARGET_NAME: &str = "iqn.2025-08.example:disk0";
pub const BLOCK_LEN: u32 = 512;
pub const BLOCKS: u64 = 2048;

pub fn test_path() -> String {
    std::env::var("TEST_CONFIG").unwrap_or_else(|_| "tests/config.yaml".into())
}

pub fn load_config() -> Result<Config> {
    let pb = PathBuf::from(test_path());
    Config::load_from_file(&pb).with_context(|| format!("failed to load {pb:?}"))
}

/// Deterministic block contents so reads can be checked without a write.
pub fn pattern(lba: u64, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (lba as usize * 7 + i * 13) as u8)
        .collect()
}

fn sn_gt(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000_0000
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenCommand {
    pub itt: u32,
    pub cmd_sn: u32,
    pub opcode: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenLogin {
    pub isid: [u8; 6],
    pub tsih: u16,
    pub cmd_sn: u32,
}

#[derive(Debug, Clone)]
struct HeldCommand {
    itt: u32,
    lun: u64,
    cdb: [u8; 16],
    edtl: u32,
    final_flag: bool,
    data: Vec<u8>,
}

#[derive(Debug)]
struct PendingWrite {
    lun: u64,
    lba: u64,
    buf: Vec<u8>,
    received: usize,
    burst_end: usize,
    unsolicited_open: bool,
    r2t_sn: u32,
}

/// Target side of one session. Every field a test may want to script or
/// inspect is public.
pub struct MockTarget {
    codec: PduCodec,
    inbox: BytesMut,
    outbox: Vec<u8>,
    pub closed: bool,
    pub connections: u32,

    stat_sn: u32,
    exp_cmd_sn: u32,
    advertised_max: u32,
    /// Commands the target accepts beyond ExpCmdSN - 1.
    pub window: u32,
    next_tsih: u16,
    sessions: Vec<u16>,
    full_feature: bool,
    initiator_mrdsl: usize,

    // scripted behaviour
    pub mrdsl: u32,
    pub max_burst: u32,
    pub offer_crc: bool,
    /// Answer the next login with a redirection to this `TargetAddress`.
    pub redirect_to: Option<String>,
    pub redirect_always: bool,
    /// Park SCSI commands instead of answering them.
    pub hold_scsi: bool,
    /// Stop reading from the initiator; its writes block.
    pub stall_writes: bool,
    /// Reject SCSI commands with this CDB operation code.
    pub reject_opcode: Option<u8>,
    /// Send SendTargets answers in two PDUs.
    pub split_text: bool,
    pub send_targets: Vec<(String, String)>,
    /// Answer overrides for operational keys.
    pub overrides: Vec<(String, String)>,

    // disk
    pub data: Vec<u8>,
    pub medium_present: bool,
    pub prevent: bool,
    pub unit_attention: bool,

    held: Vec<HeldCommand>,
    writes: HashMap<u32, PendingWrite>,
    next_ttt: u32,
    pending_text: Option<(u32, u32, Vec<u8>)>,

    // what the initiator did
    pub logins: Vec<SeenLogin>,
    pub commands: Vec<SeenCommand>,
    pub window_violations: u32,
    pub data_outs: Vec<(u32, u32, usize)>,
    pub r2ts: u32,
    pub nop_replies: Vec<u32>,
    pub tmfs: Vec<TaskMgmtFunction>,
    pub unit_attentions_reported: u32,
    pub logouts: u32,
}

impl Default for MockTarget {
    fn default() -> Self {
        let mut data = Vec::with_capacity((BLOCKS * BLOCK_LEN as u64) as usize);
        for lba in 0..BLOCKS {
            data.extend(pattern(lba, BLOCK_LEN as usize));
        }
        Self {
            codec: PduCodec::new(1 << 24),
            inbox: BytesMut::new(),
            outbox: Vec::new(),
            closed: false,
            connections: 0,
            stat_sn: 0x100,
            exp_cmd_sn: 1,
            advertised_max: 0,
            window: 32,
            next_tsih: 0x10,
            sessions: Vec::new(),
            full_feature: false,
            initiator_mrdsl: 8192,
            mrdsl: 262_144,
            max_burst: 262_144,
            offer_crc: false,
            redirect_to: None,
            redirect_always: false,
            hold_scsi: false,
            stall_writes: false,
            reject_opcode: None,
            split_text: false,
            send_targets: vec![
                ("TargetName".into(), TARGET_NAME.into()),
                ("TargetAddress".into(), "127.0.0.1:3260,1".into()),
                ("TargetName".into(), "iqn.2025-08.example:tape1".into()),
                ("TargetAddress".into(), "127.0.0.1:3261,2".into()),
            ],
            overrides: Vec::new(),
            data,
            medium_present: true,
            prevent: false,
            unit_attention: false,
            held: Vec::new(),
            writes: HashMap::new(),
            next_ttt: 0x1000,
            pending_text: None,
            logins: Vec::new(),
            commands: Vec::new(),
            window_violations: 0,
            data_outs: Vec::new(),
            r2ts: 0,
            nop_replies: Vec::new(),
            tmfs: Vec::new(),
            unit_attentions_reported: 0,
            logouts: 0,
        }
    }
}

impl MockTarget {
    pub fn shared(self) -> Arc<Mutex<MockTarget>> {
        Arc::new(Mutex::new(self))
    }

    /// Fresh TCP connection: per-connection state starts over.
    pub fn new_connection(&mut self) {
        self.codec.reset();
        self.codec.set_digests(Digests::NONE);
        self.inbox.clear();
        self.outbox.clear();
        self.closed = false;
        self.full_feature = false;
        self.held.clear();
        self.writes.clear();
        self.pending_text = None;
        self.connections += 1;
        self.stat_sn = 0x100 * self.connections;
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_output(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbox.extend_from_slice(bytes);
        while !self.closed {
            match self.codec.decode_frame(&mut self.inbox) {
                Ok(Decoded::Complete(pdu)) => self.on_pdu(pdu),
                Ok(Decoded::Incomplete { .. }) => break,
                Err(e) => panic!("target failed to decode initiator PDU: {e}"),
            }
        }
    }

    fn send(&mut self, mut pdu: Pdu) {
        let bytes = self.codec.encode_pdu(&mut pdu);
        self.outbox.extend_from_slice(&bytes);
    }

    fn next_stat_sn(&mut self) -> u32 {
        let sn = self.stat_sn;
        self.stat_sn = sn.wrapping_add(1);
        sn
    }

    fn max_cmd_sn(&mut self) -> u32 {
        self.advertised_max = self
            .exp_cmd_sn
            .wrapping_add(self.window)
            .wrapping_sub(1);
        self.advertised_max
    }

    fn on_pdu(&mut self, pdu: Pdu) {
        match pdu {
            Pdu::LoginRequest(p) => self.handle_login(p),
            _ if !self.full_feature => panic!("full-feature PDU before login completed"),
            Pdu::ScsiCommand(p) => self.handle_command(p),
            Pdu::DataOut(p) => self.handle_data_out(p),
            Pdu::NopOut(p) => self.handle_nop_out(p),
            Pdu::TextRequest(p) => self.handle_text(p),
            Pdu::TaskMgmtRequest(p) => self.handle_task_mgmt(p),
            Pdu::LogoutRequest(p) => self.handle_logout(p),
            other => panic!("unexpected PDU at target: {:?}", other.opcode()),
        }
    }

    /// Non-immediate requests consume a CmdSN.
    fn account_cmd_sn(&mut self, cmd_sn: u32, immediate: bool) {
        if sn_gt(cmd_sn, self.advertised_max) {
            self.window_violations += 1;
        }
        if !immediate && cmd_sn == self.exp_cmd_sn {
            self.exp_cmd_sn = self.exp_cmd_sn.wrapping_add(1);
        }
    }

    // ── login ───────────────────────────────────────────────────────────────

    fn handle_login(&mut self, pdu: PduWithData<LoginRequest>) {
        let hdr = pdu.header_view().expect("login header");
        let itt = hdr.initiator_task_tag.get();
        let isid = hdr.isid;
        let tsih = hdr.tsih.get();
        let cmd_sn = hdr.cmd_sn.get();
        let transit = hdr.flags.transit();
        let csg = hdr.flags.csg();
        let nsg = hdr.flags.nsg();
        let pairs = parse_kv(&pdu.data);

        self.logins.push(SeenLogin {
            isid,
            tsih,
            cmd_sn,
        });
        self.exp_cmd_sn = cmd_sn;

        let mut rsp = LoginResponse::default();
        rsp.isid = isid;
        rsp.initiator_task_tag.set(itt);
        rsp.stat_sn.set(self.next_stat_sn());
        rsp.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        rsp.max_cmd_sn.set(max);

        let redirect = if self.redirect_always {
            self.redirect_to.clone()
        } else {
            self.redirect_to.take()
        };
        if let Some(addr) = redirect {
            rsp.status_class = 0x01;
            rsp.status_detail = 0x01;
            let data = build_kv([("TargetAddress", addr.as_str())]);
            self.send(Pdu::from(
                PduWithData::<LoginResponse>::from_header(&rsp).with_data(data),
            ));
            return;
        }
        if tsih != 0 && !self.sessions.contains(&tsih) {
            rsp.status_class = 0x02;
            rsp.status_detail = 0x0a;
            self.send(Pdu::from(PduWithData::<LoginResponse>::from_header(&rsp)));
            return;
        }

        let mut data = Vec::new();
        match csg {
            Some(Stage::Security) => {
                rsp.flags.set_csg(Stage::Security);
                if transit {
                    rsp.flags.set_transit(true);
                    rsp.flags.set_nsg(Stage::Operational);
                }
                data = build_kv([("AuthMethod", "None"), ("TargetPortalGroupTag", "1")]);
            },
            Some(Stage::Operational) => {
                rsp.flags.set_csg(Stage::Operational);
                let answers = self.answer_operational(&pairs);
                data = build_kv(answers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                if transit && nsg == Some(Stage::FullFeature) {
                    rsp.flags.set_transit(true);
                    rsp.flags.set_nsg(Stage::FullFeature);
                    let tsih = if tsih == 0 {
                        self.next_tsih = self.next_tsih.wrapping_add(1);
                        self.sessions.push(self.next_tsih);
                        self.next_tsih
                    } else {
                        tsih
                    };
                    rsp.tsih.set(tsih);
                    let digests = Digests {
                        header: answers.iter().any(|(k, v)| k == "HeaderDigest" && v == "CRC32C"),
                        data: answers.iter().any(|(k, v)| k == "DataDigest" && v == "CRC32C"),
                    };
                    self.send(Pdu::from(
                        PduWithData::<LoginResponse>::from_header(&rsp).with_data(data),
                    ));
                    self.codec.set_digests(digests);
                    self.full_feature = true;
                    return;
                }
            },
            other => panic!("login request in stage {other:?}"),
        }
        self.send(Pdu::from(
            PduWithData::<LoginResponse>::from_header(&rsp).with_data(data),
        ));
    }

    fn answer_operational(&mut self, pairs: &[(String, String)]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (k, v) in pairs {
            if let Some((_, forced)) = self.overrides.iter().find(|(ok, _)| ok == k) {
                out.push((k.clone(), forced.clone()));
                continue;
            }
            let answer = match k.as_str() {
                "HeaderDigest" | "DataDigest" => {
                    if self.offer_crc && v.split(',').any(|x| x == "CRC32C") {
                        "CRC32C".to_string()
                    } else {
                        "None".to_string()
                    }
                },
                "MaxRecvDataSegmentLength" => {
                    self.initiator_mrdsl = v.parse().unwrap_or(8192);
                    continue;
                },
                "MaxBurstLength" | "FirstBurstLength" => {
                    let ours: u32 = v.parse().unwrap_or(self.max_burst);
                    ours.min(self.max_burst).to_string()
                },
                "InitialR2T" | "ImmediateData" | "MaxOutstandingR2T" | "DataPDUInOrder"
                | "DataSequenceInOrder" | "ErrorRecoveryLevel" | "DefaultTime2Wait"
                | "DefaultTime2Retain" | "MaxConnections" => v.clone(),
                _ => continue,
            };
            out.push((k.clone(), answer));
        }
        out.push(("MaxRecvDataSegmentLength".into(), self.mrdsl.to_string()));
        out
    }

    // ── SCSI ────────────────────────────────────────────────────────────────

    fn handle_command(&mut self, pdu: PduWithData<ScsiCommandRequest>) {
        let hdr = pdu.header_view().expect("command header");
        let itt = hdr.initiator_task_tag.get();
        let cmd_sn = hdr.cmd_sn.get();
        let immediate = hdr.is_immediate();
        let cmd = HeldCommand {
            itt,
            lun: hdr.lun.get(),
            cdb: hdr.scsi_descriptor_block,
            edtl: hdr.expected_data_transfer_length.get(),
            final_flag: hdr.flags().contains(ScsiCommandRequestFlags::FINAL),
            data: pdu.data.clone(),
        };
        self.commands.push(SeenCommand {
            itt,
            cmd_sn,
            opcode: cmd.cdb[0],
        });
        self.account_cmd_sn(cmd_sn, immediate);

        if self.reject_opcode == Some(cmd.cdb[0]) {
            let mut rej = RejectPdu::default();
            rej.reason = 0x07;
            rej.stat_sn.set(self.next_stat_sn());
            rej.exp_cmd_sn.set(self.exp_cmd_sn);
            let max = self.max_cmd_sn();
            rej.max_cmd_sn.set(max);
            let echoed = pdu.header_buf.to_vec();
            self.send(Pdu::from(
                PduWithData::<RejectPdu>::from_header(&rej).with_data(echoed),
            ));
            return;
        }
        if self.hold_scsi {
            self.held.push(cmd);
            return;
        }
        self.execute(cmd);
    }

    /// Answers every parked command.
    pub fn release_held(&mut self) {
        self.hold_scsi = false;
        for cmd in std::mem::take(&mut self.held) {
            self.execute(cmd);
        }
    }

    fn execute(&mut self, cmd: HeldCommand) {
        let cdb = cmd.cdb;
        let op = cdb[0];
        if self.unit_attention && op != INQUIRY && op != REPORT_LUNS {
            self.unit_attention = false;
            self.unit_attentions_reported += 1;
            return self.check_condition(cmd.itt, SenseKey::UnitAttention, asc::POWER_ON_RESET);
        }
        match op {
            TEST_UNIT_READY => {
                if self.medium_present {
                    self.good(cmd.itt, 0)
                } else {
                    self.check_condition(cmd.itt, SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT)
                }
            },
            INQUIRY => self.handle_inquiry(&cmd),
            READ_CAPACITY_10 => {
                let mut d = Vec::with_capacity(8);
                d.extend_from_slice(&((BLOCKS - 1).min(u32::MAX as u64) as u32).to_be_bytes());
                d.extend_from_slice(&BLOCK_LEN.to_be_bytes());
                self.data_in(&cmd, d);
            },
            SERVICE_ACTION_IN_16 if cdb[1] & 0x1f == SA_READ_CAPACITY_16 => {
                let mut d = vec![0u8; 32];
                d[0..8].copy_from_slice(&(BLOCKS - 1).to_be_bytes());
                d[8..12].copy_from_slice(&BLOCK_LEN.to_be_bytes());
                self.data_in(&cmd, d);
            },
            READ_16 => {
                let (lba, blocks) = parse_rw16_cdb(&cdb);
                if !self.medium_present {
                    return self.check_condition(cmd.itt, SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT);
                }
                match self.byte_range(lba, blocks) {
                    Some(r) => {
                        let d = self.data[r].to_vec();
                        self.data_in(&cmd, d);
                    },
                    None => self.check_condition(cmd.itt, SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE),
                }
            },
            WRITE_16 => self.handle_write_16(cmd),
            VERIFY_10 | VERIFY_16 => {
                let (lba, blocks) = if op == VERIFY_10 {
                    parse_rw10_cdb(&cdb)
                } else {
                    parse_rw16_cdb(&cdb)
                };
                match self.byte_range(lba, blocks) {
                    Some(_) => self.good(cmd.itt, 0),
                    None => self.check_condition(cmd.itt, SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE),
                }
            },
            REPORT_LUNS => {
                let luns = [encode_lun(0), encode_lun(1)];
                let mut d = Vec::with_capacity(8 + luns.len() * 8);
                d.extend_from_slice(&((luns.len() * 8) as u32).to_be_bytes());
                d.extend_from_slice(&[0; 4]);
                for l in luns {
                    d.extend_from_slice(&l.to_be_bytes());
                }
                self.data_in(&cmd, d);
            },
            PREVENT_ALLOW_MEDIUM_REMOVAL => {
                self.prevent = cdb[4] & 0x03 != 0;
                self.good(cmd.itt, 0);
            },
            START_STOP_UNIT => {
                let loej = cdb[4] & 0x02 != 0;
                let start = cdb[4] & 0x01 != 0;
                if loej && !start {
                    if self.prevent {
                        return self.check_condition(
                            cmd.itt,
                            SenseKey::IllegalRequest,
                            asc::MEDIUM_REMOVAL_PREVENTED,
                        );
                    }
                    self.medium_present = false;
                } else if loej && start {
                    self.medium_present = true;
                }
                self.good(cmd.itt, 0);
            },
            SYNCHRONIZE_CACHE_10 => self.good(cmd.itt, 0),
            _ => self.check_condition(
                cmd.itt,
                SenseKey::IllegalRequest,
                asc::INVALID_COMMAND_OPERATION_CODE,
            ),
        }
    }

    fn byte_range(&self, lba: u64, blocks: u32) -> Option<std::ops::Range<usize>> {
        let end = lba.checked_add(u64::from(blocks))?;
        if end > BLOCKS {
            return None;
        }
        Some((lba * BLOCK_LEN as u64) as usize..(end * BLOCK_LEN as u64) as usize)
    }

    fn handle_inquiry(&mut self, cmd: &HeldCommand) {
        if cmd.cdb[1] & 0x01 != 0 {
            return self.check_condition(cmd.itt, SenseKey::IllegalRequest, asc::INVALID_FIELD_IN_CDB);
        }
        let mut d = vec![0u8; 36];
        d[0] = 0x00;
        d[1] = 0x80;
        d[2] = 0x06;
        d[3] = 0x02;
        d[4] = 31;
        d[8..16].copy_from_slice(b"MOCKTGT ");
        d[16..32].copy_from_slice(b"RAM DISK        ");
        d[32..36].copy_from_slice(b"0001");
        let alloc = u16::from_be_bytes([cmd.cdb[3], cmd.cdb[4]]) as usize;
        d.truncate(alloc);
        self.data_in(cmd, d);
    }

    fn handle_write_16(&mut self, cmd: HeldCommand) {
        let (lba, blocks) = parse_rw16_cdb(&cmd.cdb);
        if self.byte_range(lba, blocks).is_none() {
            return self.check_condition(cmd.itt, SenseKey::IllegalRequest, asc::LBA_OUT_OF_RANGE);
        }
        let mut buf = vec![0u8; cmd.edtl as usize];
        let imm = cmd.data.len().min(buf.len());
        buf[..imm].copy_from_slice(&cmd.data[..imm]);
        self.writes.insert(
            cmd.itt,
            PendingWrite {
                lun: cmd.lun,
                lba,
                buf,
                received: imm,
                burst_end: imm,
                unsolicited_open: !cmd.final_flag,
                r2t_sn: 0,
            },
        );
        self.advance_write(cmd.itt);
    }

    fn advance_write(&mut self, itt: u32) {
        let ttt = self.next_ttt;
        let max_burst = self.max_burst as usize;
        let Some(w) = self.writes.get_mut(&itt) else {
            return;
        };
        if w.unsolicited_open {
            return;
        }
        if w.received >= w.buf.len() {
            let Some(w) = self.writes.remove(&itt) else {
                return;
            };
            let start = (w.lba * BLOCK_LEN as u64) as usize;
            self.data[start..start + w.buf.len()].copy_from_slice(&w.buf);
            return self.good(itt, 0);
        }
        if w.received < w.burst_end {
            return;
        }
        let offset = w.received;
        let len = (w.buf.len() - offset).min(max_burst);
        w.burst_end = offset + len;
        let r2t_sn = w.r2t_sn;
        w.r2t_sn += 1;
        let lun = w.lun;
        self.next_ttt = self.next_ttt.wrapping_add(1);
        self.r2ts += 1;

        let mut r2t = ReadyToTransfer::default();
        r2t.lun.set(lun);
        r2t.initiator_task_tag.set(itt);
        r2t.target_transfer_tag.set(ttt);
        r2t.stat_sn.set(self.stat_sn);
        r2t.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        r2t.max_cmd_sn.set(max);
        r2t.r2t_sn.set(r2t_sn);
        r2t.buffer_offset.set(offset as u32);
        r2t.desired_data_transfer_length.set(len as u32);
        self.send(Pdu::from(PduWithData::<ReadyToTransfer>::from_header(&r2t)));
    }

    fn handle_data_out(&mut self, pdu: PduWithData<ScsiDataOut>) {
        let hdr = pdu.header_view().expect("data-out header");
        let itt = hdr.initiator_task_tag.get();
        let ttt = hdr.target_transfer_tag.get();
        let offset = hdr.buffer_offset.get() as usize;
        let fin = hdr.flags().contains(DataOutFlags::FINAL);
        self.data_outs.push((itt, ttt, pdu.data.len()));

        let Some(w) = self.writes.get_mut(&itt) else {
            panic!("Data-Out for unknown task {itt:#x}");
        };
        let end = offset + pdu.data.len();
        assert!(end <= w.buf.len(), "Data-Out beyond the expected transfer length");
        w.buf[offset..end].copy_from_slice(&pdu.data);
        w.received = w.received.max(end);
        if fin {
            if ttt == RESERVED_TAG {
                w.unsolicited_open = false;
                w.burst_end = w.received;
            }
            self.advance_write(itt);
        }
    }

    fn good(&mut self, itt: u32, residual: i64) {
        self.status(itt, ScsiStatus::Good, Vec::new(), residual);
    }

    fn check_condition(&mut self, itt: u32, key: SenseKey, code: (u8, u8)) {
        let sense = SenseData::fixed(key, code, None);
        let mut seg = (sense.len() as u16).to_be_bytes().to_vec();
        seg.extend_from_slice(&sense);
        self.status(itt, ScsiStatus::CheckCondition, seg, 0);
    }

    fn status(&mut self, itt: u32, status: ScsiStatus, data: Vec<u8>, residual: i64) {
        let mut rsp = ScsiCommandResponse::default();
        rsp.initiator_task_tag.set(itt);
        rsp.set_status(status).set_residual(residual);
        rsp.stat_sn.set(self.next_stat_sn());
        rsp.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        rsp.max_cmd_sn.set(max);
        self.send(Pdu::from(
            PduWithData::<ScsiCommandResponse>::from_header(&rsp).with_data(data),
        ));
    }

    /// Data-In split at the initiator's MaxRecvDataSegmentLength, status
    /// on the last PDU.
    fn data_in(&mut self, cmd: &HeldCommand, mut payload: Vec<u8>) {
        let residual = i64::from(cmd.edtl) - payload.len() as i64;
        payload.truncate(cmd.edtl as usize);
        if payload.is_empty() {
            return self.good(cmd.itt, residual);
        }
        let chunk = self.initiator_mrdsl.max(512);
        let mut offset = 0;
        let mut data_sn = 0;
        while offset < payload.len() {
            let end = (offset + chunk).min(payload.len());
            let mut h = ScsiDataIn::default();
            h.lun.set(cmd.lun);
            h.initiator_task_tag.set(cmd.itt);
            h.target_transfer_tag.set(RESERVED_TAG);
            h.data_sn.set(data_sn);
            h.buffer_offset.set(offset as u32);
            if end == payload.len() {
                h.set_status(ScsiStatus::Good, residual);
                h.stat_sn.set(self.next_stat_sn());
            }
            h.exp_cmd_sn.set(self.exp_cmd_sn);
            let max = self.max_cmd_sn();
            h.max_cmd_sn.set(max);
            self.send(Pdu::from(
                PduWithData::<ScsiDataIn>::from_header(&h).with_data(payload[offset..end].to_vec()),
            ));
            offset = end;
            data_sn += 1;
        }
    }

    // ── other requests ──────────────────────────────────────────────────────

    fn handle_nop_out(&mut self, pdu: PduWithData<NopOutRequest>) {
        let hdr = pdu.header_view().expect("nop-out header");
        let itt = hdr.initiator_task_tag.get();
        let ttt = hdr.target_transfer_tag.get();
        self.account_cmd_sn(hdr.cmd_sn.get(), true);
        if itt == RESERVED_TAG {
            self.nop_replies.push(ttt);
            return;
        }
        let mut rsp = NopInResponse::default();
        rsp.initiator_task_tag.set(itt);
        rsp.target_transfer_tag.set(RESERVED_TAG);
        rsp.stat_sn.set(self.next_stat_sn());
        rsp.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        rsp.max_cmd_sn.set(max);
        self.send(Pdu::from(
            PduWithData::<NopInResponse>::from_header(&rsp).with_data(pdu.data.clone()),
        ));
    }

    /// NOP-In carrying `itt`, as if it answered a ping with that tag.
    pub fn nop_in_for(&mut self, itt: u32) {
        let mut nop = NopInResponse::default();
        nop.initiator_task_tag.set(itt);
        nop.target_transfer_tag.set(RESERVED_TAG);
        nop.stat_sn.set(self.next_stat_sn());
        nop.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        nop.max_cmd_sn.set(max);
        self.send(Pdu::from(PduWithData::<NopInResponse>::from_header(&nop)));
    }

    /// Target-initiated NOP-In asking for a NOP-Out echo of `ttt`.
    pub fn ping(&mut self, ttt: u32) {
        let mut nop = NopInResponse::default();
        nop.target_transfer_tag.set(ttt);
        nop.stat_sn.set(self.stat_sn);
        nop.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        nop.max_cmd_sn.set(max);
        self.send(Pdu::from(PduWithData::<NopInResponse>::from_header(&nop)));
    }

    /// Async message asking the initiator to log out.
    pub fn request_logout(&mut self) {
        let mut msg = AsyncMessage::default();
        msg.async_event = 1;
        msg.parameter3.set(5);
        msg.stat_sn.set(self.next_stat_sn());
        msg.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        msg.max_cmd_sn.set(max);
        self.send(Pdu::from(PduWithData::<AsyncMessage>::from_header(&msg)));
    }

    /// Closes the connection after whatever is already queued.
    pub fn drop_connection(&mut self) {
        self.closed = true;
    }

    /// Forgets every session, as a target restart would.
    pub fn forget_sessions(&mut self) {
        self.sessions.clear();
    }

    fn handle_text(&mut self, pdu: PduWithData<TextRequest>) {
        let hdr = pdu.header_view().expect("text header");
        let itt = hdr.initiator_task_tag.get();
        let ttt = hdr.target_transfer_tag.get();
        self.account_cmd_sn(hdr.cmd_sn.get(), hdr.is_immediate());

        let (chunk, more, next_ttt) = match self.pending_text.take() {
            Some((pitt, pttt, rest)) if pitt == itt && pttt == ttt => (rest, false, RESERVED_TAG),
            _ => {
                let pairs = parse_kv(&pdu.data);
                let all = pairs.iter().any(|(k, v)| k == "SendTargets" && v == "All");
                let body = if all {
                    build_kv(self.send_targets.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                } else {
                    Vec::new()
                };
                if self.split_text && body.len() > 1 {
                    let cut = body.len() / 2;
                    let ttt = self.next_ttt;
                    self.next_ttt = self.next_ttt.wrapping_add(1);
                    self.pending_text = Some((itt, ttt, body[cut..].to_vec()));
                    (body[..cut].to_vec(), true, ttt)
                } else {
                    (body, false, RESERVED_TAG)
                }
            },
        };

        let mut rsp = TextResponse::default();
        rsp.flags = if more {
            TextFlags::CONTINUE.bits()
        } else {
            TextFlags::FINAL.bits()
        };
        rsp.initiator_task_tag.set(itt);
        rsp.target_transfer_tag.set(next_ttt);
        rsp.stat_sn.set(self.next_stat_sn());
        rsp.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        rsp.max_cmd_sn.set(max);
        self.send(Pdu::from(
            PduWithData::<TextResponse>::from_header(&rsp).with_data(chunk),
        ));
    }

    fn handle_task_mgmt(&mut self, pdu: PduWithData<TaskMgmtRequest>) {
        let hdr = pdu.header_view().expect("tmf header");
        let itt = hdr.initiator_task_tag.get();
        let referenced = hdr.referenced_task_tag.get();
        let lun = hdr.lun.get();
        self.account_cmd_sn(hdr.cmd_sn.get(), hdr.is_immediate());
        let function = hdr.function_code().expect("known TMF function");
        self.tmfs.push(function);

        let response = match function {
            TaskMgmtFunction::AbortTask => {
                let before = self.held.len() + self.writes.len();
                self.held.retain(|c| c.itt != referenced);
                self.writes.remove(&referenced);
                if self.held.len() + self.writes.len() < before { 0 } else { 1 }
            },
            TaskMgmtFunction::AbortTaskSet
            | TaskMgmtFunction::ClearTaskSet
            | TaskMgmtFunction::LogicalUnitReset => {
                self.held.retain(|c| lun_id(c.lun) != lun_id(lun));
                self.writes.retain(|_, w| lun_id(w.lun) != lun_id(lun));
                0
            },
            TaskMgmtFunction::TargetWarmReset | TaskMgmtFunction::TargetColdReset => {
                self.held.clear();
                self.writes.clear();
                0
            },
            _ => 5,
        };

        let mut rsp = TaskMgmtResponsePdu::default();
        rsp.response = response;
        rsp.initiator_task_tag.set(itt);
        rsp.stat_sn.set(self.next_stat_sn());
        rsp.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        rsp.max_cmd_sn.set(max);
        self.send(Pdu::from(PduWithData::<TaskMgmtResponsePdu>::from_header(&rsp)));

        if function == TaskMgmtFunction::TargetColdReset {
            // power cycle: sessions gone, reservations dropped, UA pending
            self.prevent = false;
            self.unit_attention = true;
            self.forget_sessions();
            self.closed = true;
        }
    }

    fn handle_logout(&mut self, pdu: PduWithData<LogoutRequest>) {
        let hdr = pdu.header_view().expect("logout header");
        let itt = hdr.initiator_task_tag.get();
        self.account_cmd_sn(hdr.cmd_sn.get(), hdr.is_immediate());
        self.logouts += 1;

        let mut rsp = LogoutResponse::default();
        rsp.initiator_task_tag.set(itt);
        rsp.stat_sn.set(self.next_stat_sn());
        rsp.exp_cmd_sn.set(self.exp_cmd_sn);
        let max = self.max_cmd_sn();
        rsp.max_cmd_sn.set(max);
        rsp.time2wait.set(2);
        self.send(Pdu::from(PduWithData::<LogoutResponse>::from_header(&rsp)));
        self.closed = true;
    }
}

fn parse_rw10_cdb(cdb: &[u8; 16]) -> (u64, u32) {
    let lba = u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]);
    let blocks = u16::from_be_bytes([cdb[7], cdb[8]]);
    (u64::from(lba), u32::from(blocks))
}

fn parse_rw16_cdb(cdb: &[u8; 16]) -> (u64, u32) {
    let mut lba = [0u8; 8];
    lba.copy_from_slice(&cdb[2..10]);
    let blocks = u32::from_be_bytes([cdb[10], cdb[11], cdb[12], cdb[13]]);
    (u64::from_be_bytes(lba), blocks)
}

pub fn lock(target: &Arc<Mutex<MockTarget>>) -> MutexGuard<'_, MockTarget> {
    target.lock().expect("mock target lock poisoned")
}

// ── loopback transport ──────────────────────────────────────────────────────

/// In-memory connection to a [`MockTarget`]; writes are handled
/// synchronously, so responses are ready as soon as `try_write` returns.
pub struct LoopbackTransport {
    target: Arc<Mutex<MockTarget>>,
    shut: bool,
}

impl LoopbackTransport {
    pub fn new(target: Arc<Mutex<MockTarget>>) -> Self {
        Self {
            target,
            shut: false,
        }
    }
}

impl Transport for LoopbackTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.shut {
            return Ok(0);
        }
        let mut t = lock(&self.target);
        if t.outbox.is_empty() {
            return if t.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(t.outbox.len());
        buf[..n].copy_from_slice(&t.outbox[..n]);
        t.outbox.drain(..n);
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut t = lock(&self.target);
        if self.shut || t.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if t.stall_writes {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        t.feed(buf);
        Ok(buf.len())
    }

    fn wait(&mut self, interest: Interest, timeout: Option<Duration>) -> io::Result<Interest> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let mut ready = Interest::empty();
            {
                let t = lock(&self.target);
                if t.has_output() || t.closed || self.shut {
                    ready |= Interest::READ;
                }
                if !t.stall_writes {
                    ready |= Interest::WRITE;
                }
            }
            let ready = ready & interest;
            if !ready.is_empty() {
                return Ok(ready);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(Interest::empty());
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn raw_fd(&self) -> Option<std::os::fd::RawFd> {
        None
    }

    fn shutdown(&mut self) {
        self.shut = true;
    }
}

/// Connector handing out loopback transports; records every portal dialed.
pub struct MockConnector {
    target: Arc<Mutex<MockTarget>>,
    pub dialed: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(target: Arc<Mutex<MockTarget>>) -> Self {
        Self {
            target,
            dialed: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Connector for MockConnector {
    fn connect(&mut self, portal: &str, _timeout: Duration) -> io::Result<Box<dyn Transport>> {
        self.dialed
            .lock()
            .expect("dialed lock poisoned")
            .push(portal.to_string());
        lock(&self.target).new_connection();
        Ok(Box::new(LoopbackTransport::new(self.target.clone())))
    }
}

/// Session wired to `target` through a [`MockConnector`].
pub fn mock_session(cfg: Config, target: &Arc<Mutex<MockTarget>>) -> (Session, Arc<Mutex<Vec<String>>>) {
    let connector = MockConnector::new(target.clone());
    let dialed = connector.dialed.clone();
    (Session::with_connector(cfg, Box::new(connector)), dialed)
}

/// Logged-in session against a default target.
pub fn logged_in(cfg: Config) -> Result<(Session, Arc<Mutex<MockTarget>>)> {
    let target = MockTarget::default().shared();
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync().context("login")?;
    Ok((s, target))
}

// ── TCP front end ───────────────────────────────────────────────────────────

/// Serves one TCP connection with a [`MockTarget`] on a background thread.
pub struct MockServer {
    pub addr: String,
    pub target: Arc<Mutex<MockTarget>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start(target: MockTarget) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").context("bind mock target")?;
        let addr = listener.local_addr()?.to_string();
        let target = target.shared();
        let stop = Arc::new(AtomicBool::new(false));

        let (t, s) = (target.clone(), stop.clone());
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            lock(&t).new_connection();
            if stream.set_read_timeout(Some(Duration::from_millis(5))).is_err() {
                return;
            }
            let mut buf = vec![0u8; 64 * 1024];
            while !s.load(Ordering::Relaxed) {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => lock(&t).feed(&buf[..n]),
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) => {},
                    Err(_) => break,
                }
                let (out, closed) = {
                    let mut g = lock(&t);
                    (g.take_output(), g.closed)
                };
                if !out.is_empty() && stream.write_all(&out).is_err() {
                    break;
                }
                if closed {
                    let _ = stream.shutdown(Shutdown::Both);
                    break;
                }
            }
        });

        Ok(Self {
            addr,
            target,
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
