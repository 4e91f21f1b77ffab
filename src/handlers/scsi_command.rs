// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCSI Command issue and SCSI Response handling.

use tracing::{debug, info, warn};

use crate::{
    cfg::enums::UnitAttentionPolicy,
    client::{
        session::Session,
        task::{Direction, Residual, ScsiResult, TaskReply},
        task_table::{TaskKind, TaskPhase},
    },
    control_block::report_luns::encode_lun,
    error::{IscsiError, Result},
    models::{
        command::{
            common::{ResponseCode, ScsiCommandResponseFlags, ScsiStatus},
            request::{ScsiCommandRequest, ScsiCommandRequestBuilder},
            response::ScsiCommandResponse,
        },
        common::RESERVED_TAG,
        data::{
            request::{ScsiDataOut, ScsiDataOutBuilder},
            sense_data::SenseData,
        },
        data_format::PduWithData,
        parse::Pdu,
    },
};

/// Splits `data[offset..offset + len]` into Data-Out PDUs of at most
/// `max_segment` bytes. DataSN starts at 0 and F marks the last PDU.
#[allow(clippy::too_many_arguments)]
pub(crate) fn data_out_sequence(
    itt: u32,
    lun: u64,
    ttt: u32,
    exp_stat_sn: u32,
    data: &[u8],
    offset: usize,
    len: usize,
    max_segment: usize,
) -> Vec<Pdu> {
    let max_segment = max_segment.max(1);
    let mut out = Vec::with_capacity(len.div_ceil(max_segment));
    let mut sent = 0usize;
    let mut data_sn = 0u32;
    while sent < len {
        let take = (len - sent).min(max_segment);
        let off = offset + sent;
        let last = sent + take == len;
        let hdr = ScsiDataOutBuilder::new()
            .fin(last)
            .lun(lun)
            .initiator_task_tag(itt)
            .target_transfer_tag(ttt)
            .exp_stat_sn(exp_stat_sn)
            .data_sn(data_sn)
            .buffer_offset(off as u32)
            .header;
        out.push(Pdu::from(
            PduWithData::<ScsiDataOut>::from_header(&hdr).with_data(data[off..off + take].to_vec()),
        ));
        data_sn = data_sn.wrapping_add(1);
        sent += take;
    }
    out
}

impl Session {
    /// Queues the command PDU of a registered SCSI task, plus immediate and
    /// unsolicited data for writes.
    pub(crate) fn issue_scsi(&mut self, itt: u32) -> Result<()> {
        let cmd_sn = self.next_cmd_sn();
        let exp_stat_sn = self.exp_stat_sn;
        let max_segment = self.params.max_xmit_data_segment_length as usize;
        let first_burst = self.params.first_burst_length as usize;
        let immediate_data = self.params.immediate_data;
        let initial_r2t = self.params.initial_r2t;

        let Some(task) = self.tasks.get_mut(itt) else {
            return Err(IscsiError::Internal(format!("issue of unknown task {itt:#x}")));
        };
        task.cmd_sn = cmd_sn;
        let Some(st) = task.scsi_mut() else {
            return Err(IscsiError::Internal(format!("task {itt:#x} is not a SCSI task")));
        };
        let t = &st.task;
        let lun = encode_lun(t.lun);

        let mut builder = ScsiCommandRequestBuilder::new()
            .lun(lun)
            .initiator_task_tag(itt)
            .cmd_sn(cmd_sn)
            .exp_stat_sn(exp_stat_sn)
            .expected_data_transfer_length(t.expected_len)
            .task_attribute(t.attribute)
            .scsi_descriptor_block(t.cdb.as_bytes());

        let mut immediate = Vec::new();
        let mut follow_up = Vec::new();
        let phase;
        match t.direction {
            Direction::None => phase = TaskPhase::Sent,
            Direction::Read => {
                builder = builder.read();
                phase = if t.expected_len > 0 {
                    TaskPhase::AwaitingData
                } else {
                    TaskPhase::Sent
                };
            },
            Direction::Write => {
                builder = builder.write();
                let total = t.data_out.len();
                let burst = first_burst.min(total);
                let imm = if immediate_data {
                    burst.min(max_segment)
                } else {
                    0
                };
                let unsolicited = if initial_r2t { imm } else { burst };
                immediate = t.data_out[..imm].to_vec();
                if unsolicited > imm {
                    builder = builder.more_data_follows();
                    follow_up = data_out_sequence(
                        itt,
                        lun,
                        RESERVED_TAG,
                        exp_stat_sn,
                        &t.data_out,
                        imm,
                        unsolicited - imm,
                        max_segment,
                    );
                }
                st.sent = unsolicited;
                phase = if unsolicited < total {
                    TaskPhase::AwaitingData
                } else {
                    TaskPhase::Sent
                };
            },
        }
        debug!(
            itt,
            cmd_sn,
            cdb = %hex::encode(st.task.cdb.as_bytes()),
            immediate = immediate.len(),
            unsolicited_pdus = follow_up.len(),
            "issuing SCSI command"
        );
        task.phase = phase;

        let cmd = PduWithData::<ScsiCommandRequest>::from_header(&builder.header).with_data(immediate);
        self.queue_pdu(Pdu::from(cmd));
        for pdu in follow_up {
            self.queue_pdu(pdu);
        }
        Ok(())
    }

    pub(crate) fn handle_scsi_response(&mut self, pdu: PduWithData<ScsiCommandResponse>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        let status = hdr.scsi_status();
        let response = hdr.response_code();
        let flags = hdr.flags();
        let count = hdr.residual_count.get();

        let residual = residual_of(
            flags.contains(ScsiCommandResponseFlags::U_BIG),
            flags.contains(ScsiCommandResponseFlags::O_BIG),
            count,
        );
        let sense = if status == ScsiStatus::CheckCondition {
            SenseData::from_response_segment(&pdu.data)
        } else {
            None
        };
        self.finish_scsi(itt, status, response, sense, residual)
    }

    /// Completes a SCSI task, or re-queues it when a unit attention is to
    /// be retried.
    pub(crate) fn finish_scsi(
        &mut self,
        itt: u32,
        status: ScsiStatus,
        response: ResponseCode,
        sense: Option<SenseData>,
        residual: Option<Residual>,
    ) -> Result<()> {
        let Some(mut task) = self.tasks.take(itt) else {
            warn!(itt, ?status, "SCSI status for unknown task dropped");
            return Ok(());
        };
        if !task.is_scsi() {
            self.tasks.reinsert(task)?;
            return Err(IscsiError::protocol(format!(
                "SCSI status for non-SCSI task {itt:#x}"
            )));
        }
        let TaskKind::Scsi(st) = &mut task.kind else {
            return Err(IscsiError::Internal(format!("task {itt:#x} changed kind")));
        };

        let unit_attention = status == ScsiStatus::CheckCondition
            && sense.as_ref().is_some_and(SenseData::is_unit_attention);
        if unit_attention {
            if let UnitAttentionPolicy::Retry { max } = self.cfg.runtime.unit_attention {
                if st.retries < max {
                    st.retries += 1;
                    st.reset_transfer();
                    task.phase = TaskPhase::Queued;
                    info!(
                        itt,
                        retry = st.retries,
                        sense = ?sense.as_ref().map(SenseData::asc_ascq),
                        "unit attention, re-issuing"
                    );
                    self.tasks.reinsert(task)?;
                    self.pending.push_front(itt);
                    return Ok(());
                }
            }
        }

        let result = ScsiResult {
            itt,
            status,
            response,
            sense,
            data: std::mem::take(&mut st.data_in),
            residual,
            cdb: st.task.cdb,
        };
        debug!(itt, ?status, ?response, bytes = result.data.len(), "SCSI task complete");
        task.finish(Ok(TaskReply::Scsi(result)));
        Ok(())
    }
}

pub(crate) fn residual_of(underflow: bool, overflow: bool, count: u32) -> Option<Residual> {
    if underflow {
        Some(Residual::Underflow(count))
    } else if overflow {
        Some(Residual::Overflow(count))
    } else {
        None
    }
}
