// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, warn};

use crate::{
    client::{session::Session, task::Direction, task_table::TaskPhase},
    error::{IscsiError, Result},
    handlers::scsi_command::data_out_sequence,
    models::{data_format::PduWithData, ready_2_transfer::response::ReadyToTransfer},
};

impl Session {
    /// Answers an R2T with the solicited Data-Out sequence.
    pub(crate) fn handle_r2t(&mut self, pdu: PduWithData<ReadyToTransfer>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        let ttt = hdr.target_transfer_tag.get();
        let lun = hdr.lun.get();
        let r2t_sn = hdr.r2t_sn.get();
        let offset = hdr.buffer_offset.get() as usize;
        let desired = hdr.desired_data_transfer_length.get() as usize;
        let exp_stat_sn = self.exp_stat_sn;
        let max_segment = self.params.max_xmit_data_segment_length as usize;

        let Some(task) = self.tasks.get_mut(itt) else {
            warn!(itt, r2t_sn, "R2T for unknown task dropped");
            return Ok(());
        };
        let Some(st) = task.scsi_mut() else {
            return Err(IscsiError::protocol(format!("R2T for non-SCSI task {itt:#x}")));
        };
        if st.task.direction != Direction::Write {
            return Err(IscsiError::protocol(format!("R2T for non-write task {itt:#x}")));
        }
        let total = st.task.data_out.len();
        if desired == 0 || offset + desired > total {
            return Err(IscsiError::protocol(format!(
                "R2T window [{offset}..{}) outside the {total} byte buffer of task {itt:#x}",
                offset + desired
            )));
        }
        debug!(itt, r2t_sn, ttt, offset, desired, "R2T");

        let pdus = data_out_sequence(
            itt,
            lun,
            ttt,
            exp_stat_sn,
            &st.task.data_out,
            offset,
            desired,
            max_segment,
        );
        st.sent = st.sent.max(offset + desired);
        let done = st.sent >= total;
        task.phase = if done {
            TaskPhase::Sent
        } else {
            TaskPhase::AwaitingData
        };
        for p in pdus {
            self.queue_pdu(p);
        }
        Ok(())
    }
}
