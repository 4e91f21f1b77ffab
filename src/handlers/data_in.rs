// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{trace, warn};

use crate::{
    client::{
        session::Session,
        task::Direction,
        task_table::TaskPhase,
    },
    error::{IscsiError, Result},
    handlers::scsi_command::residual_of,
    models::{
        command::common::ResponseCode,
        data::{common::DataInFlags, response::ScsiDataIn},
        data_format::PduWithData,
    },
};

impl Session {
    /// Places Data-In at its buffer offset; the S bit completes the task.
    pub(crate) fn handle_data_in(&mut self, pdu: PduWithData<ScsiDataIn>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        let flags = hdr.flags();
        if !flags.is_consistent() {
            return Err(IscsiError::protocol(format!(
                "inconsistent Data-In flags {flags:?} for task {itt:#x}"
            )));
        }
        let offset = hdr.buffer_offset.get() as usize;
        let status = hdr.status();
        let count = hdr.residual_count.get();

        let Some(task) = self.tasks.get_mut(itt) else {
            warn!(itt, "Data-In for unknown task dropped");
            return Ok(());
        };
        let Some(st) = task.scsi_mut() else {
            return Err(IscsiError::protocol(format!("Data-In for non-SCSI task {itt:#x}")));
        };
        if st.task.direction != Direction::Read {
            return Err(IscsiError::protocol(format!(
                "Data-In for task {itt:#x} without a read buffer"
            )));
        }
        let end = offset + pdu.data.len();
        if end > st.task.expected_len as usize {
            return Err(IscsiError::protocol(format!(
                "Data-In [{offset}..{end}) overflows the {} byte buffer of task {itt:#x}",
                st.task.expected_len
            )));
        }
        if !pdu.data.is_empty() {
            if st.data_in.len() < end {
                st.data_in.resize(end, 0);
            }
            st.data_in[offset..end].copy_from_slice(&pdu.data);
            st.received = st.received.max(end);
        }
        trace!(itt, offset, len = pdu.data.len(), fin = flags.contains(DataInFlags::FINAL), "Data-In");

        let Some(status) = status else {
            task.phase = TaskPhase::AwaitingData;
            return Ok(());
        };
        let residual = residual_of(
            flags.contains(DataInFlags::U),
            flags.contains(DataInFlags::O),
            count,
        );
        self.finish_scsi(itt, status, ResponseCode::CommandCompleted, None, residual)
    }
}
