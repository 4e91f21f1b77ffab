// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{debug, trace, warn};

use crate::{
    client::{
        session::Session,
        task::{Completion, TaskHandle, TaskReply},
        task_table::{Task, TaskKind, TaskPhase},
    },
    error::{IscsiError, Result},
    models::{
        common::RESERVED_TAG,
        data_format::PduWithData,
        nop::{
            request::{NopOutRequest, NopOutRequestBuilder},
            response::NopInResponse,
        },
        parse::Pdu,
    },
};

impl Session {
    /// Initiator ping. The NOP-In echo data completes the task.
    pub fn nop(&mut self, data: Vec<u8>, completion: Completion) -> Result<TaskHandle> {
        self.require_full_feature("nop")?;
        let itt = self
            .tasks
            .register(Task::new(TaskKind::Nop, Some(completion)));
        if let Some(t) = self.tasks.get_mut(itt) {
            t.cmd_sn = self.cmd_sn;
            t.phase = TaskPhase::Sent;
        }
        let hdr = NopOutRequestBuilder::new()
            .initiator_task_tag(itt)
            .target_transfer_tag(RESERVED_TAG)
            .cmd_sn(self.immediate_cmd_sn())
            .exp_stat_sn(self.exp_stat_sn)
            .header;
        debug!(itt, len = data.len(), "NOP-Out ping");
        self.queue_pdu(Pdu::from(
            PduWithData::<NopOutRequest>::from_header(&hdr).with_data(data),
        ));
        Ok(TaskHandle { itt })
    }

    pub(crate) fn handle_nop_in(&mut self, pdu: PduWithData<NopInResponse>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        if itt != RESERVED_TAG {
            let Some(task) = self.tasks.take(itt) else {
                warn!(itt, "NOP-In for unknown task dropped");
                return Ok(());
            };
            if !matches!(task.kind, TaskKind::Nop) {
                self.tasks.reinsert(task)?;
                return Err(IscsiError::protocol(format!(
                    "NOP-In answers task {itt:#x}, which is not a ping"
                )));
            }
            task.finish(Ok(TaskReply::Nop(pdu.data.clone())));
            return Ok(());
        }
        if !hdr.wants_reply() {
            trace!("unsolicited NOP-In without reply request");
            return Ok(());
        }

        let ttt = hdr.target_transfer_tag.get();
        let reply = NopOutRequestBuilder::new()
            .lun(hdr.lun.get())
            .initiator_task_tag(RESERVED_TAG)
            .target_transfer_tag(ttt)
            .cmd_sn(self.immediate_cmd_sn())
            .exp_stat_sn(self.exp_stat_sn)
            .header;
        debug!(ttt, "answering target NOP-In");
        self.queue_pdu(Pdu::from(
            PduWithData::<NopOutRequest>::from_header(&reply).with_data(pdu.data.clone()),
        ));
        Ok(())
    }
}
