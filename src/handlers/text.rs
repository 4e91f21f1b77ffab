// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Text Request exchanges, including SendTargets discovery.

use tracing::{debug, warn};

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
        parse::Pdu,
        text::{
            common::{build_kv, parse_kv},
            request::{TextRequest, TextRequestBuilder},
            response::TextResponse,
        },
    },
};

/// One target reported by SendTargets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTarget {
    pub name: String,
    /// `TargetAddress` values, `host:port,tpgt`.
    pub addresses: Vec<String>,
}

/// Groups SendTargets pairs: each `TargetName` opens a new entry and the
/// `TargetAddress` keys after it belong to that entry.
pub fn parse_send_targets(pairs: &[(String, String)]) -> Vec<DiscoveredTarget> {
    let mut out: Vec<DiscoveredTarget> = Vec::new();
    for (k, v) in pairs {
        match k.as_str() {
            "TargetName" => out.push(DiscoveredTarget {
                name: v.clone(),
                addresses: Vec::new(),
            }),
            "TargetAddress" => match out.last_mut() {
                Some(t) => t.addresses.push(v.clone()),
                None => warn!(address = %v, "TargetAddress before any TargetName"),
            },
            other => debug!(key = other, "ignoring SendTargets key"),
        }
    }
    out
}

impl Session {
    /// `SendTargets=All`; the reply is [`TaskReply::Text`], see
    /// [`parse_send_targets`].
    pub fn send_targets(&mut self, completion: Completion) -> Result<TaskHandle> {
        self.text_request(&[("SendTargets", "All")], completion)
    }

    /// Sends `keys` in an immediate Text Request and collects the full
    /// (possibly multi-PDU) response.
    pub fn text_request(
        &mut self,
        keys: &[(&str, &str)],
        completion: Completion,
    ) -> Result<TaskHandle> {
        self.require_full_feature("text request")?;
        let itt = self.tasks.register(Task::new(
            TaskKind::Text {
                partial: Vec::new(),
            },
            Some(completion),
        ));
        if let Some(t) = self.tasks.get_mut(itt) {
            t.cmd_sn = self.cmd_sn;
            t.phase = TaskPhase::Sent;
        }
        debug!(itt, ?keys, "text request");
        self.queue_text(itt, RESERVED_TAG, build_kv(keys.iter().copied()));
        Ok(TaskHandle { itt })
    }

    fn queue_text(&mut self, itt: u32, ttt: u32, data: Vec<u8>) {
        let hdr = TextRequestBuilder::new()
            .immediate()
            .initiator_task_tag(itt)
            .target_transfer_tag(ttt)
            .cmd_sn(self.immediate_cmd_sn())
            .exp_stat_sn(self.exp_stat_sn)
            .header;
        self.queue_pdu(Pdu::from(
            PduWithData::<TextRequest>::from_header(&hdr).with_data(data),
        ));
    }

    pub(crate) fn handle_text_response(&mut self, pdu: PduWithData<TextResponse>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        let ttt = hdr.target_transfer_tag.get();
        let more = hdr.has_more();

        let Some(task) = self.tasks.get_mut(itt) else {
            warn!(itt, "text response for unknown task dropped");
            return Ok(());
        };
        let TaskKind::Text { partial } = &mut task.kind else {
            return Err(IscsiError::protocol(format!(
                "text response for task {itt:#x} of another kind"
            )));
        };
        partial.extend_from_slice(&pdu.data);
        if more {
            debug!(itt, ttt, buffered = partial.len(), "text response continues");
            self.queue_text(itt, ttt, Vec::new());
            return Ok(());
        }
        let pairs = parse_kv(&std::mem::take(partial));
        self.tasks.complete(itt, Ok(TaskReply::Text(pairs)));
        Ok(())
    }
}
