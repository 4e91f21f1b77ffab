// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::warn;

use crate::{
    client::session::{Session, SessionState},
    error::{Result, TaskError},
    models::{common::RESERVED_TAG, data_format::PduWithData, reject::response::RejectPdu},
};

impl Session {
    /// Fails the task whose PDU the target rejected.
    pub(crate) fn handle_reject(&mut self, pdu: PduWithData<RejectPdu>) -> Result<()> {
        let reason = pdu.header_view()?.reason_code();
        let rejected = RejectPdu::rejected_itt(&pdu.data).filter(|t| *t != RESERVED_TAG);
        warn!(?reason, itt = ?rejected, "target rejected a PDU");

        let Some(itt) = rejected else {
            return Ok(());
        };
        if self.tasks.get(itt).is_none() {
            warn!(itt, "reject for unknown task dropped");
            return Ok(());
        }
        self.pending.retain(|t| *t != itt);
        if self.logout_itt == Some(itt) {
            self.logout_itt = None;
            self.state = SessionState::FullFeature;
        }
        self.tasks.complete(itt, Err(TaskError::Rejected(reason)));
        Ok(())
    }
}
