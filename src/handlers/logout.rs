// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::{info, warn};

use crate::{
    client::{
        session::{Session, SessionState},
        task_table::{Task, TaskKind, TaskPhase},
    },
    error::Result,
    models::{
        data_format::PduWithData,
        logout::{
            request::{LogoutReason, LogoutRequest, LogoutRequestBuilder},
            response::{LogoutResponse, LogoutResponseCode},
        },
        parse::Pdu,
    },
};

impl Session {
    /// Requests session close. Tasks still outstanding when the response
    /// arrives are completed with `ConnectionLost`.
    pub fn logout(&mut self) -> Result<()> {
        self.require_full_feature("logout")?;
        let itt = self.tasks.register(Task::new(TaskKind::Logout, None));
        let cmd_sn = self.immediate_cmd_sn();
        if let Some(t) = self.tasks.get_mut(itt) {
            t.cmd_sn = cmd_sn;
            t.phase = TaskPhase::Sent;
        }
        let hdr = LogoutRequestBuilder::new(LogoutReason::CloseSession, itt, self.cid)
            .cmd_sn(cmd_sn)
            .exp_stat_sn(self.exp_stat_sn)
            .header;
        info!(itt, tsih = self.tsih, "logout requested");
        self.logout_itt = Some(itt);
        self.state = SessionState::LoggingOut;
        self.queue_pdu(Pdu::from(PduWithData::<LogoutRequest>::from_header(&hdr)));
        Ok(())
    }

    pub(crate) fn handle_logout_response(&mut self, pdu: PduWithData<LogoutResponse>) -> Result<()> {
        let hdr = pdu.header_view()?;
        let itt = hdr.initiator_task_tag.get();
        let code = hdr.response_code();
        if self.logout_itt != Some(itt) {
            warn!(itt, %code, "logout response for unknown request dropped");
            return Ok(());
        }
        self.tasks.take(itt);
        if code == LogoutResponseCode::Success {
            info!("logged out");
        } else {
            warn!(%code, "logout answered with an error, closing anyway");
        }
        self.teardown(SessionState::Closed);
        self.tsih = 0;
        Ok(())
    }
}
