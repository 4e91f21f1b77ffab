// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::debug;

use crate::{
    client::session::Session,
    error::{IscsiError, LoginError, Result},
    models::{
        data_format::PduWithData,
        login::{
            response::LoginResponse,
            status::{InitiatorErrorDetail, StatusDetail},
        },
        parse::Pdu,
    },
    state_machine::login::common::LoginAction,
};

const MAX_REDIRECTS: u32 = 4;

impl Session {
    pub(crate) fn handle_login_response(&mut self, pdu: PduWithData<LoginResponse>) -> Result<()> {
        let Some(machine) = self.login.as_mut() else {
            return Err(IscsiError::protocol("login response without a login in progress"));
        };
        match machine.on_response(&pdu) {
            Ok(LoginAction::Send(req)) => {
                debug!(state = ?machine.state(), "login continues");
                self.queue_pdu(Pdu::LoginRequest(req));
                Ok(())
            },
            Ok(LoginAction::Complete(outcome)) => {
                self.enter_full_feature(*outcome);
                self.flush_pending()
            },
            Err(e) => {
                let forgotten = matches!(
                    e,
                    LoginError::Rejected {
                        detail: StatusDetail::InitiatorErr(InitiatorErrorDetail::SessionDoesNotExist),
                        ..
                    }
                );
                if self.has_connector() {
                    if forgotten && self.tsih != 0 {
                        return self.restart_login(None, true);
                    }
                    if let LoginError::Rejected {
                        redirect: Some(addr),
                        ..
                    } = &e
                    {
                        if self.redirects < MAX_REDIRECTS {
                            self.redirects += 1;
                            // "host:port,tpgt"
                            let portal = addr.split(',').next().unwrap_or(addr).to_string();
                            return self.restart_login(Some(&portal), false);
                        }
                    }
                }
                self.login_error = Some(e.clone());
                Err(IscsiError::Login(e))
            },
        }
    }
}
