// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sans-io login driver.
//!
//! [`LoginMachine::start`] yields the first Login Request; every Login
//! Response goes through [`LoginMachine::on_response`], which yields the next
//! request or the negotiated result. The machine never touches a socket.

use tracing::{debug, info, warn};

use crate::{
    cfg::config::{
        AuthConfig, KeyOffer, LoginConfig, login_keys_chap_response, login_keys_operational,
        login_keys_security,
    },
    error::LoginError,
    models::{
        data_format::PduWithData,
        login::{
            common::Stage,
            request::{LoginRequest, LoginRequestBuilder},
            response::LoginResponse,
            status::StatusClass,
        },
        text::common::{build_kv, find_value, parse_kv},
    },
    state_machine::{
        common::Transition,
        login::{
            login_chap::{CHAP_A_MD5, calc_chap_r_hex, parse_chap_challenge},
            negotiation::{NegotiatedParams, Negotiator},
        },
    },
};

/// Upper bound on request/response rounds before the login is abandoned.
const MAX_ROUNDS: u32 = 32;

/// Where the security stage stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityStep {
    /// Security keys sent; waiting for the target's AuthMethod.
    Offered,
    /// CHAP_A sent; waiting for CHAP_I / CHAP_C.
    ChapAlgorithm,
    /// CHAP_N / CHAP_R sent with T=1.
    ChapResponse,
    /// Empty T=1 request sent to leave the security stage.
    Transit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Disconnected,
    TcpConnected,
    SecurityNegotiation(SecurityStep),
    OperationalNegotiation,
    FullFeaturePhase,
    LoginFailed,
}

/// What the login produced once the target moved to full-feature phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub tsih: u16,
    pub params: NegotiatedParams,
    /// StatSN of the final Login Response.
    pub stat_sn: u32,
    pub exp_cmd_sn: u32,
    pub max_cmd_sn: u32,
}

#[derive(Debug)]
pub enum LoginAction {
    Send(PduWithData<LoginRequest>),
    Complete(Box<LoginOutcome>),
}

pub type LoginStepOut = Transition<LoginState, LoginAction>;

/// Identity of one login attempt on one connection.
#[derive(Debug, Clone, Copy)]
pub struct LoginIds {
    pub isid: [u8; 6],
    /// 0 for a new session, the old TSIH to reinstate one.
    pub tsih: u16,
    pub cid: u16,
    pub itt: u32,
    pub cmd_sn: u32,
    pub exp_stat_sn: u32,
}

#[derive(Debug)]
pub struct LoginMachine {
    cfg: LoginConfig,
    ids: LoginIds,
    state: LoginState,
    negotiator: Negotiator,
    /// Data of C=1 responses waiting for the final fragment.
    partial: Vec<u8>,
    /// Stages of the request in flight, repeated while fetching fragments.
    in_flight: (Stage, Stage, bool),
    rounds: u32,
}

impl LoginMachine {
    pub fn new(cfg: LoginConfig, ids: LoginIds) -> Self {
        let negotiator = Negotiator::new(&cfg);
        Self {
            cfg,
            ids,
            state: LoginState::Disconnected,
            negotiator,
            partial: Vec::new(),
            in_flight: (Stage::Security, Stage::Security, false),
            rounds: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> LoginState {
        self.state
    }

    #[inline]
    pub fn ids(&self) -> &LoginIds {
        &self.ids
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            LoginState::FullFeaturePhase | LoginState::LoginFailed
        )
    }

    /// The transport is up; the machine may now start.
    pub fn on_connected(&mut self) {
        if self.state == LoginState::Disconnected {
            self.state = LoginState::TcpConnected;
        }
    }

    /// First Login Request: security keys, with T=1 straight to operational
    /// when no authentication is configured.
    pub fn start(&mut self) -> Result<PduWithData<LoginRequest>, LoginError> {
        if self.state != LoginState::TcpConnected {
            return Err(LoginError::Protocol(format!(
                "login start in state {:?}",
                self.state
            )));
        }
        let keys = login_keys_security(&self.cfg);
        let transit = matches!(self.cfg.auth, AuthConfig::None);
        self.state = LoginState::SecurityNegotiation(SecurityStep::Offered);
        debug!(transit, "login: offering security keys");
        Ok(self.request(Stage::Security, Stage::Operational, transit, &keys))
    }

    /// Feeds one Login Response. On error the machine is in `LoginFailed`.
    pub fn on_response(
        &mut self,
        rsp: &PduWithData<LoginResponse>,
    ) -> Result<LoginAction, LoginError> {
        match self.step(rsp) {
            Ok(Transition::Next(state, action)) => {
                debug!(from = ?self.state, to = ?state, "login transition");
                self.state = state;
                Ok(action)
            },
            Ok(Transition::Stay(action)) => Ok(action),
            Ok(Transition::Done(action)) => {
                info!("login complete, entering full-feature phase");
                self.state = LoginState::FullFeaturePhase;
                Ok(action)
            },
            Err(e) => {
                warn!(error = %e, state = ?self.state, "login failed");
                self.state = LoginState::LoginFailed;
                Err(e)
            },
        }
    }

    fn step(&mut self, rsp: &PduWithData<LoginResponse>) -> Result<LoginStepOut, LoginError> {
        let stage = match self.state {
            LoginState::SecurityNegotiation(_) => Stage::Security,
            LoginState::OperationalNegotiation => Stage::Operational,
            other => {
                return Err(LoginError::Protocol(format!(
                    "login response in state {other:?}"
                )));
            },
        };
        self.rounds += 1;
        if self.rounds > MAX_ROUNDS {
            return Err(LoginError::Protocol("login did not converge".into()));
        }

        let hdr = rsp
            .header_view()
            .map_err(|e| LoginError::Protocol(e.to_string()))?;
        if hdr.initiator_task_tag.get() != self.ids.itt {
            return Err(LoginError::Protocol(format!(
                "login response ITT {:#x}, expected {:#x}",
                hdr.initiator_task_tag.get(),
                self.ids.itt
            )));
        }
        if hdr.class() != StatusClass::Success {
            let pairs = parse_kv(&rsp.data);
            return Err(LoginError::Rejected {
                class: hdr.class(),
                detail: hdr.detail(),
                redirect: (hdr.class() == StatusClass::Redirection)
                    .then(|| find_value(&pairs, "TargetAddress").map(str::to_string))
                    .flatten(),
            });
        }
        self.ids.exp_stat_sn = hdr.stat_sn.get().wrapping_add(1);
        if hdr.flags.csg() != Some(stage) {
            return Err(LoginError::Protocol(format!(
                "target answered in stage {:?}, expected {stage:?}",
                hdr.flags.csg()
            )));
        }

        self.partial.extend_from_slice(&rsp.data);
        if hdr.flags.cont() {
            if hdr.flags.transit() {
                return Err(LoginError::Protocol("login response with both T and C".into()));
            }
            // Ask for the next fragment with an empty request.
            let (csg, nsg, _) = self.in_flight;
            return Ok(Transition::Stay(LoginAction::Send(
                self.request(csg, nsg, false, &[]),
            )));
        }
        let pairs = parse_kv(&std::mem::take(&mut self.partial));
        let transit_to = hdr.flags.transit().then(|| hdr.flags.nsg()).flatten();

        match self.state {
            LoginState::SecurityNegotiation(step) => self.on_security(step, transit_to, &pairs),
            _ => {
                let outcome = LoginOutcome {
                    tsih: hdr.tsih.get(),
                    params: NegotiatedParams::default(),
                    stat_sn: hdr.stat_sn.get(),
                    exp_cmd_sn: hdr.exp_cmd_sn.get(),
                    max_cmd_sn: hdr.max_cmd_sn.get(),
                };
                self.on_operational(transit_to, &pairs, outcome)
            },
        }
    }

    fn on_security(
        &mut self,
        step: SecurityStep,
        transit_to: Option<Stage>,
        pairs: &[(String, String)],
    ) -> Result<LoginStepOut, LoginError> {
        if let Some(next) = transit_to {
            if next != Stage::Operational {
                return Err(LoginError::Protocol(format!(
                    "target moved from security to {next:?}"
                )));
            }
            if step == SecurityStep::ChapAlgorithm {
                return Err(LoginError::Authentication(
                    "target left security stage before the CHAP exchange".into(),
                ));
            }
            self.negotiator.apply(pairs)?;
            return Ok(self.begin_operational(Vec::new()));
        }

        match step {
            SecurityStep::Offered => match find_value(pairs, "AuthMethod") {
                Some("CHAP") => {
                    if !matches!(self.cfg.auth, AuthConfig::Chap(_)) {
                        return Err(LoginError::Authentication(
                            "target requires CHAP but no credentials are configured".into(),
                        ));
                    }
                    let keys = [("CHAP_A".to_string(), CHAP_A_MD5.to_string())];
                    Ok(Transition::Next(
                        LoginState::SecurityNegotiation(SecurityStep::ChapAlgorithm),
                        LoginAction::Send(self.request(
                            Stage::Security,
                            Stage::Operational,
                            false,
                            &keys,
                        )),
                    ))
                },
                Some("None") | None => Ok(Transition::Next(
                    LoginState::SecurityNegotiation(SecurityStep::Transit),
                    LoginAction::Send(self.request(
                        Stage::Security,
                        Stage::Operational,
                        true,
                        &[],
                    )),
                )),
                Some(other) => Err(LoginError::Authentication(format!(
                    "target answered AuthMethod={other}"
                ))),
            },
            SecurityStep::ChapAlgorithm => {
                let AuthConfig::Chap(chap) = &self.cfg.auth else {
                    return Err(LoginError::Authentication("no CHAP credentials".into()));
                };
                let (id, challenge) = parse_chap_challenge(pairs)?;
                let chap_r = calc_chap_r_hex(id, chap.secret.as_bytes(), &challenge);
                let keys = login_keys_chap_response(&chap.username, &chap_r);
                debug!(chap_i = id, "login: answering CHAP challenge");
                Ok(Transition::Next(
                    LoginState::SecurityNegotiation(SecurityStep::ChapResponse),
                    LoginAction::Send(self.request(
                        Stage::Security,
                        Stage::Operational,
                        true,
                        &keys,
                    )),
                ))
            },
            SecurityStep::ChapResponse => Err(LoginError::Authentication(
                "target did not accept the CHAP response".into(),
            )),
            SecurityStep::Transit => Ok(Transition::Stay(LoginAction::Send(self.request(
                Stage::Security,
                Stage::Operational,
                true,
                &[],
            )))),
        }
    }

    fn begin_operational(&mut self, extra: Vec<KeyOffer>) -> LoginStepOut {
        let mut keys = login_keys_operational(&self.cfg);
        keys.extend(extra);
        self.negotiator.offer(&keys);
        Transition::Next(
            LoginState::OperationalNegotiation,
            LoginAction::Send(self.request(Stage::Operational, Stage::FullFeature, true, &keys)),
        )
    }

    fn on_operational(
        &mut self,
        transit_to: Option<Stage>,
        pairs: &[(String, String)],
        mut outcome: LoginOutcome,
    ) -> Result<LoginStepOut, LoginError> {
        let replies = self.negotiator.apply(pairs)?;
        match transit_to {
            Some(Stage::FullFeature) => {
                outcome.params = self.negotiator.params().clone();
                if outcome.tsih == 0 {
                    warn!("final login response carries TSIH 0");
                }
                info!(
                    tsih = outcome.tsih,
                    header_digest = outcome.params.header_digest,
                    data_digest = outcome.params.data_digest,
                    mrdsl = outcome.params.max_xmit_data_segment_length,
                    "operational negotiation finished"
                );
                Ok(Transition::Done(LoginAction::Complete(Box::new(outcome))))
            },
            Some(other) => Err(LoginError::Protocol(format!(
                "target moved from operational to {other:?}"
            ))),
            None => {
                self.negotiator.offer(&replies);
                Ok(Transition::Stay(LoginAction::Send(self.request(
                    Stage::Operational,
                    Stage::FullFeature,
                    true,
                    &replies,
                ))))
            },
        }
    }

    fn request(
        &mut self,
        csg: Stage,
        nsg: Stage,
        transit: bool,
        keys: &[KeyOffer],
    ) -> PduWithData<LoginRequest> {
        self.in_flight = (csg, nsg, transit);
        let mut b = LoginRequestBuilder::new(self.ids.isid, self.ids.tsih)
            .csg(csg)
            .nsg(nsg)
            .versions(0, 0)
            .initiator_task_tag(self.ids.itt)
            .connection_id(self.ids.cid)
            .cmd_sn(self.ids.cmd_sn)
            .exp_stat_sn(self.ids.exp_stat_sn);
        if transit {
            b = b.transit();
        }
        PduWithData::<LoginRequest>::from_header(&b.header)
            .with_data(build_kv(keys.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
    }
}
