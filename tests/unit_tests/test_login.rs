// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_engine::{
    cfg::{
        cli::resolve_config_path,
        config::{AuthConfig, ChapConfig, Config},
    },
    error::LoginError,
    models::{
        data_format::PduWithData,
        login::{common::Stage, request::LoginRequest, response::LoginResponse, status::StatusClass},
        text::common::{build_kv, find_value, parse_kv},
    },
    state_machine::login::{
        common::{LoginAction, LoginIds, LoginMachine, LoginState, SecurityStep},
        login_chap::calc_chap_r_hex,
    },
};

const ITT: u32 = 0x10;

fn load() -> Result<Config> {
    resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)
}

fn ids() -> LoginIds {
    LoginIds {
        isid: [0x00, 0x02, 0x3d, 0x00, 0x00, 0x01],
        tsih: 0,
        cid: 0,
        itt: ITT,
        cmd_sn: 1,
        exp_stat_sn: 0,
    }
}

fn started(cfg: &Config) -> Result<(LoginMachine, PduWithData<LoginRequest>)> {
    let mut m = LoginMachine::new(cfg.login.clone(), ids());
    m.on_connected();
    let first = m.start()?;
    Ok((m, first))
}

/// Login Response in `csg`, optionally transiting to `nsg`.
fn response(
    csg: Stage,
    transit_to: Option<Stage>,
    pairs: &[(&str, &str)],
) -> PduWithData<LoginResponse> {
    let mut h = LoginResponse::default();
    h.initiator_task_tag.set(ITT);
    h.flags.set_csg(csg);
    if let Some(nsg) = transit_to {
        h.flags.set_transit(true);
        h.flags.set_nsg(nsg);
    }
    h.stat_sn.set(0x20);
    h.exp_cmd_sn.set(1);
    h.max_cmd_sn.set(8);
    PduWithData::<LoginResponse>::from_header(&h).with_data(build_kv(pairs.iter().copied()))
}

fn sent(action: LoginAction) -> PduWithData<LoginRequest> {
    match action {
        LoginAction::Send(req) => req,
        LoginAction::Complete(_) => panic!("login finished early"),
    }
}

fn operational_answer() -> Vec<(&'static str, &'static str)> {
    vec![
        ("HeaderDigest", "None"),
        ("DataDigest", "None"),
        ("MaxRecvDataSegmentLength", "65536"),
        ("MaxBurstLength", "131072"),
        ("FirstBurstLength", "65536"),
        ("InitialR2T", "Yes"),
        ("ImmediateData", "Yes"),
        ("MaxOutstandingR2T", "1"),
        ("DefaultTime2Wait", "4"),
    ]
}

#[test]
fn test_plain_login_two_rounds() -> Result<()> {
    let cfg = load()?;
    let (mut m, first) = started(&cfg)?;

    let hdr = first.header_view()?;
    assert_eq!(hdr.flags.csg(), Some(Stage::Security));
    assert_eq!(hdr.flags.nsg(), Some(Stage::Operational));
    assert!(hdr.flags.transit());
    assert_eq!(hdr.initiator_task_tag.get(), ITT);
    assert_eq!(hdr.cmd_sn.get(), 1);
    let keys = parse_kv(&first.data);
    assert_eq!(find_value(&keys, "AuthMethod"), Some("None"));
    assert_eq!(find_value(&keys, "SessionType"), Some("Normal"));
    assert_eq!(
        find_value(&keys, "TargetName"),
        Some(cfg.login.identity.target_name.as_str())
    );

    let op = sent(m.on_response(&response(
        Stage::Security,
        Some(Stage::Operational),
        &[("AuthMethod", "None"), ("TargetPortalGroupTag", "1")],
    ))?);
    assert_eq!(m.state(), LoginState::OperationalNegotiation);
    let op_hdr = op.header_view()?;
    assert_eq!(op_hdr.flags.csg(), Some(Stage::Operational));
    assert_eq!(op_hdr.flags.nsg(), Some(Stage::FullFeature));
    assert!(op_hdr.flags.transit());
    assert_eq!(op_hdr.exp_stat_sn.get(), 0x21);
    let offered = parse_kv(&op.data);
    assert_eq!(find_value(&offered, "MaxRecvDataSegmentLength"), Some("262144"));
    assert_eq!(find_value(&offered, "HeaderDigest"), Some("None"));

    let mut h = response(Stage::Operational, Some(Stage::FullFeature), &[])
        .header_view()?
        .clone();
    h.tsih.set(0x0042);
    let last = PduWithData::<LoginResponse>::from_header(&h)
        .with_data(build_kv(operational_answer()));

    let LoginAction::Complete(outcome) = m.on_response(&last)? else {
        panic!("expected full-feature phase");
    };
    assert_eq!(m.state(), LoginState::FullFeaturePhase);
    assert!(m.is_finished());
    assert_eq!(outcome.tsih, 0x0042);
    assert_eq!(outcome.stat_sn, 0x20);
    assert_eq!((outcome.exp_cmd_sn, outcome.max_cmd_sn), (1, 8));
    let p = &outcome.params;
    assert_eq!(p.max_xmit_data_segment_length, 65_536);
    assert_eq!(p.max_recv_data_segment_length, 262_144);
    assert_eq!(p.max_burst_length, 131_072);
    assert_eq!(p.default_time2wait, 4);
    assert_eq!(p.target_portal_group_tag, Some(1));
    Ok(())
}

#[test]
fn test_chap_login() -> Result<()> {
    let mut cfg = load()?;
    cfg.login.auth = AuthConfig::Chap(ChapConfig {
        username: "user".into(),
        secret: "0123456789ab".into(),
    });
    let (mut m, first) = started(&cfg)?;
    let hdr = first.header_view()?;
    assert!(!hdr.flags.transit(), "CHAP stays in the security stage");
    assert_eq!(find_value(&parse_kv(&first.data), "AuthMethod"), Some("CHAP,None"));

    let alg = sent(m.on_response(&response(Stage::Security, None, &[("AuthMethod", "CHAP")]))?);
    assert_eq!(
        m.state(),
        LoginState::SecurityNegotiation(SecurityStep::ChapAlgorithm)
    );
    assert_eq!(find_value(&parse_kv(&alg.data), "CHAP_A"), Some("5"));

    let challenge = [0xde, 0xad, 0xbe, 0xef];
    let ans = sent(m.on_response(&response(
        Stage::Security,
        None,
        &[("CHAP_A", "5"), ("CHAP_I", "7"), ("CHAP_C", "0xdeadbeef")],
    ))?);
    assert_eq!(
        m.state(),
        LoginState::SecurityNegotiation(SecurityStep::ChapResponse)
    );
    let ans_hdr = ans.header_view()?;
    assert!(ans_hdr.flags.transit());
    let pairs = parse_kv(&ans.data);
    assert_eq!(find_value(&pairs, "CHAP_N"), Some("user"));
    assert_eq!(
        find_value(&pairs, "CHAP_R"),
        Some(calc_chap_r_hex(7, b"0123456789ab", &challenge).as_str())
    );

    let op = sent(m.on_response(&response(Stage::Security, Some(Stage::Operational), &[]))?);
    assert_eq!(op.header_view()?.flags.csg(), Some(Stage::Operational));
    Ok(())
}

#[test]
fn test_chap_required_without_credentials() -> Result<()> {
    let cfg = load()?;
    let (mut m, _) = started(&cfg)?;
    let err = m
        .on_response(&response(Stage::Security, None, &[("AuthMethod", "CHAP")]))
        .expect_err("no credentials");
    assert!(matches!(err, LoginError::Authentication(_)));
    assert!(err.is_authentication());
    assert_eq!(m.state(), LoginState::LoginFailed);
    Ok(())
}

#[test]
fn test_redirect_carries_target_address() -> Result<()> {
    let cfg = load()?;
    let (mut m, _) = started(&cfg)?;
    let mut rsp = response(Stage::Security, None, &[("TargetAddress", "10.1.1.1:3260,2")]);
    let mut h = rsp.header_view()?.clone();
    h.status_class = 0x01;
    h.status_detail = 0x02;
    rsp = PduWithData::<LoginResponse>::from_header(&h).with_data(rsp.data.clone());

    match m.on_response(&rsp) {
        Err(LoginError::Rejected {
            class, redirect, ..
        }) => {
            assert_eq!(class, StatusClass::Redirection);
            assert_eq!(redirect.as_deref(), Some("10.1.1.1:3260,2"));
        },
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn test_continued_response_is_reassembled() -> Result<()> {
    let cfg = load()?;
    let (mut m, _) = started(&cfg)?;
    sent(m.on_response(&response(Stage::Security, Some(Stage::Operational), &[]))?);

    let body = build_kv(operational_answer());
    let (a, b) = body.split_at(body.len() / 2 + 3);

    let mut h = response(Stage::Operational, None, &[]).header_view()?.clone();
    h.flags.set_cont(true);
    let part1 = PduWithData::<LoginResponse>::from_header(&h).with_data(a.to_vec());
    let fetch = sent(m.on_response(&part1)?);
    assert!(fetch.data.is_empty(), "empty request fetches the next fragment");
    assert!(!fetch.header_view()?.flags.transit());

    let mut h = response(Stage::Operational, Some(Stage::FullFeature), &[]).header_view()?.clone();
    h.tsih.set(9);
    let part2 = PduWithData::<LoginResponse>::from_header(&h).with_data(b.to_vec());
    let LoginAction::Complete(outcome) = m.on_response(&part2)? else {
        panic!("expected completion");
    };
    assert_eq!(outcome.params.max_xmit_data_segment_length, 65_536);
    Ok(())
}

#[test]
fn test_protocol_violations() -> Result<()> {
    let cfg = load()?;

    let (mut m, _) = started(&cfg)?;
    let mut h = response(Stage::Security, Some(Stage::Operational), &[]).header_view()?.clone();
    h.initiator_task_tag.set(ITT + 1);
    let wrong_itt = PduWithData::<LoginResponse>::from_header(&h);
    assert!(matches!(m.on_response(&wrong_itt), Err(LoginError::Protocol(_))));

    let (mut m, _) = started(&cfg)?;
    let mut h = response(Stage::Security, Some(Stage::Operational), &[]).header_view()?.clone();
    h.flags.set_cont(true);
    let both = PduWithData::<LoginResponse>::from_header(&h);
    assert!(matches!(m.on_response(&both), Err(LoginError::Protocol(_))));

    let (mut m, _) = started(&cfg)?;
    let wrong_stage = response(Stage::Operational, Some(Stage::FullFeature), &[]);
    assert!(matches!(m.on_response(&wrong_stage), Err(LoginError::Protocol(_))));

    let (mut m, _) = started(&cfg)?;
    sent(m.on_response(&response(Stage::Security, Some(Stage::Operational), &[]))?);
    let bad_digest = response(
        Stage::Operational,
        Some(Stage::FullFeature),
        &[("HeaderDigest", "CRC32C")],
    );
    assert!(m.on_response(&bad_digest).is_err(), "answer outside our offer");
    Ok(())
}

#[test]
fn test_start_requires_connection() -> Result<()> {
    let cfg = load()?;
    let mut m = LoginMachine::new(cfg.login.clone(), ids());
    assert_eq!(m.state(), LoginState::Disconnected);
    assert!(m.start().is_err());
    Ok(())
}
