// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, Mutex};

use anyhow::Result;
use iscsi_engine::{
    SessionState,
    cfg::enums::SessionType,
    client::{Completion, ScsiTask, TaskReply},
    control_block::{test_unit_ready::build_test_unit_ready, write::WRITE_16},
    error::TaskError,
    models::{
        reject::reject_description::RejectReason,
        task_mgmt::common::{TaskMgmtFunction, TaskMgmtResponse},
    },
};

use crate::integration_tests::common::{
    BLOCK_LEN, MockTarget, TARGET_NAME, load_config, lock, logged_in, mock_session,
};

#[test]
fn nop_echoes_ping_data() -> Result<()> {
    let (mut s, _t) = logged_in(load_config()?)?;
    assert_eq!(s.nop_sync(b"ping".to_vec())?, b"ping");
    assert!(s.nop_sync(Vec::new())?.is_empty());
    Ok(())
}

#[test]
fn target_ping_is_answered() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    let before = s.cmd_sn();

    lock(&target).ping(0x7000);
    s.pump_until("nop reply", |_| !lock(&target).nop_replies.is_empty())?;

    assert_eq!(lock(&target).nop_replies, vec![0x7000]);
    // the reply is immediate and consumes no CmdSN
    assert_eq!(s.cmd_sn(), before);
    assert!(s.test_unit_ready_sync(lun)?.is_good());
    Ok(())
}

#[test]
fn nop_in_with_a_scsi_tag_is_a_protocol_error() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).hold_scsi = true;

    let (completion, mut rx) = Completion::channel();
    let handle = s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), completion)?;
    s.service(false, true)?;
    assert_eq!(lock(&target).held_count(), 1);

    lock(&target).nop_in_for(handle.itt);
    s.pump_until("nop-in", |s| s.state() != SessionState::FullFeature)?;

    // Reconnect: Never
    assert_eq!(s.state(), SessionState::Dead);
    assert_eq!(rx.try_recv().ok(), Some(Err(TaskError::ConnectionLost)));
    Ok(())
}

#[test]
fn send_targets_joins_continued_responses() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.identity.session_type = SessionType::Discovery;
    cfg.validate_and_normalize()?;
    let target = {
        let mut t = MockTarget::default();
        t.split_text = true;
        t.shared()
    };
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;

    let found = s.send_targets_sync()?;
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].name, TARGET_NAME);
    assert_eq!(found[0].addresses, vec!["127.0.0.1:3260,1".to_string()]);
    assert_eq!(found[1].name, "iqn.2025-08.example:tape1");
    assert_eq!(found[1].addresses, vec!["127.0.0.1:3261,2".to_string()]);

    s.logout_sync()?;
    assert_eq!(s.state(), SessionState::Closed);
    Ok(())
}

#[test]
fn discovery_session_refuses_scsi() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.identity.session_type = SessionType::Discovery;
    cfg.validate_and_normalize()?;
    let target = MockTarget::default().shared();
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;
    assert!(s.submit(ScsiTask::no_data(0, build_test_unit_ready())).is_err());
    Ok(())
}

#[test]
fn async_logout_request_ends_session() -> Result<()> {
    let (mut s, target) = logged_in(load_config()?)?;
    lock(&target).request_logout();
    s.pump_until("logout", |s| s.state() == SessionState::Closed)?;
    assert_eq!(lock(&target).logouts, 1);
    Ok(())
}

#[test]
fn reject_fails_only_the_rejected_task() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).reject_opcode = Some(WRITE_16);

    let err = s
        .write16_sync(lun, 0, BLOCK_LEN, vec![0; BLOCK_LEN as usize])
        .expect_err("write rejected");
    assert!(
        matches!(
            err,
            iscsi_engine::IscsiError::Task(TaskError::Rejected(RejectReason::CommandNotSupported))
        ),
        "got {err:?}"
    );
    assert_eq!(s.state(), SessionState::FullFeature);
    assert_eq!(s.outstanding(), 0);
    assert!(s.test_unit_ready_sync(lun)?.is_good());
    Ok(())
}

#[test]
fn abort_task_completes_the_task_as_aborted() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).hold_scsi = true;

    let (completion, mut rx) = iscsi_engine::client::Completion::channel();
    let handle = s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), completion)?;
    s.service(false, true)?;
    assert_eq!(lock(&target).held_count(), 1);

    let rsp = s.abort_task_sync(handle)?;
    assert_eq!(rsp, TaskMgmtResponse::FunctionComplete);
    assert_eq!(rx.try_recv().ok(), Some(Err(TaskError::Aborted)));
    assert_eq!(lock(&target).tmfs, vec![TaskMgmtFunction::AbortTask]);

    // nothing left to abort
    assert!(s.abort_task_sync(handle).is_err());
    lock(&target).hold_scsi = false;
    assert!(s.test_unit_ready_sync(lun)?.is_good());
    Ok(())
}

#[test]
fn lun_reset_aborts_tasks_of_that_lun() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).hold_scsi = true;

    let rx1 = s.submit(ScsiTask::no_data(lun, build_test_unit_ready()))?;
    let rx2 = s.submit(ScsiTask::no_data(lun, build_test_unit_ready()))?;
    s.service(false, true)?;

    let rsp = s.task_mgmt_sync(TaskMgmtFunction::LogicalUnitReset, lun)?;
    assert_eq!(rsp, TaskMgmtResponse::FunctionComplete);
    for mut rx in [rx1, rx2] {
        assert_eq!(rx.try_recv().ok(), Some(Err(TaskError::Aborted)));
    }
    assert_eq!(s.outstanding(), 0);
    assert_eq!(lock(&target).held_count(), 0);

    assert!(s.task_mgmt_sync(TaskMgmtFunction::AbortTask, lun).is_err());
    Ok(())
}

#[test]
fn task_management_helpers_report_through_callbacks() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = || {
        let seen = seen.clone();
        Completion::callback(move |outcome| {
            if let Ok(TaskReply::TaskMgmt { function, response }) = outcome {
                seen.lock().expect("seen lock").push((function, response));
            }
        })
    };
    s.abort_task_set(lun, record())?;
    s.clear_task_set(lun, record())?;
    s.clear_aca(lun, record())?;
    s.target_warm_reset(record())?;
    s.pump_until("task management", |_| seen.lock().is_ok_and(|v| v.len() == 4))?;

    assert_eq!(
        *seen.lock().expect("seen lock"),
        vec![
            (TaskMgmtFunction::AbortTaskSet, TaskMgmtResponse::FunctionComplete),
            (TaskMgmtFunction::ClearTaskSet, TaskMgmtResponse::FunctionComplete),
            (TaskMgmtFunction::ClearAca, TaskMgmtResponse::FunctionNotSupported),
            (TaskMgmtFunction::TargetWarmReset, TaskMgmtResponse::FunctionComplete),
        ]
    );
    assert_eq!(lock(&target).tmfs.len(), 4);
    assert_eq!(s.state(), SessionState::FullFeature);
    Ok(())
}
