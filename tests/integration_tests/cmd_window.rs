// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use iscsi_engine::{
    IscsiError, SessionState,
    client::{Completion, ScsiTask, TaskOutcome},
    control_block::test_unit_ready::build_test_unit_ready,
    error::TaskError,
    models::task_mgmt::common::TaskMgmtFunction,
};

use crate::integration_tests::common::{MockTarget, load_config, lock, logged_in, mock_session};

type Outcomes = Arc<Mutex<Vec<(usize, TaskOutcome)>>>;

fn recorder(outcomes: &Outcomes, n: usize) -> Completion {
    let outcomes = outcomes.clone();
    Completion::callback(move |o| outcomes.lock().expect("outcomes").push((n, o)))
}

#[test]
fn commands_wait_for_max_cmd_sn() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let target = {
        let mut t = MockTarget::default();
        t.window = 1;
        t.hold_scsi = true;
        t.shared()
    };
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;
    assert_eq!(s.max_cmd_sn(), s.cmd_sn(), "window of one command");

    let outcomes: Outcomes = Arc::default();
    for n in 0..3 {
        s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), recorder(&outcomes, n))?;
    }
    assert_eq!(s.outstanding(), 3);
    s.service(false, true)?;

    {
        let t = lock(&target);
        assert_eq!(t.commands.len(), 1, "only the first command fits the window");
        assert_eq!(t.held_count(), 1);
    }

    // every status reopens the window by one
    lock(&target).release_held();
    s.pump_until("window drain", |_| outcomes.lock().expect("outcomes").len() == 3)?;

    let t = lock(&target);
    assert_eq!(t.window_violations, 0);
    let sns: Vec<u32> = t.commands.iter().map(|c| c.cmd_sn).collect();
    assert_eq!(sns, vec![sns[0], sns[0].wrapping_add(1), sns[0].wrapping_add(2)]);

    let got = outcomes.lock().expect("outcomes");
    let order: Vec<usize> = got.iter().map(|(n, _)| *n).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert!(got.iter().all(|(_, o)| matches!(o, Ok(r) if r.clone().into_scsi().is_some_and(|r| r.is_good()))));
    assert_eq!(s.outstanding(), 0);
    Ok(())
}

#[test]
fn queue_depth_limits_outstanding_tasks() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.runtime.queue_depth = 2;
    let lun = cfg.login.transport.lun;
    let target = {
        let mut t = MockTarget::default();
        t.hold_scsi = true;
        t.shared()
    };
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;

    let outcomes: Outcomes = Arc::default();
    s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), recorder(&outcomes, 0))?;
    s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), recorder(&outcomes, 1))?;
    let err = s
        .send_task(ScsiTask::no_data(lun, build_test_unit_ready()), recorder(&outcomes, 2))
        .expect_err("third task over the limit");
    assert!(matches!(err, IscsiError::QueueFull { limit: 2 }));

    lock(&target).release_held();
    s.pump_until("held tasks", |_| outcomes.lock().expect("outcomes").len() == 2)?;
    // room again
    assert!(s.test_unit_ready_sync(lun)?.is_good());
    Ok(())
}

#[test]
fn timed_out_tasks_give_back_their_queue_slots() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.runtime.queue_depth = 2;
    cfg.runtime.timeout_io = Duration::from_millis(50);
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).hold_scsi = true;

    for _ in 0..2 {
        let err = s.test_unit_ready_sync(lun).expect_err("target never answers");
        assert!(matches!(err, IscsiError::Timeout("scsi task")), "got {err:?}");
    }
    assert_eq!(s.state(), SessionState::FullFeature);

    lock(&target).hold_scsi = false;
    assert!(s.test_unit_ready_sync(lun)?.is_good());
    // both expired commands were aborted at the target
    assert_eq!(lock(&target).tmfs, vec![TaskMgmtFunction::AbortTask; 2]);
    assert_eq!(lock(&target).held_count(), 0);
    assert_eq!(s.outstanding(), 0);
    Ok(())
}

#[test]
fn timeout_expires_only_the_awaited_task() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.runtime.timeout_io = Duration::from_millis(50);
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).hold_scsi = true;

    let outcomes: Outcomes = Arc::default();
    s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), recorder(&outcomes, 0))?;
    let err = s.test_unit_ready_sync(lun).expect_err("second command held too");
    assert!(matches!(err, IscsiError::Timeout(_)), "got {err:?}");

    // only the command waited on expired; the earlier one is still pending
    assert!(outcomes.lock().expect("outcomes").is_empty());
    assert_eq!(s.state(), SessionState::FullFeature);
    assert_eq!(s.nop_sync(b"ping".to_vec())?, b"ping");

    lock(&target).release_held();
    s.pump_until("held task", |_| outcomes.lock().expect("outcomes").len() == 1)?;
    let got = outcomes.lock().expect("outcomes");
    assert!(matches!(&got[0], (0, Ok(_))), "got {:?}", got[0]);
    Ok(())
}

#[test]
fn stalled_transmit_fails_the_connection() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.runtime.timeout_io = Duration::from_millis(50);
    let lun = cfg.login.transport.lun;
    let (mut s, target) = logged_in(cfg)?;
    lock(&target).stall_writes = true;

    let outcomes: Outcomes = Arc::default();
    s.send_task(ScsiTask::no_data(lun, build_test_unit_ready()), recorder(&outcomes, 0))?;
    let err = s.test_unit_ready_sync(lun).expect_err("nothing reaches the target");
    assert!(matches!(err, IscsiError::Timeout(_)), "got {err:?}");

    // Reconnect: Never
    assert_eq!(s.state(), SessionState::Dead);
    assert_eq!(s.outstanding(), 0);
    assert_eq!(
        *outcomes.lock().expect("outcomes"),
        vec![(0, Err(TaskError::ConnectionLost))]
    );
    Ok(())
}
