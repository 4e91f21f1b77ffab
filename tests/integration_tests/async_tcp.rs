// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_engine::{
    AsyncSession, SessionState,
    client::ScsiTask,
    control_block::{
        cdb::RwFlags, datain::DataIn, read::build_read16, read_capacity::build_read_capacity16,
        test_unit_ready::build_test_unit_ready, write::build_write16,
    },
    models::task_mgmt::common::{TaskMgmtFunction, TaskMgmtResponse},
};

use crate::integration_tests::common::{
    BLOCK_LEN, BLOCKS, MockServer, MockTarget, load_config, lock, pattern,
};

#[tokio::test]
async fn async_session_over_tcp() -> Result<()> {
    let server = MockServer::start(MockTarget::default())?;
    let mut cfg = load_config()?;
    cfg.login.transport.target_address = server.addr.clone();
    let lun = cfg.login.transport.lun;

    let mut s = AsyncSession::new(cfg);
    s.login().await?;
    assert_eq!(s.session().state(), SessionState::FullFeature);
    assert!(s.session().get_fd().is_some());

    let rc = s
        .execute(ScsiTask::read(lun, build_read_capacity16(32), 32))
        .await?;
    let DataIn::ReadCapacity16(cap) = rc.datain()? else {
        panic!("expected READ CAPACITY(16) data");
    };
    assert_eq!(cap.max_lba, BLOCKS - 1);

    let data = vec![0xA5; 3 * BLOCK_LEN as usize];
    let w = s
        .execute(ScsiTask::write(lun, build_write16(7, 3, RwFlags::empty())?, data.clone()))
        .await?;
    assert!(w.is_good());

    // several commands in flight at once
    let outcomes = s
        .execute_all(vec![
            ScsiTask::read(lun, build_read16(7, 3, RwFlags::empty())?, 3 * BLOCK_LEN),
            ScsiTask::read(lun, build_read16(10, 1, RwFlags::empty())?, BLOCK_LEN),
            ScsiTask::no_data(lun, build_test_unit_ready()),
        ])
        .await?;
    assert_eq!(outcomes.len(), 3);
    let results: Vec<_> = outcomes
        .into_iter()
        .map(|o| o.expect("task outcome").into_scsi().expect("scsi reply"))
        .collect();
    assert_eq!(results[0].data, data);
    assert_eq!(results[1].data, pattern(10, BLOCK_LEN as usize));
    assert!(results[2].is_good());

    assert_eq!(s.nop(b"tcp".to_vec()).await?, b"tcp");
    assert_eq!(
        s.task_mgmt(TaskMgmtFunction::LogicalUnitReset, lun).await?,
        TaskMgmtResponse::FunctionComplete
    );

    s.logout().await?;
    assert_eq!(s.session().state(), SessionState::Closed);
    assert_eq!(lock(&server.target).logouts, 1);
    Ok(())
}
