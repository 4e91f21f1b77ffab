// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_engine::{
    SessionState,
    control_block::{
        datain::DataIn, inquiry::build_inquiry_standard, read_capacity::build_read_capacity10,
        report_luns::build_report_luns,
    },
    client::{Residual, ScsiTask},
};

use crate::integration_tests::common::{
    BLOCK_LEN, BLOCKS, MockTarget, TARGET_NAME, load_config, lock, logged_in, mock_session,
};

#[test]
fn login_negotiates_and_enters_full_feature() -> Result<()> {
    let cfg = load_config()?;
    let target = {
        let mut t = MockTarget::default();
        t.mrdsl = 16_384;
        t.max_burst = 131_072;
        t.shared()
    };
    let (mut s, dialed) = mock_session(cfg, &target);
    assert_eq!(s.state(), SessionState::Created);

    s.login_sync()?;

    assert_eq!(s.state(), SessionState::FullFeature);
    assert_ne!(s.tsih(), 0);
    assert_eq!(s.isid()[0] & 0xC0, 0, "OUI-format ISID");
    let p = s.negotiated();
    assert_eq!(p.max_xmit_data_segment_length, 16_384);
    assert_eq!(p.max_recv_data_segment_length, 262_144);
    assert_eq!(p.max_burst_length, 131_072);
    assert_eq!(p.first_burst_length, 65_536);
    assert!(p.initial_r2t && p.immediate_data);
    assert!(!p.header_digest && !p.data_digest);

    let t = lock(&target);
    assert_eq!(dialed.lock().expect("dialed").as_slice(), ["127.0.0.1:3260"]);
    assert_eq!(t.logins.len(), 2, "security then operational request");
    assert!(t.logins.iter().all(|l| l.tsih == 0 && l.isid == s.isid()));
    // window opens at the CmdSN the login carried
    assert_eq!(s.cmd_sn(), t.logins[0].cmd_sn);
    Ok(())
}

#[test]
fn inventory_commands_decode() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, _target) = logged_in(cfg)?;

    let rc = s.read_capacity16_sync(lun)?;
    assert!(rc.is_good());
    let DataIn::ReadCapacity16(cap) = rc.datain()? else {
        panic!("expected READ CAPACITY(16) data");
    };
    assert_eq!(cap.max_lba, BLOCKS - 1);
    assert_eq!(cap.block_len, BLOCK_LEN);

    let rc10 = s.execute_sync(ScsiTask::read(lun, build_read_capacity10(), 8))?;
    let DataIn::ReadCapacity10(cap10) = rc10.datain()? else {
        panic!("expected READ CAPACITY(10) data");
    };
    assert_eq!(u64::from(cap10.max_lba), BLOCKS - 1);

    let inq = s.execute_sync(ScsiTask::read(lun, build_inquiry_standard(96), 96))?;
    assert!(inq.is_good());
    assert_eq!(inq.data.len(), 36);
    assert_eq!(inq.residual, Some(Residual::Underflow(60)));
    let DataIn::Inquiry(std) = inq.datain()? else {
        panic!("expected standard INQUIRY data");
    };
    assert_eq!(std.vendor_id, "MOCKTGT");
    assert_eq!(std.product_id, "RAM DISK");
    assert!(std.rmb);

    let rl = s.execute_sync(ScsiTask::read(lun, build_report_luns(0, 256), 256))?;
    let DataIn::ReportLuns(list) = rl.datain()? else {
        panic!("expected REPORT LUNS data");
    };
    assert_eq!(list.lun_ids(), vec![0, 1]);
    assert!(!list.is_truncated());
    Ok(())
}

#[test]
fn logout_closes_session() -> Result<()> {
    let (mut s, target) = logged_in(load_config()?)?;
    s.logout_sync()?;
    assert_eq!(s.state(), SessionState::Closed);
    assert_eq!(lock(&target).logouts, 1);

    // a closed session can log in again on a fresh connection
    s.login_sync()?;
    assert_eq!(s.state(), SessionState::FullFeature);
    assert_eq!(lock(&target).connections, 2);
    Ok(())
}

#[test]
fn target_name_comes_from_config() -> Result<()> {
    let (s, _t) = logged_in(load_config()?)?;
    assert_eq!(s.target().target_name, TARGET_NAME);
    assert_eq!(s.config().login.identity.target_name, TARGET_NAME);
    Ok(())
}
