// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_engine::{
    client::ScsiTask,
    cfg::enums::YesNo,
    control_block::{
        cdb::RwFlags, read::build_read16, synchronize_cache::build_synchronize_cache10,
        verify::{build_verify10, build_verify16},
    },
    models::{
        common::RESERVED_TAG,
        data::sense_data::{SenseKey, asc},
    },
};

use crate::integration_tests::common::{
    BLOCK_LEN, BLOCKS, MockTarget, load_config, lock, logged_in, mock_session, pattern,
};

fn block_pattern(seed: u8, blocks: usize) -> Vec<u8> {
    (0..blocks * BLOCK_LEN as usize)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect()
}

#[test]
fn read_spans_several_data_in_pdus() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.flow.max_recv_data_segment_length = 4096;
    let lun = cfg.login.transport.lun;
    let target = MockTarget::default().shared();
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;

    let r = s.read16_sync(lun, 10, 24, BLOCK_LEN)?;
    assert!(r.is_good());
    assert_eq!(r.residual, None);
    let want: Vec<u8> = (10..34).flat_map(|lba| pattern(lba, BLOCK_LEN as usize)).collect();
    assert_eq!(r.data, want);
    Ok(())
}

#[test]
fn write_then_read_back_through_r2t() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.flow.first_burst_length = 4096;
    let lun = cfg.login.transport.lun;
    let target = {
        let mut t = MockTarget::default();
        // small PDUs and bursts force several R2Ts and Data-Outs
        t.mrdsl = 1024;
        t.max_burst = 8192;
        t.shared()
    };
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;
    assert_eq!(s.negotiated().max_xmit_data_segment_length, 1024);

    let data = block_pattern(0x40, 64);
    let w = s.write16_sync(lun, 100, BLOCK_LEN, data.clone())?;
    assert!(w.is_good(), "write status {:?}", w.status);

    {
        let t = lock(&target);
        // 1 KiB immediate, the remaining 31 KiB in 8 KiB bursts
        assert_eq!(t.r2ts, 4);
        assert!(t.data_outs.iter().all(|(_, ttt, len)| *ttt != RESERVED_TAG && *len <= 1024));
        let moved: usize = t.data_outs.iter().map(|(_, _, len)| len).sum();
        assert_eq!(moved + 1024, data.len());
    }

    let r = s.read16_sync(lun, 100, 64, BLOCK_LEN)?;
    assert!(r.is_good());
    assert_eq!(r.data, data);

    // neighbours untouched
    let before = s.read16_sync(lun, 99, 1, BLOCK_LEN)?;
    assert_eq!(before.data, pattern(99, BLOCK_LEN as usize));

    let sync = s.execute_sync(ScsiTask::no_data(lun, build_synchronize_cache10(0, 0, false)?))?;
    assert!(sync.is_good());
    Ok(())
}

#[test]
fn write_without_immediate_data_waits_for_r2t() -> Result<()> {
    let mut cfg = load_config()?;
    cfg.login.write_flow.immediate_data = YesNo::No;
    let lun = cfg.login.transport.lun;
    let target = MockTarget::default().shared();
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;
    assert!(!s.negotiated().immediate_data);

    let data = block_pattern(7, 4);
    assert!(s.write16_sync(lun, 0, BLOCK_LEN, data.clone())?.is_good());
    assert_eq!(lock(&target).r2ts, 1);
    assert_eq!(s.read16_sync(lun, 0, 4, BLOCK_LEN)?.data, data);
    Ok(())
}

#[test]
fn lba_out_of_range_is_illegal_request() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let target = MockTarget::default().shared();
    let (mut s, _) = mock_session(cfg, &target);
    s.login_sync()?;

    let v = s.execute_sync(ScsiTask::no_data(lun, build_verify16(BLOCKS - 1, 2, false)?))?;
    assert!(!v.is_good());
    assert_eq!(v.sense_key(), Some(SenseKey::IllegalRequest));
    assert_eq!(v.asc_ascq(), Some(asc::LBA_OUT_OF_RANGE));

    let ok = s.execute_sync(ScsiTask::no_data(lun, build_verify16(BLOCKS - 1, 1, false)?))?;
    assert!(ok.is_good());

    let r = s.read16_sync(lun, BLOCKS, 1, BLOCK_LEN)?;
    assert_eq!(r.sense_key(), Some(SenseKey::IllegalRequest));
    assert_eq!(r.asc_ascq(), Some(asc::LBA_OUT_OF_RANGE));
    assert!(r.data.is_empty());

    // session unaffected by a CHECK CONDITION
    assert!(s.test_unit_ready_sync(lun)?.is_good());
    Ok(())
}

#[test]
fn ranges_past_the_last_block_are_all_rejected() -> Result<()> {
    let cfg = load_config()?;
    let lun = cfg.login.transport.lun;
    let (mut s, _target) = logged_in(cfg)?;

    let mut cdbs = Vec::new();
    for n in 1..=256u32 {
        let n64 = u64::from(n);
        // all blocks but the last one exist
        cdbs.push(build_verify16(BLOCKS - n64 + 1, n, false)?);
        // none exist
        cdbs.push(build_verify16(BLOCKS + n64 - 1, n, false)?);
    }
    for lba in [1 << 31, u64::from(u32::MAX), 1 << 63, u64::MAX - 1, u64::MAX] {
        cdbs.push(build_verify16(lba, 1, false)?);
    }
    for lba in [BLOCKS, 1 << 31, u64::from(u32::MAX)] {
        cdbs.push(build_verify10(lba, 1, false)?);
    }

    for cdb in cdbs {
        let bytes = cdb.as_bytes().to_vec();
        let r = s.execute_sync(ScsiTask::no_data(lun, cdb))?;
        assert!(!r.is_good(), "{bytes:02x?}");
        assert_eq!(r.sense_key(), Some(SenseKey::IllegalRequest), "{bytes:02x?}");
        assert_eq!(r.asc_ascq(), Some(asc::LBA_OUT_OF_RANGE), "{bytes:02x?}");
    }

    // the same sizes fit when they end on the last block
    for n in [1u32, 255, 256] {
        let lba = BLOCKS - u64::from(n);
        assert!(s.execute_sync(ScsiTask::no_data(lun, build_verify16(lba, n, false)?))?.is_good());
    }
    assert!(s.execute_sync(ScsiTask::no_data(lun, build_verify10(BLOCKS - 1, 1, false)?))?.is_good());
    Ok(())
}

#[test]
fn zero_length_read_completes_with_status_only() -> Result<()> {
    let (mut s, target) = logged_in(load_config()?)?;
    let sent = lock(&target).commands.len();
    let r = s.execute_sync(ScsiTask::read(1, build_read16(0, 0, RwFlags::empty())?, 0))?;
    assert!(r.is_good());
    assert!(r.data.is_empty());
    assert_eq!(lock(&target).commands.len(), sent + 1);
    Ok(())
}
