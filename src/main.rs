// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail};
use iscsi_engine::{
    cfg::{
        cli::{ProbeArgs, resolve_config_path},
        config::Config,
        enums::SessionType,
        logger::init_logger,
    },
    client::{AsyncSession, ScsiTask},
    control_block::{
        cdb::RwFlags,
        datain::DataIn,
        read::build_read16,
        read_capacity::build_read_capacity16,
        test_unit_ready::build_test_unit_ready,
    },
};
use tokio::main;
use tracing::{info, warn};

#[main]
async fn main() -> Result<()> {
    let args = ProbeArgs::parse(std::env::args().skip(1))?;
    let _init_logger = init_logger(&args.logger)?;

    let mut config = resolve_config_path(&args.config)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;
    if let Some(p) = &args.portal {
        config.login.transport.target_address = p.clone();
    }
    if let Some(t) = &args.target {
        config.login.identity.target_name = t.clone();
    }
    if let Some(l) = args.lun {
        config.login.transport.lun = l;
    }

    if args.discover {
        config.login.identity.session_type = SessionType::Discovery;
        config.validate_and_normalize()?;
        return discover(config).await;
    }
    probe(config).await
}

async fn discover(config: Config) -> Result<()> {
    let mut s = AsyncSession::new(config);
    s.login().await?;
    for t in s.send_targets().await? {
        info!(name = %t.name, addresses = ?t.addresses, "discovered");
    }
    s.logout().await?;
    Ok(())
}

async fn probe(config: Config) -> Result<()> {
    let lun = config.login.transport.lun;
    let mut s = AsyncSession::new(config);
    s.login().await?;
    info!(tsih = s.session().tsih(), params = ?s.session().negotiated(), "logged in");

    let tur = s
        .execute(ScsiTask::no_data(lun, build_test_unit_ready()))
        .await?;
    if !tur.is_good() {
        // first command after login often reports a unit attention
        warn!(status = ?tur.status, sense = ?tur.asc_ascq(), "TEST UNIT READY");
    }

    let rc = s
        .execute(ScsiTask::read(lun, build_read_capacity16(32), 32))
        .await?;
    let DataIn::ReadCapacity16(cap) = rc.datain()? else {
        bail!("unexpected READ CAPACITY(16) payload");
    };
    info!(max_lba = cap.max_lba, block_len = cap.block_len, "capacity");

    let read = s
        .execute(ScsiTask::read(
            lun,
            build_read16(cap.max_lba, 1, RwFlags::empty())?,
            cap.block_len,
        ))
        .await?;
    info!(
        status = ?read.status,
        bytes = read.data.len(),
        head = %hex::encode(&read.data[..read.data.len().min(16)]),
        "last block"
    );

    s.logout().await?;
    info!("done");
    Ok(())
}
