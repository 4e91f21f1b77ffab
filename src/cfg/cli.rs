// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

/// Command line of the `iscsi-probe` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeArgs {
    pub config: String,
    pub logger: String,
    /// Overrides `TargetAddress` from the config.
    pub portal: Option<String>,
    /// Overrides `TargetName` from the config.
    pub target: Option<String>,
    pub lun: Option<u16>,
    /// Run SendTargets discovery instead of the disk probe.
    pub discover: bool,
}

impl Default for ProbeArgs {
    fn default() -> Self {
        Self {
            config: "tests/config.yaml".into(),
            logger: "tests/config_logger.yaml".into(),
            portal: None,
            target: None,
            lun: None,
            discover: false,
        }
    }
}

pub const USAGE: &str = "usage: iscsi-probe [--config PATH] [--logger PATH] \
                         [--portal HOST[:PORT]] [--target IQN] [--lun N] [--discover]";

impl ProbeArgs {
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self::default();
        let mut it = args.into_iter().map(Into::into);
        while let Some(arg) = it.next() {
            let mut value = |name: &str| {
                it.next()
                    .with_context(|| format!("{name} needs a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--config" => out.config = value("--config")?,
                "--logger" => out.logger = value("--logger")?,
                "--portal" => out.portal = Some(value("--portal")?),
                "--target" => out.target = Some(value("--target")?),
                "--lun" => {
                    let v = value("--lun")?;
                    out.lun = Some(v.parse().with_context(|| format!("bad LUN {v:?}"))?);
                },
                "--discover" => out.discover = true,
                other => bail!("unknown argument {other:?}\n{USAGE}"),
            }
        }
        Ok(out)
    }
}
