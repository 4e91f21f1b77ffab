// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, time::Duration};

use anyhow::Result;
use iscsi_engine::cfg::{
    cli::resolve_config_path,
    config::{AuthConfig, Config, login_keys_operational, login_keys_security},
    enums::{Digest, ReconnectPolicy, SessionType, UnitAttentionPolicy, YesNo},
    logger::{LogOutput, LoggerConfig},
};

fn base_yaml() -> Result<String> {
    Ok(fs::read_to_string(resolve_config_path("tests/config.yaml")?)?)
}

fn keys(items: &[(String, String)]) -> Vec<&str> {
    items.iter().map(|(k, _)| k.as_str()).collect()
}

fn value<'a>(items: &'a [(String, String)], key: &str) -> Option<&'a str> {
    items.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

#[test]
fn test_load_test_config() -> Result<()> {
    let cfg = resolve_config_path("tests/config.yaml").and_then(Config::load_from_file)?;

    assert_eq!(cfg.login.identity.session_type, SessionType::Normal);
    assert_eq!(cfg.login.identity.target_name, "iqn.2025-08.example:disk0");
    assert!(matches!(cfg.login.auth, AuthConfig::None));
    assert_eq!(cfg.login.integrity.header_digest, Digest::None);
    assert_eq!(cfg.login.write_flow.immediate_data, YesNo::Yes);
    assert_eq!(cfg.login.timers.default_time2wait, Duration::from_secs(2));
    assert_eq!(cfg.login.transport.target_address, "127.0.0.1:3260");
    assert_eq!(cfg.login.transport.lun, 1);

    assert_eq!(cfg.runtime.queue_depth, 32);
    assert_eq!(cfg.runtime.timeout_io, Duration::from_secs(5));
    assert_eq!(cfg.runtime.reconnect, ReconnectPolicy::Never);
    assert_eq!(cfg.runtime.unit_attention, UnitAttentionPolicy::Surface);
    assert_eq!(cfg.runtime.max_pdu_data, 1 << 20);
    Ok(())
}

#[test]
fn test_invalid_values_are_refused() -> Result<()> {
    let yaml = base_yaml()?;

    let burst = yaml.replace("FirstBurstLength: 65536", "FirstBurstLength: 524288");
    assert!(Config::from_yaml_str(&burst).is_err());

    let tiny = yaml.replace(
        "MaxRecvDataSegmentLength: 262144",
        "MaxRecvDataSegmentLength: 100",
    );
    assert!(Config::from_yaml_str(&tiny).is_err());

    let no_target = yaml.replace("TargetName: iqn.2025-08.example:disk0", "TargetName: \"\"");
    assert!(Config::from_yaml_str(&no_target).is_err());

    let no_queue = yaml.replace("QueueDepth: 32", "QueueDepth: 0");
    assert!(Config::from_yaml_str(&no_queue).is_err());

    let bad_digest = yaml.replace("HeaderDigest: None", "HeaderDigest: MD5");
    assert!(Config::from_yaml_str(&bad_digest).is_err());
    Ok(())
}

#[test]
fn test_discovery_session_is_normalized() -> Result<()> {
    let yaml = base_yaml()?
        .replace("SessionType: Normal", "SessionType: Discovery")
        .replace("TargetName: iqn.2025-08.example:disk0", "TargetName: \"\"")
        .replace("MaxConnections: 1", "MaxConnections: 4")
        .replace("ErrorRecoveryLevel: 0", "ErrorRecoveryLevel: 2");
    let cfg = Config::from_yaml_str(&yaml)?;

    assert!(cfg.login.identity.session_type.is_discovery());
    assert_eq!(cfg.login.limits.max_connections, 1);
    assert_eq!(cfg.login.recovery.error_recovery_level, 0);

    let security = login_keys_security(&cfg.login);
    assert_eq!(
        keys(&security),
        ["AuthMethod", "InitiatorAlias", "InitiatorName", "SessionType"]
    );
    assert_eq!(value(&security, "SessionType"), Some("Discovery"));

    let operational = login_keys_operational(&cfg.login);
    assert_eq!(
        keys(&operational),
        ["DataDigest", "HeaderDigest", "MaxRecvDataSegmentLength"]
    );
    Ok(())
}

#[test]
fn test_runtime_policies_from_yaml() -> Result<()> {
    let yaml = base_yaml()?
        .replace("Reconnect: Never", "Reconnect: Reconnect")
        .replace("Policy: Surface", "Policy: Retry\n    Max: 3")
        .replace("MaxPduData: 1048576", "MaxPduData: 4096");
    let cfg = Config::from_yaml_str(&yaml)?;

    assert_eq!(cfg.runtime.reconnect, ReconnectPolicy::Reconnect);
    assert_eq!(cfg.runtime.unit_attention, UnitAttentionPolicy::Retry { max: 3 });
    // never below what we advertise as MaxRecvDataSegmentLength
    assert_eq!(cfg.runtime.max_pdu_data, 262_144);
    Ok(())
}

#[test]
fn test_operational_keys_for_normal_session() -> Result<()> {
    let yaml = base_yaml()?
        .replace(
            "AuthMethod: None",
            "AuthMethod: CHAP\n    username: alice\n    secret: s3cr3t-s3cr3t",
        )
        .replace("HeaderDigest: None", "HeaderDigest: CRC32C")
        .replace(
            "  transport:",
            "  extensions:\n    X-com.example.Mode: fast\n    Bogus: nope\n  transport:",
        );
    let cfg = Config::from_yaml_str(&yaml)?;

    let AuthConfig::Chap(chap) = &cfg.login.auth else {
        panic!("expected CHAP credentials");
    };
    assert_eq!(chap.username, "alice");

    let security = login_keys_security(&cfg.login);
    assert_eq!(value(&security, "AuthMethod"), Some("CHAP,None"));
    assert_eq!(
        value(&security, "TargetName"),
        Some("iqn.2025-08.example:disk0")
    );

    let operational = login_keys_operational(&cfg.login);
    assert_eq!(value(&operational, "HeaderDigest"), Some("CRC32C,None"));
    assert_eq!(value(&operational, "DataDigest"), Some("None"));
    assert_eq!(value(&operational, "FirstBurstLength"), Some("65536"));
    assert_eq!(value(&operational, "InitialR2T"), Some("Yes"));
    assert_eq!(value(&operational, "DefaultTime2Wait"), Some("2"));
    assert_eq!(value(&operational, "MaxConnections"), Some("1"));
    assert_eq!(
        operational.last().map(|(k, v)| (k.as_str(), v.as_str())),
        Some(("X-com.example.Mode", "fast"))
    );
    assert_eq!(value(&operational, "Bogus"), None);
    Ok(())
}

#[test]
fn test_logger_config() -> Result<()> {
    let cfg = resolve_config_path("tests/config_logger.yaml")
        .and_then(LoggerConfig::load_from_file)?;
    assert_eq!(cfg.logger.output, LogOutput::Stdout);
    assert!(cfg.logger.is_show_line);
    assert!(cfg.logger.file.is_none());

    assert!(LoggerConfig::from_yaml_str("logger:\n  level: debug\n  output: file\n").is_err());
    Ok(())
}
