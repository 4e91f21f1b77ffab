// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CHAP (MD5) helpers for the security stage, RFC 7143 § 12.1.3.

use md5::{Digest, Md5};

use crate::{error::LoginError, models::text::common::find_value};

/// CHAP algorithm identifier for MD5.
pub const CHAP_A_MD5: &str = "5";

/// CHAP_R = MD5(one-octet CHAP_I || secret || challenge), upper-case hex
/// with a `0x` prefix.
pub fn calc_chap_r_hex(id: u8, secret: &[u8], challenge: &[u8]) -> String {
    let mut h = Md5::new();
    h.update([id]);
    h.update(secret);
    h.update(challenge);
    format!("0x{}", hex::encode_upper(h.finalize()))
}

/// Extracts CHAP_I and the decoded CHAP_C from a target response and checks
/// the algorithm the target chose.
pub fn parse_chap_challenge(pairs: &[(String, String)]) -> Result<(u8, Vec<u8>), LoginError> {
    let bad = |msg: String| LoginError::Authentication(msg);

    match find_value(pairs, "CHAP_A") {
        Some(CHAP_A_MD5) | None => {},
        Some(other) => return Err(bad(format!("unsupported CHAP_A={other}"))),
    }
    let id = find_value(pairs, "CHAP_I")
        .ok_or_else(|| bad("missing CHAP_I".into()))?
        .trim()
        .parse::<u8>()
        .map_err(|e| bad(format!("invalid CHAP_I: {e}")))?;
    let raw = find_value(pairs, "CHAP_C").ok_or_else(|| bad("missing CHAP_C".into()))?;
    let raw = raw.trim();
    let hex_str = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if hex_str.len() % 2 != 0 {
        return Err(bad(format!(
            "CHAP_C hex length must be even, got {}",
            hex_str.len()
        )));
    }
    let challenge =
        hex::decode(hex_str).map_err(|e| bad(format!("failed to decode CHAP_C: {e}")))?;
    Ok((id, challenge))
}
