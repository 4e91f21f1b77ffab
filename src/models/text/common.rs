// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Text-format key/value segments shared by Login and Text PDUs
//! (RFC 7143 § 6): `key=value` pairs, each terminated by a NUL byte.

use tracing::warn;

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextFlags: u8 {
        const FINAL     = 0b1000_0000; // bit7
        const CONTINUE  = 0b0100_0000; // bit6
    }
}

/// Serializes pairs in the given order, NUL-terminating every pair.
pub fn build_kv<K, V, I>(items: I) -> Vec<u8>
where
    K: AsRef<str>,
    V: AsRef<str>,
    I: IntoIterator<Item = (K, V)>,
{
    let mut out = Vec::new();
    for (k, v) in items {
        out.extend_from_slice(k.as_ref().as_bytes());
        out.push(b'=');
        out.extend_from_slice(v.as_ref().as_bytes());
        out.push(0);
    }
    out
}

/// Splits a text segment into pairs, preserving order and duplicates.
///
/// Empty entries (padding, double NULs) are skipped; an entry without `=`
/// is logged and dropped. A missing final NUL is tolerated.
pub fn parse_kv(data: &[u8]) -> Vec<(String, String)> {
    data.split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let text = String::from_utf8_lossy(entry);
            match text.split_once('=') {
                Some((k, v)) => Some((k.to_string(), v.to_string())),
                None => {
                    warn!(entry = %text, "ignoring text entry without '='");
                    None
                },
            }
        })
        .collect()
}

/// Returns the last value for `key`, if any.
pub fn find_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
