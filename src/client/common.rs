// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{IscsiError, Result};

/// Runs `fut` under a deadline, giving up early when `cancel` fires.
pub(super) async fn io_with_timeout<F, T>(
    label: &'static str,
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(IscsiError::Cancelled(label)),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(v) => v,
                Err(_) => Err(IscsiError::Timeout(label)),
            }
        }
    }
}
