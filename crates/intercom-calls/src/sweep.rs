// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task that times out calls nobody answered.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::service::CallService;

/// Spawns the stale-ringing sweep. Returns `None` when `interval` is zero.
///
/// The task runs until `cancel` fires.
pub fn spawn_sweeper(
    service: Arc<CallService>,
    interval: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        info!("stale call sweeper disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately.
        ticker.tick().await;
        info!(interval_secs = interval.as_secs(), "stale call sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match service.sweep_unanswered().await {
                        Ok(ended) if ended.is_empty() => debug!("sweep found no stale calls"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "stale call sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("stale call sweeper shutting down");
                    break;
                }
            }
        }
    }))
}
