// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic removal of expired OAuth states.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dbot_core::Repo;
use dbot_core::domain::OAuthState;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often expired states are purged.
pub const OAUTH_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Spawn a task that purges OAuth states older than their TTL every
/// `interval` until `cancel` fires.
pub fn spawn_oauth_gc(
    repo: Arc<dyn Repo>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let before = Utc::now() - OAuthState::ttl();
                    match repo.purge_oauth_states(before).await {
                        Ok(0) => {}
                        Ok(n) => debug!(removed = n, "expired OAuth states purged"),
                        Err(e) => warn!(error = %e, "failed to purge OAuth states"),
                    }
                }
            }
        }
        debug!("OAuth state GC stopped");
    })
}
