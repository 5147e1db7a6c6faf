// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-workspace counters, flushed to the repository once per minute.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dbot_core::Repo;
use dbot_core::domain::{Statistics, WorkReply};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// In-memory statistics keyed by internal team id.
///
/// Flushing swaps in a fresh map under the lock and writes the old one
/// without holding it.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Mutex<HashMap<String, Statistics>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a message that produced no work (command or no indicator).
    pub async fn record_message(&self, team: &str) {
        let mut counters = self.counters.lock().await;
        counters
            .entry(team.to_string())
            .or_insert_with(|| Statistics::new(team))
            .messages += 1;
    }

    pub async fn record_reply(&self, team: &str, reply: &WorkReply) {
        let mut counters = self.counters.lock().await;
        counters
            .entry(team.to_string())
            .or_insert_with(|| Statistics::new(team))
            .record_reply(reply);
    }

    /// Current counters for `team` without resetting them.
    pub async fn snapshot(&self, team: &str) -> Option<Statistics> {
        self.counters.lock().await.get(team).cloned()
    }

    /// Take every counter, leaving an empty map behind.
    pub async fn take(&self) -> HashMap<String, Statistics> {
        std::mem::take(&mut *self.counters.lock().await)
    }

    /// Write the accumulated counters.
    ///
    /// A team whose write fails has its counts folded back into the live map
    /// and retried on the next flush.
    pub async fn flush(&self, repo: &Arc<dyn Repo>) -> usize {
        let now = Utc::now();
        let mut written = 0;
        for (team, mut stats) in self.take().await {
            if stats.is_empty() {
                continue;
            }
            stats.ts = Some(now);
            match repo.update_statistics(&stats).await {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(team = %team, error = %e, "unable to store statistics");
                    self.restore(team, &stats).await;
                }
            }
        }
        debug!(teams = written, "statistics flushed");
        written
    }

    async fn restore(&self, team: String, stats: &Statistics) {
        let mut counters = self.counters.lock().await;
        counters
            .entry(team)
            .or_insert_with_key(|team| Statistics::new(team.as_str()))
            .merge(stats);
    }
}
