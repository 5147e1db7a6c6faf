// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-workspace memory of recently forwarded messages.

use std::collections::HashMap;
use std::time::Duration;

use dbot_core::domain::{RequestKind, WorkRequest};
use tokio::time::Instant;

/// How long a forwarded message suppresses its repeats.
pub const WINDOW: Duration = Duration::from_secs(5 * 60);
/// Processed-message count between eviction checks.
pub const SWEEP_EVERY: u64 = 1000;

/// Decides whether a request is new within the window.
///
/// A request is keyed twice: by its message id and by its content (text or
/// file plus author). Either key seen within the window makes it a repeat.
#[derive(Debug)]
pub struct Deduper {
    seen: HashMap<String, HashMap<String, Instant>>,
    window: Duration,
    sweep_every: u64,
    processed: u64,
    last_sweep: Instant,
}

impl Default for Deduper {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduper {
    pub fn new() -> Self {
        Self::with_limits(WINDOW, SWEEP_EVERY)
    }

    pub fn with_limits(window: Duration, sweep_every: u64) -> Self {
        Self {
            seen: HashMap::new(),
            window,
            sweep_every,
            processed: 0,
            last_sweep: Instant::now(),
        }
    }

    /// Record `request` and return `true` when it should be forwarded.
    pub fn admit(&mut self, request: &WorkRequest, now: Instant) -> bool {
        self.processed += 1;
        if self.processed >= self.sweep_every {
            self.processed = 0;
            if now.duration_since(self.last_sweep) >= self.window {
                self.sweep(now);
            }
        }

        let keys = keys(request);
        if keys.is_empty() {
            return false;
        }
        let window = self.window;
        let team = self.seen.entry(request.context.team.clone()).or_default();
        let repeat = keys.iter().any(|k| {
            team.get(k)
                .is_some_and(|first| now.duration_since(*first) < window)
        });
        if repeat {
            return false;
        }
        for key in keys {
            team.insert(key, now);
        }
        true
    }

    /// Drop every entry older than the window.
    pub fn sweep(&mut self, now: Instant) {
        let window = self.window;
        for entries in self.seen.values_mut() {
            entries.retain(|_, first| now.duration_since(*first) <= window);
        }
        self.seen.retain(|_, entries| !entries.is_empty());
        self.last_sweep = now;
    }

    /// Number of remembered keys across all workspaces.
    pub fn len(&self) -> usize {
        self.seen.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The keys a request is remembered under. Empty means "not dedupable".
fn keys(request: &WorkRequest) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if !request.message_id.is_empty() {
        keys.push(format!("id:{}", request.message_id));
    }
    let user = &request.context.user;
    let file_name = request.file.as_ref().map(|f| f.name.as_str()).unwrap_or("");
    let file_id = request.file.as_ref().map(|f| f.id.as_str()).unwrap_or("");
    let content = match request.context.event_type.as_str() {
        "" | "message" | "message_changed" if request.kind == RequestKind::Message => {
            (!request.text.is_empty()).then(|| format!("{}|{}", request.text, user))
        }
        "file_share" | "file_mention" => {
            (!file_name.is_empty()).then(|| format!("{file_name}|{user}"))
        }
        "file_created" => (!file_id.is_empty()).then(|| file_id.to_string()),
        _ => None,
    };
    keys.extend(content);
    keys
}
