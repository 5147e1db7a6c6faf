// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-workspace counters and convicted content records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::work::WorkReply;
use crate::types::{ReplyType, Verdict};

/// Clean/dirty/unknown counters for one indicator kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub clean: u64,
    pub dirty: u64,
    pub unknown: u64,
}

impl VerdictCounts {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Clean => self.clean += 1,
            Verdict::Dirty => self.dirty += 1,
            Verdict::Unknown => self.unknown += 1,
        }
    }

    fn add(&mut self, other: &VerdictCounts) {
        self.clean += other.clean;
        self.dirty += other.dirty;
        self.unknown += other.unknown;
    }
}

/// Counters accumulated in memory and flushed once per minute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Internal team id.
    pub team: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    pub messages: u64,
    pub files: VerdictCounts,
    pub urls: VerdictCounts,
    pub hashes: VerdictCounts,
    pub ips: VerdictCounts,
}

impl Statistics {
    pub fn new(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            ..Self::default()
        }
    }

    /// Count one processed reply: one message plus one verdict per indicator.
    pub fn record_reply(&mut self, reply: &WorkReply) {
        self.messages += 1;
        if reply.kind.contains(ReplyType::FILE) {
            if let Some(file) = &reply.file {
                self.files.record(file.result);
            }
            return;
        }
        for h in &reply.hashes {
            self.hashes.record(h.result);
        }
        for u in &reply.urls {
            self.urls.record(u.result);
        }
        for ip in &reply.ips {
            self.ips.record(ip.result);
        }
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &Statistics) {
        self.messages += other.messages;
        self.files.add(&other.files);
        self.urls.add(&other.urls);
        self.hashes.add(&other.hashes);
        self.ips.add(&other.ips);
    }

    pub fn reset(&mut self) {
        let team = std::mem::take(&mut self.team);
        *self = Self::new(team);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::new(self.team.clone())
    }
}

/// An indicator that a reply convicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaliciousContent {
    /// Internal team id.
    pub team: String,
    pub channel: String,
    pub message_id: String,
    /// The [`ReplyType`] bit of the convicted indicator.
    pub content_type: u8,
    pub content: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub vt: String,
    #[serde(default)]
    pub xfe: String,
    #[serde(default)]
    pub clamav: String,
}
