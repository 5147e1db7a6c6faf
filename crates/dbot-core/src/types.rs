// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by adapters and the pipeline roles.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Queue,
    Storage,
    Chat,
    Oracle,
    Scanner,
}

/// A role a process can run. Any combination may be enabled at once.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Web,
    Bot,
    Dedup,
    Worker,
}

/// The consolidated verdict for one indicator.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Dirty,
    #[default]
    Unknown,
}

impl Verdict {
    /// Attachment color used when posting this verdict.
    pub fn color(self) -> &'static str {
        match self {
            Verdict::Clean => "good",
            Verdict::Dirty => "danger",
            Verdict::Unknown => "warning",
        }
    }
}

/// Bit-set of the indicator kinds present in a work reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyType(u8);

impl ReplyType {
    pub const HASH: ReplyType = ReplyType(1);
    pub const URL: ReplyType = ReplyType(2);
    pub const IP: ReplyType = ReplyType(4);
    pub const FILE: ReplyType = ReplyType(8);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ReplyType) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ReplyType) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ReplyType {
    type Output = ReplyType;

    fn bitor(self, rhs: ReplyType) -> ReplyType {
        ReplyType(self.0 | rhs.0)
    }
}
