// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workspace, user and OAuth state records.
//!
//! Token and key fields hold cleartext in memory; the repository encrypts
//! them on write and decrypts them on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One chat-platform tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Team {
    /// Internal id (`T` + uuid).
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email_domain: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub plan: String,
    /// The chat platform's id for this workspace.
    pub external_id: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Bot account user id, used to ignore the bot's own messages.
    #[serde(default)]
    pub bot_user_id: String,
    #[serde(default, skip_serializing)]
    pub bot_token: String,
    #[serde(default, skip_serializing)]
    pub vt_key: String,
    #[serde(default, skip_serializing)]
    pub xfe_key: String,
    #[serde(default, skip_serializing)]
    pub xfe_pass: String,
    #[serde(default)]
    pub status: UserStatus,
}

/// Lifecycle state of a user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Deleted,
}

/// A workspace member who authorised DBot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal id (`U` + uuid).
    pub id: String,
    /// Internal team id.
    pub team: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_primary_owner: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub is_ultra_restricted: bool,
    /// The chat platform's id for this user.
    pub external_id: String,
    #[serde(default, skip_serializing)]
    pub token: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl User {
    /// An active user with a token can post on behalf of the workspace.
    pub fn can_post(&self) -> bool {
        self.status == UserStatus::Active && !self.token.is_empty()
    }
}

/// A pending OAuth authorisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthState {
    pub state: String,
    pub ts: DateTime<Utc>,
}

impl OAuthState {
    /// States are valid for five minutes after creation.
    pub fn ttl() -> chrono::Duration {
        chrono::Duration::minutes(5)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.ts > Self::ttl()
    }
}
