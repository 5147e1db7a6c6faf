// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Configuration, MaliciousContent, OAuthState, Statistics, Team, User};
use crate::error::DbotError;
use crate::traits::adapter::PluginAdapter;

/// Users, workspaces, subscriptions, OAuth state and statistics.
///
/// Lookups of missing records return [`DbotError::NotFound`]. Tokens and
/// oracle keys are returned decrypted and stored encrypted.
#[async_trait]
pub trait Repo: PluginAdapter {
    async fn user(&self, id: &str) -> Result<User, DbotError>;

    async fn user_by_external_id(&self, external_id: &str) -> Result<User, DbotError>;

    async fn set_user(&self, user: &User) -> Result<(), DbotError>;

    async fn team(&self, id: &str) -> Result<Team, DbotError>;

    async fn team_by_external_id(&self, external_id: &str) -> Result<Team, DbotError>;

    async fn set_team(&self, team: &Team) -> Result<(), DbotError>;

    /// Upsert both records atomically.
    async fn set_team_and_user(&self, team: &Team, user: &User) -> Result<(), DbotError>;

    async fn team_members(&self, team_id: &str) -> Result<Vec<User>, DbotError>;

    async fn teams(&self) -> Result<Vec<Team>, DbotError>;

    async fn oauth_state(&self, state: &str) -> Result<OAuthState, DbotError>;

    async fn set_oauth_state(&self, state: &OAuthState) -> Result<(), DbotError>;

    async fn del_oauth_state(&self, state: &str) -> Result<(), DbotError>;

    /// Delete OAuth states created before `before`; returns how many went.
    async fn purge_oauth_states(&self, before: DateTime<Utc>) -> Result<usize, DbotError>;

    /// The saved subscription; an inactive default when none was saved.
    async fn channels_and_groups(&self, team_id: &str) -> Result<Configuration, DbotError>;

    /// Replace the saved subscription wholesale.
    async fn set_channels_and_groups(&self, configuration: &Configuration)
    -> Result<(), DbotError>;

    async fn update_statistics(&self, stats: &Statistics) -> Result<(), DbotError>;

    async fn store_malicious_content(&self, content: &MaliciousContent) -> Result<(), DbotError>;

    /// Record the first post to a channel. Returns `true` only for the call
    /// that actually inserted the record.
    async fn message_sent_on_channel(&self, team_id: &str, channel: &str)
    -> Result<bool, DbotError>;

    async fn was_message_sent_on_channel(
        &self,
        team_id: &str,
        channel: &str,
    ) -> Result<bool, DbotError>;

    /// Messages processed across all workspaces.
    async fn total_messages(&self) -> Result<u64, DbotError>;
}
