// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`Repo`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use dbot_core::domain::{Configuration, MaliciousContent, OAuthState, Statistics, Team, User};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, Repo};
use dbot_vault::Vault;

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed repository.
///
/// Tokens and oracle keys are sealed with the vault before they reach a
/// query and opened again on the way out.
pub struct SqliteRepo {
    db: Database,
    vault: Vault,
}

impl SqliteRepo {
    pub fn new(db: Database, vault: Vault) -> Self {
        Self { db, vault }
    }

    /// Open the database at `path` and wrap it.
    pub async fn open(path: &str, vault: Vault) -> Result<Self, DbotError> {
        let db = Database::open(path).await?;
        debug!(path = %path, "SQLite repository initialized");
        Ok(Self::new(db, vault))
    }

    /// The underlying database, shared with the database-backed queue.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Convicted content stored for `team`.
    pub async fn malicious_content(&self, team: &str) -> Result<Vec<MaliciousContent>, DbotError> {
        queries::malicious::list_for_team(&self.db, team).await
    }

    fn seal_team(&self, team: &Team) -> Result<Team, DbotError> {
        Ok(Team {
            bot_token: self.vault.seal_optional(&team.bot_token)?,
            vt_key: self.vault.seal_optional(&team.vt_key)?,
            xfe_key: self.vault.seal_optional(&team.xfe_key)?,
            xfe_pass: self.vault.seal_optional(&team.xfe_pass)?,
            ..team.clone()
        })
    }

    fn open_team(&self, mut team: Team) -> Result<Team, DbotError> {
        team.bot_token = self.vault.open_optional(&team.bot_token)?;
        team.vt_key = self.vault.open_optional(&team.vt_key)?;
        team.xfe_key = self.vault.open_optional(&team.xfe_key)?;
        team.xfe_pass = self.vault.open_optional(&team.xfe_pass)?;
        Ok(team)
    }

    fn seal_user(&self, user: &User) -> Result<User, DbotError> {
        Ok(User {
            token: self.vault.seal_optional(&user.token)?,
            ..user.clone()
        })
    }

    fn open_user(&self, mut user: User) -> Result<User, DbotError> {
        user.token = self.vault.open_optional(&user.token)?;
        Ok(user)
    }
}

#[async_trait]
impl PluginAdapter for SqliteRepo {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl Repo for SqliteRepo {
    // --- Users ---

    async fn user(&self, id: &str) -> Result<User, DbotError> {
        let user = queries::users::get_user(&self.db, id)
            .await?
            .ok_or_else(|| DbotError::not_found("user", id))?;
        self.open_user(user)
    }

    async fn user_by_external_id(&self, external_id: &str) -> Result<User, DbotError> {
        let user = queries::users::get_user_by_external_id(&self.db, external_id)
            .await?
            .ok_or_else(|| DbotError::not_found("user", external_id))?;
        self.open_user(user)
    }

    async fn set_user(&self, user: &User) -> Result<(), DbotError> {
        queries::users::set_user(&self.db, &self.seal_user(user)?).await
    }

    // --- Teams ---

    async fn team(&self, id: &str) -> Result<Team, DbotError> {
        let team = queries::teams::get_team(&self.db, id)
            .await?
            .ok_or_else(|| DbotError::not_found("team", id))?;
        self.open_team(team)
    }

    async fn team_by_external_id(&self, external_id: &str) -> Result<Team, DbotError> {
        let team = queries::teams::get_team_by_external_id(&self.db, external_id)
            .await?
            .ok_or_else(|| DbotError::not_found("team", external_id))?;
        self.open_team(team)
    }

    async fn set_team(&self, team: &Team) -> Result<(), DbotError> {
        queries::teams::set_team(&self.db, &self.seal_team(team)?).await
    }

    async fn set_team_and_user(&self, team: &Team, user: &User) -> Result<(), DbotError> {
        queries::users::set_team_and_user(&self.db, &self.seal_team(team)?, &self.seal_user(user)?)
            .await
    }

    async fn team_members(&self, team_id: &str) -> Result<Vec<User>, DbotError> {
        queries::users::team_members(&self.db, team_id)
            .await?
            .into_iter()
            .map(|u| self.open_user(u))
            .collect()
    }

    async fn teams(&self) -> Result<Vec<Team>, DbotError> {
        queries::teams::list_teams(&self.db)
            .await?
            .into_iter()
            .map(|t| self.open_team(t))
            .collect()
    }

    // --- OAuth ---

    async fn oauth_state(&self, state: &str) -> Result<OAuthState, DbotError> {
        queries::oauth::get_state(&self.db, state)
            .await?
            .ok_or_else(|| DbotError::not_found("oauth state", state))
    }

    async fn set_oauth_state(&self, state: &OAuthState) -> Result<(), DbotError> {
        queries::oauth::set_state(&self.db, state).await
    }

    async fn del_oauth_state(&self, state: &str) -> Result<(), DbotError> {
        queries::oauth::delete_state(&self.db, state).await
    }

    async fn purge_oauth_states(&self, before: DateTime<Utc>) -> Result<usize, DbotError> {
        queries::oauth::purge_before(&self.db, before).await
    }

    // --- Subscriptions ---

    async fn channels_and_groups(&self, team_id: &str) -> Result<Configuration, DbotError> {
        queries::configurations::get_configuration(&self.db, team_id).await
    }

    async fn set_channels_and_groups(
        &self,
        configuration: &Configuration,
    ) -> Result<(), DbotError> {
        queries::configurations::set_configuration(&self.db, configuration).await
    }

    // --- Statistics and convictions ---

    async fn update_statistics(&self, stats: &Statistics) -> Result<(), DbotError> {
        queries::statistics::insert(&self.db, stats).await
    }

    async fn store_malicious_content(&self, content: &MaliciousContent) -> Result<(), DbotError> {
        queries::malicious::insert(&self.db, content).await.map(|_| ())
    }

    async fn message_sent_on_channel(
        &self,
        team_id: &str,
        channel: &str,
    ) -> Result<bool, DbotError> {
        queries::channels::mark_sent(&self.db, team_id, channel).await
    }

    async fn was_message_sent_on_channel(
        &self,
        team_id: &str,
        channel: &str,
    ) -> Result<bool, DbotError> {
        queries::channels::was_sent(&self.db, team_id, channel).await
    }

    async fn total_messages(&self) -> Result<u64, DbotError> {
        queries::statistics::total_messages(&self.db).await
    }
}
