// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bot's view of every workspace it serves.

use std::collections::HashMap;
use std::sync::Arc;

use dbot_core::domain::{Configuration, Team};
use dbot_core::{ChatClient, ChatConnector, DbotError, Repo};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One workspace: its record, its channel subscription and a bot-token client.
#[derive(Clone)]
pub struct Subscription {
    pub team: Team,
    pub configuration: Configuration,
    pub client: Arc<dyn ChatClient>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("team", &self.team.external_id)
            .field("configuration", &self.configuration)
            .finish()
    }
}

/// Read-mostly map from external team id to [`Subscription`].
///
/// Writes happen on lazy load, on configuration change and on commands.
/// The lock is never held across an await on the network or repository.
pub struct Subscriptions {
    repo: Arc<dyn Repo>,
    connector: Arc<dyn ChatConnector>,
    by_team: RwLock<HashMap<String, Subscription>>,
}

impl Subscriptions {
    pub fn new(repo: Arc<dyn Repo>, connector: Arc<dyn ChatConnector>) -> Self {
        Self {
            repo,
            connector,
            by_team: RwLock::new(HashMap::new()),
        }
    }

    /// Load every workspace from the repository.
    pub async fn load_all(&self) -> Result<usize, DbotError> {
        let teams = self.repo.teams().await?;
        let mut loaded = HashMap::with_capacity(teams.len());
        for team in teams {
            let sub = self.build(team).await?;
            loaded.insert(sub.team.external_id.clone(), sub);
        }
        let count = loaded.len();
        *self.by_team.write().await = loaded;
        info!(teams = count, "subscriptions loaded");
        Ok(count)
    }

    async fn build(&self, team: Team) -> Result<Subscription, DbotError> {
        let configuration = self.repo.channels_and_groups(&team.id).await?;
        let client = self.connector.client(&team.bot_token);
        Ok(Subscription {
            team,
            configuration,
            client,
        })
    }

    /// The subscription for `external_id`, loading it from the repository on a miss.
    pub async fn get(&self, external_id: &str) -> Result<Subscription, DbotError> {
        if let Some(sub) = self.by_team.read().await.get(external_id) {
            return Ok(sub.clone());
        }
        let team = self.repo.team_by_external_id(external_id).await?;
        let sub = self.build(team).await?;
        debug!(team = %external_id, "subscription loaded lazily");
        let mut by_team = self.by_team.write().await;
        Ok(by_team
            .entry(external_id.to_string())
            .or_insert(sub)
            .clone())
    }

    /// Replace the configuration of the workspace whose internal id is `conf.team`.
    ///
    /// Returns `false` when that workspace is not loaded; it will pick the
    /// saved configuration up on its next lazy load.
    pub async fn update_configuration(&self, conf: Configuration) -> bool {
        let mut by_team = self.by_team.write().await;
        match by_team.values_mut().find(|s| s.team.id == conf.team) {
            Some(sub) => {
                sub.configuration = conf;
                true
            }
            None => false,
        }
    }

    /// Replace the stored team record, rebinding the client when the token changed.
    pub async fn update_team(&self, team: Team) {
        let mut by_team = self.by_team.write().await;
        if let Some(sub) = by_team.get_mut(&team.external_id) {
            if sub.team.bot_token != team.bot_token {
                sub.client = self.connector.client(&team.bot_token);
            }
            sub.team = team;
        }
    }

    pub async fn len(&self) -> usize {
        self.by_team.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
