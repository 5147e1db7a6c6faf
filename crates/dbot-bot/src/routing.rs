// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Which credential a reply is posted with.

use std::sync::Arc;

use dbot_core::domain::{Context, Team, User};
use dbot_core::{ChatClient, ChatConnector, DbotError, Repo};
use tracing::debug;

/// Whose token a chosen client carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Poster {
    OriginalUser(User),
    User(User),
    Bot,
}

/// A client ready to post, and who it posts as.
#[derive(Clone)]
pub struct ChosenClient {
    pub client: Arc<dyn ChatClient>,
    pub poster: Poster,
}

impl ChosenClient {
    /// The platform user id to mention as the poster, if it is a person.
    pub fn user_external_id(&self) -> Option<&str> {
        match &self.poster {
            Poster::OriginalUser(u) | Poster::User(u) => Some(&u.external_id),
            Poster::Bot => None,
        }
    }
}

/// Pick the posting client for a reply.
///
/// Precedence: the original poster, then the context user, then the
/// workspace bot token. A user counts only when they are active and have a
/// token. Errors when none of the three is usable.
pub async fn choose_client(
    repo: &dyn Repo,
    connector: &dyn ChatConnector,
    team: &Team,
    context: &Context,
) -> Result<ChosenClient, DbotError> {
    if let Some(user) = usable_user(repo, team, &context.original_user).await? {
        return Ok(ChosenClient {
            client: connector.client(&user.token),
            poster: Poster::OriginalUser(user),
        });
    }
    if context.user != context.original_user
        && let Some(user) = usable_user(repo, team, &context.user).await?
    {
        return Ok(ChosenClient {
            client: connector.client(&user.token),
            poster: Poster::User(user),
        });
    }
    if !team.bot_token.is_empty() {
        return Ok(ChosenClient {
            client: connector.client(&team.bot_token),
            poster: Poster::Bot,
        });
    }
    Err(DbotError::Chat {
        message: format!("no usable token to post for team {}", team.external_id),
        source: None,
    })
}

async fn usable_user(
    repo: &dyn Repo,
    team: &Team,
    external_id: &str,
) -> Result<Option<User>, DbotError> {
    if external_id.is_empty() {
        return Ok(None);
    }
    match repo.user_by_external_id(external_id).await {
        Ok(user) if user.team == team.id && user.can_post() => Ok(Some(user)),
        Ok(_) => {
            debug!(user = %external_id, "user cannot post");
            Ok(None)
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
