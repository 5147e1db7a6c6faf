// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat platform client contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chat::{
    AuthTest, Conversation, FileInfo, HistoryMessage, OAuthAccess, PostMessage, TeamInfo,
    UserInfo,
};
use crate::error::DbotError;

/// A chat platform client bound to one token.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message; returns the new message's timestamp id.
    async fn post_message(&self, message: &PostMessage) -> Result<String, DbotError>;

    async fn file_info(&self, file_id: &str) -> Result<FileInfo, DbotError>;

    async fn file_add_comment(&self, file_id: &str, comment: &str) -> Result<(), DbotError>;

    /// Add reaction `name` to a file.
    async fn reactions_add(&self, name: &str, file_id: &str) -> Result<(), DbotError>;

    /// The message with timestamp `ts` in `channel`, if still present.
    async fn history(&self, channel: &str, ts: &str) -> Result<Vec<HistoryMessage>, DbotError>;

    async fn auth_test(&self) -> Result<AuthTest, DbotError>;

    async fn team_info(&self) -> Result<TeamInfo, DbotError>;

    async fn user_info(&self, user: &str) -> Result<UserInfo, DbotError>;

    /// Conversations of the given comma-separated `types` visible to the token.
    async fn list_conversations(&self, types: &str) -> Result<Vec<Conversation>, DbotError>;

    async fn conversations_invite(&self, channel: &str, users: &str) -> Result<(), DbotError>;
}

/// Creates token-bound clients and performs the token-less OAuth exchange.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    fn client(&self, token: &str) -> Arc<dyn ChatClient>;

    async fn oauth_access(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthAccess, DbotError>;
}
