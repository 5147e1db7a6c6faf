// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat platform for deterministic testing.
//!
//! `MockChat` is both the connector and every client it hands out. Each
//! outbound call is captured with the token that made it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbot_core::chat::{
    AuthTest, Conversation, FileInfo, HistoryMessage, OAuthAccess, PostMessage, TeamInfo, UserInfo,
};
use dbot_core::{ChatClient, ChatConnector, DbotError};

/// One captured outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Post { token: String, message: PostMessage },
    Comment { token: String, file: String, comment: String },
    Reaction { token: String, name: String, file: String },
    Invite { token: String, channel: String, users: String },
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<ChatCall>>,
    conversations: Mutex<Vec<Conversation>>,
}

/// A mock chat platform.
#[derive(Clone, Default)]
pub struct MockChat {
    shared: Arc<Shared>,
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversations returned by every `list_conversations` call.
    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *lock(&self.shared.conversations) = conversations;
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        lock(&self.shared.calls).clone()
    }

    pub fn posts(&self) -> Vec<PostMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Post { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Comment { file, comment, .. } => Some((file, comment)),
                _ => None,
            })
            .collect()
    }

    pub fn reactions(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Reaction { name, file, .. } => Some((name, file)),
                _ => None,
            })
            .collect()
    }

    /// Poll until at least `n` calls matching `pred` were captured or `timeout` passes.
    pub async fn wait_for<F>(&self, n: usize, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&ChatCall) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.calls().iter().filter(|c| pred(c)).count() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until at least `n` posts were captured.
    pub async fn wait_for_posts(&self, n: usize, timeout: Duration) -> bool {
        self.wait_for(n, timeout, |c| matches!(c, ChatCall::Post { .. }))
            .await
    }

    pub fn clear(&self) {
        lock(&self.shared.calls).clear();
    }

    fn record(&self, call: ChatCall) {
        lock(&self.shared.calls).push(call);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A client bound to one token.
struct MockClient {
    chat: MockChat,
    token: String,
}

#[async_trait]
impl ChatClient for MockClient {
    async fn post_message(&self, message: &PostMessage) -> Result<String, DbotError> {
        self.chat.record(ChatCall::Post {
            token: self.token.clone(),
            message: message.clone(),
        });
        Ok(format!("{}.000100", self.chat.calls().len()))
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo, DbotError> {
        Err(DbotError::not_found("file", file_id))
    }

    async fn file_add_comment(&self, file_id: &str, comment: &str) -> Result<(), DbotError> {
        self.chat.record(ChatCall::Comment {
            token: self.token.clone(),
            file: file_id.into(),
            comment: comment.into(),
        });
        Ok(())
    }

    async fn reactions_add(&self, name: &str, file_id: &str) -> Result<(), DbotError> {
        self.chat.record(ChatCall::Reaction {
            token: self.token.clone(),
            name: name.into(),
            file: file_id.into(),
        });
        Ok(())
    }

    async fn history(&self, _channel: &str, _ts: &str) -> Result<Vec<HistoryMessage>, DbotError> {
        Ok(Vec::new())
    }

    async fn auth_test(&self) -> Result<AuthTest, DbotError> {
        Ok(AuthTest::default())
    }

    async fn team_info(&self) -> Result<TeamInfo, DbotError> {
        Ok(TeamInfo::default())
    }

    async fn user_info(&self, user: &str) -> Result<UserInfo, DbotError> {
        Ok(UserInfo {
            id: user.into(),
            ..UserInfo::default()
        })
    }

    async fn list_conversations(&self, _types: &str) -> Result<Vec<Conversation>, DbotError> {
        Ok(lock(&self.chat.shared.conversations).clone())
    }

    async fn conversations_invite(&self, channel: &str, users: &str) -> Result<(), DbotError> {
        self.chat.record(ChatCall::Invite {
            token: self.token.clone(),
            channel: channel.into(),
            users: users.into(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChatConnector for MockChat {
    fn client(&self, token: &str) -> Arc<dyn ChatClient> {
        Arc::new(MockClient {
            chat: self.clone(),
            token: token.into(),
        })
    }

    async fn oauth_access(
        &self,
        _client_id: &str,
        _client_secret: &str,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<OAuthAccess, DbotError> {
        Err(DbotError::Chat {
            message: "oauth is not scripted in the mock".into(),
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_per_token() {
        let chat = MockChat::new();
        chat.client("xoxb-1")
            .post_message(&PostMessage::text("C1", "hello"))
            .await
            .unwrap();
        chat.client("xoxp-2").reactions_add("warning", "F1").await.unwrap();

        assert_eq!(chat.posts().len(), 1);
        assert_eq!(chat.reactions(), vec![("warning".to_string(), "F1".to_string())]);
        assert!(matches!(&chat.calls()[0], ChatCall::Post { token, .. } if token == "xoxb-1"));
        assert!(chat.wait_for_posts(1, Duration::from_millis(10)).await);
        assert!(!chat.wait_for_posts(2, Duration::from_millis(30)).await);
    }
}
