// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Slack Web API.
//!
//! [`SlackApi`] owns the connection pool and hands out token-bound
//! [`SlackClient`]s. Every response is checked for `"ok": true`; a Slack
//! error string becomes [`DbotError::Chat`]. A 429 is retried once after the
//! `Retry-After` delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbot_core::chat::{
    AuthTest, Conversation, FileInfo, HistoryMessage, OAuthAccess, PostMessage, TeamInfo,
    UserInfo,
};
use dbot_core::{ChatClient, ChatConnector, DbotError};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Base URL for Slack Web API methods.
const API_BASE_URL: &str = "https://slack.com/api";

/// Page size for cursor-paginated listings.
const PAGE_LIMIT: &str = "200";

/// Longest `Retry-After` we are willing to honour.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Shared Slack HTTP pool; creates token-bound clients.
#[derive(Debug, Clone)]
pub struct SlackApi {
    http: reqwest::Client,
    base_url: String,
}

impl SlackApi {
    pub fn new() -> Result<Self, DbotError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DbotError::Chat {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// A client that authenticates every call with `token`.
    pub fn bind(&self, token: &str) -> SlackClient {
        SlackClient {
            api: self.clone(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }
}

#[async_trait]
impl ChatConnector for SlackApi {
    fn client(&self, token: &str) -> Arc<dyn ChatClient> {
        Arc::new(self.bind(token))
    }

    async fn oauth_access(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthAccess, DbotError> {
        let mut form = vec![
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
        ];
        if !redirect_uri.is_empty() {
            form.push(("redirect_uri", redirect_uri));
        }
        let body = form
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let response = self
            .http
            .post(self.method_url("oauth.access"))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await
            .map_err(|e| http_error("oauth.access", e))?;
        decode("oauth.access", response).await
    }
}

/// A Slack client bound to one bot or user token.
#[derive(Clone)]
pub struct SlackClient {
    api: SlackApi,
    token: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.api.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl SlackClient {
    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DbotError> {
        let url = url::Url::parse_with_params(&self.api.method_url(method), params).map_err(
            |e| DbotError::Chat {
                message: format!("{method}: invalid request URL: {e}"),
                source: Some(Box::new(e)),
            },
        )?;
        self.call(method, || self.api.http.get(url.clone())).await
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, DbotError> {
        self.call(method, || {
            self.api
                .http
                .post(self.api.method_url(method))
                .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
                .json(&body)
        })
        .await
    }

    async fn call<T, F>(&self, method: &str, build: F) -> Result<T, DbotError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retried = false;
        loop {
            let response = build()
                .bearer_auth(&self.token)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| http_error(method, e))?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS && !retried {
                let wait = retry_after(&response);
                warn!(method, wait_secs = wait.as_secs(), "rate limited, will retry");
                tokio::time::sleep(wait).await;
                retried = true;
                continue;
            }
            return decode(method, response).await;
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(1))
        .min(MAX_RETRY_AFTER)
}

/// Check the HTTP status and the `ok` flag, then decode the body as `T`.
async fn decode<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, DbotError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DbotError::Chat {
            message: format!("{method}: unexpected status {status}: {body}"),
            source: None,
        });
    }
    let body: Value = response.json().await.map_err(|e| http_error(method, e))?;
    if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(DbotError::Chat {
            message: format!("{method}: {error}"),
            source: None,
        });
    }
    if let Some(warning) = body.get("warning").and_then(Value::as_str) {
        warn!(method, warning, "Slack API warning");
    }
    serde_json::from_value(body).map_err(|e| DbotError::Decode {
        message: format!("{method}: unexpected response shape: {e}"),
        source: Some(Box::new(e)),
    })
}

fn http_error(method: &str, e: reqwest::Error) -> DbotError {
    DbotError::Chat {
        message: format!("{method}: HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

#[derive(Deserialize)]
struct PostMessageResponse {
    #[serde(default)]
    ts: String,
}

#[derive(Deserialize)]
struct FileInfoResponse {
    file: FileInfo,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
struct TeamInfoResponse {
    team: TeamInfo,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    user: UserInfo,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResponseMetadata {
    next_cursor: String,
}

#[derive(Deserialize)]
struct ConversationsResponse {
    #[serde(default)]
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct Ack {}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(&self, message: &PostMessage) -> Result<String, DbotError> {
        let body = serde_json::to_value(message).map_err(|e| DbotError::Chat {
            message: format!("chat.postMessage: cannot encode message: {e}"),
            source: Some(Box::new(e)),
        })?;
        let response: PostMessageResponse = self.post("chat.postMessage", body).await?;
        debug!(channel = %message.channel, ts = %response.ts, "message posted");
        Ok(response.ts)
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo, DbotError> {
        let response: FileInfoResponse = self
            .get("files.info", &[("file", file_id), ("count", "0")])
            .await?;
        Ok(response.file)
    }

    async fn file_add_comment(&self, file_id: &str, comment: &str) -> Result<(), DbotError> {
        let _: Ack = self
            .post(
                "files.comments.add",
                json!({ "file": file_id, "comment": comment }),
            )
            .await?;
        Ok(())
    }

    async fn reactions_add(&self, name: &str, file_id: &str) -> Result<(), DbotError> {
        let _: Ack = self
            .post("reactions.add", json!({ "name": name, "file": file_id }))
            .await?;
        Ok(())
    }

    async fn history(&self, channel: &str, ts: &str) -> Result<Vec<HistoryMessage>, DbotError> {
        let response: HistoryResponse = self
            .get(
                "conversations.history",
                &[
                    ("channel", channel),
                    ("latest", ts),
                    ("inclusive", "true"),
                    ("limit", "1"),
                ],
            )
            .await?;
        Ok(response.messages)
    }

    async fn auth_test(&self) -> Result<AuthTest, DbotError> {
        self.post("auth.test", json!({})).await
    }

    async fn team_info(&self) -> Result<TeamInfo, DbotError> {
        let response: TeamInfoResponse = self.get("team.info", &[]).await?;
        Ok(response.team)
    }

    async fn user_info(&self, user: &str) -> Result<UserInfo, DbotError> {
        let response: UserInfoResponse = self.get("users.info", &[("user", user)]).await?;
        Ok(response.user)
    }

    async fn list_conversations(&self, types: &str) -> Result<Vec<Conversation>, DbotError> {
        let mut all = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![("exclude_archived", "true"), ("limit", PAGE_LIMIT)];
            if !types.is_empty() {
                params.push(("types", types));
            }
            if !cursor.is_empty() {
                params.push(("cursor", cursor.as_str()));
            }
            let page: ConversationsResponse = self.get("conversations.list", &params).await?;
            all.extend(page.channels);
            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }
        Ok(all)
    }

    async fn conversations_invite(&self, channel: &str, users: &str) -> Result<(), DbotError> {
        let _: Ack = self
            .post(
                "conversations.invite",
                json!({ "channel": channel, "users": users }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbot_core::chat::Attachment;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer) -> SlackApi {
        SlackApi::new().unwrap().with_base_url(server.uri())
    }

    #[tokio::test]
    async fn post_message_sends_attachments_and_returns_ts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-1"))
            .and(body_partial_json(json!({
                "channel": "C1",
                "as_user": true,
                "attachments": [{"color": "good"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "ts": "1.5"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = api(&server).await.bind("xoxb-1");
        let mut message = PostMessage::text("C1", "hello");
        message.attachments.push(Attachment::text("clean", "good"));
        assert_eq!(client.post_message(&message).await.unwrap(), "1.5");
    }

    #[tokio::test]
    async fn slack_error_becomes_chat_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "user_not_found"})),
            )
            .mount(&server)
            .await;
        let err = api(&server).await.bind("t").user_info("U0").await.unwrap_err();
        match err {
            DbotError::Chat { message, .. } => assert_eq!(message, "users.info: user_not_found"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn conversations_follow_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("cursor", "next-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{"id": "C2", "name": "two", "is_channel": true}],
                "response_metadata": {"next_cursor": ""}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .and(query_param("types", "public_channel,private_channel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{"id": "C1", "name": "one", "is_channel": true}],
                "response_metadata": {"next_cursor": "next-1"}
            })))
            .mount(&server)
            .await;

        let list = api(&server)
            .await
            .bind("t")
            .list_conversations("public_channel,private_channel")
            .await
            .unwrap();
        let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2"]);
    }

    #[tokio::test]
    async fn rate_limit_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "team_id": "T1", "user_id": "UBOT", "team": "Acme", "user": "dbot", "url": "https://acme.slack.com/"
            })))
            .mount(&server)
            .await;
        let auth = api(&server).await.bind("t").auth_test().await.unwrap();
        assert_eq!(auth.user_id, "UBOT");
        assert_eq!(auth.team_id, "T1");
    }

    #[tokio::test]
    async fn oauth_access_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth.access"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "access_token": "xoxp-user",
                "user_id": "U1",
                "team_id": "T1",
                "bot": {"bot_user_id": "UBOT", "bot_access_token": "xoxb-bot"}
            })))
            .mount(&server)
            .await;
        let access = api(&server)
            .await
            .oauth_access("id", "secret", "code 1", "")
            .await
            .unwrap();
        assert_eq!(access.access_token, "xoxp-user");
        assert_eq!(access.bot.unwrap().bot_access_token, "xoxb-bot");

        let req = &server.received_requests().await.unwrap()[0];
        let form = String::from_utf8(req.body.clone()).unwrap();
        assert_eq!(form, "client_id=id&client_secret=secret&code=code%201");
    }

    #[tokio::test]
    async fn history_and_file_info_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.history"))
            .and(query_param("latest", "9.9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "messages": [{"ts": "9.9", "text": "see 8.8.8.8", "user": "U1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files.info"))
            .and(query_param("file", "F1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "file": {"id": "F1", "name": "a.exe", "size": 42, "url_private": "https://files/a"}
            })))
            .mount(&server)
            .await;
        let client = api(&server).await.bind("t");
        let history = client.history("C1", "9.9").await.unwrap();
        assert_eq!(history[0].text, "see 8.8.8.8");
        let file = client.file_info("F1").await.unwrap();
        assert_eq!(file.size, 42);
    }
}
