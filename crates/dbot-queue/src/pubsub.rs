// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Cloud Pub/Sub backing over the REST API.
//!
//! One topic per logical queue. `message` and `work` share a subscription
//! named after the topic, so workers compete. Every bot gets its own `conf`
//! subscription (`{conf}-{reply}`), which makes configuration changes fan
//! out. Reply topics and their subscriptions (`{work}-{reply}`) are created
//! on first use by either side, so a reply published before the waiter
//! subscribes is not lost.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use dbot_config::model::{GoogleConfig, GoogleCredentials};
use dbot_core::domain::{Configuration, WorkReply, WorkRequest};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, Queue};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec;

/// Public REST endpoint.
pub const PUBSUB_BASE_URL: &str = "https://pubsub.googleapis.com/v1";

const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ACK_DEADLINE_SECONDS: u32 = 60;
const PULL_WAIT: Duration = Duration::from_secs(30);
/// Tokens are refreshed this long before they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// How requests are authorised.
#[derive(Clone)]
pub enum PubSubAuth {
    /// Exchange a signed service-account JWT for an access token.
    ServiceAccount(GoogleCredentials),
    /// A fixed bearer token.
    Bearer(String),
    /// No authorisation header (the local emulator).
    Anonymous,
}

/// Everything needed to reach one project's topics.
#[derive(Clone)]
pub struct PubSubSettings {
    pub base_url: String,
    pub project: String,
    pub conf: String,
    pub message: String,
    pub work: String,
    pub auth: PubSubAuth,
}

impl PubSubSettings {
    pub fn from_config(g: &GoogleConfig) -> Self {
        let or = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            base_url: PUBSUB_BASE_URL.to_string(),
            project: g.project.clone(),
            conf: or(&g.conf_name, "dbot-conf"),
            message: or(&g.message_name, "dbot-message"),
            work: or(&g.work_name, "dbot-work"),
            auth: PubSubAuth::ServiceAccount(g.credentials.clone()),
        }
    }

    fn reply_topic(&self, reply_name: &str) -> String {
        format!("{}-{}", self.work, resource_safe(reply_name))
    }

    fn conf_subscription(&self, reply_name: &str) -> String {
        format!("{}-{}", self.conf, resource_safe(reply_name))
    }
}

/// Resource ids allow letters, digits and `-_.~+%`; replace anything else.
fn resource_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "-_.~+%".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PullResponse {
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ReceivedMessage {
    ack_id: String,
    message: PubsubMessage,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PubsubMessage {
    data: String,
}

/// Pub/Sub-backed queue.
pub struct PubSubQueue {
    http: reqwest::Client,
    settings: PubSubSettings,
    conf_subscription: Option<String>,
    ready_replies: DashSet<String>,
    token: Mutex<Option<CachedToken>>,
    cancel: CancellationToken,
}

impl PubSubQueue {
    /// Create the topics and subscriptions. `reply_name` is set by bot and
    /// web processes, which also get their own `conf` subscription.
    pub async fn connect(
        settings: PubSubSettings,
        reply_name: Option<&str>,
    ) -> Result<Self, DbotError> {
        let http = reqwest::Client::builder()
            .timeout(PULL_WAIT + Duration::from_secs(30))
            .build()
            .map_err(|e| DbotError::Queue {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        let conf_subscription = reply_name.map(|n| settings.conf_subscription(n));
        let queue = Self {
            http,
            settings,
            conf_subscription,
            ready_replies: DashSet::new(),
            token: Mutex::new(None),
            cancel: CancellationToken::new(),
        };
        for topic in [&queue.settings.conf, &queue.settings.message, &queue.settings.work] {
            queue.ensure_topic(topic).await?;
        }
        queue
            .ensure_subscription(&queue.settings.message, &queue.settings.message)
            .await?;
        queue
            .ensure_subscription(&queue.settings.work, &queue.settings.work)
            .await?;
        if let Some(sub) = &queue.conf_subscription {
            queue.ensure_subscription(sub, &queue.settings.conf).await?;
        }
        if let Some(name) = reply_name {
            queue.ensure_reply(name).await?;
        }
        Ok(queue)
    }

    fn url(&self, kind: &str, name: &str) -> String {
        format!(
            "{}/projects/{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.project,
            kind,
            name
        )
    }

    fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.settings.project, topic)
    }

    async fn bearer(&self) -> Result<Option<String>, DbotError> {
        match &self.settings.auth {
            PubSubAuth::Anonymous => Ok(None),
            PubSubAuth::Bearer(token) => Ok(Some(token.clone())),
            PubSubAuth::ServiceAccount(credentials) => {
                let mut cached = self.token.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(Some(token.token.clone()));
                    }
                }
                let fresh = self.exchange_token(credentials).await?;
                let token = fresh.token.clone();
                *cached = Some(fresh);
                Ok(Some(token))
            }
        }
    }

    async fn exchange_token(&self, credentials: &GoogleCredentials) -> Result<CachedToken, DbotError> {
        let assertion = sign_assertion(credentials, chrono::Utc::now().timestamp())?;
        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode(JWT_BEARER_GRANT),
            urlencoding::encode(&assertion)
        );
        let response = self
            .http
            .post(&credentials.token_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| http_error("token exchange", e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DbotError::Queue {
                message: format!("token exchange returned {status}: {text}"),
                source: None,
            });
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| http_error("token exchange", e))?;
        debug!(expires_in = token.expires_in, "Pub/Sub access token refreshed");
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        Ok(CachedToken {
            token: token.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: String,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, DbotError> {
        let mut request = self.http.request(method, url).json(&body);
        if let Some(token) = self.bearer().await? {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|e| http_error("request", e))
    }

    /// PUT a resource, treating 409 as "already exists".
    async fn create(&self, kind: &str, name: &str, body: serde_json::Value) -> Result<(), DbotError> {
        let response = self
            .send(reqwest::Method::PUT, self.url(kind, name), body)
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            debug!(kind, name, %status, "Pub/Sub resource ready");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(DbotError::Queue {
            message: format!("creating {kind} {name} returned {status}: {text}"),
            source: None,
        })
    }

    async fn ensure_topic(&self, topic: &str) -> Result<(), DbotError> {
        self.create("topics", topic, json!({})).await
    }

    async fn ensure_subscription(&self, subscription: &str, topic: &str) -> Result<(), DbotError> {
        let body = json!({
            "topic": self.topic_path(topic),
            "ackDeadlineSeconds": ACK_DEADLINE_SECONDS,
        });
        self.create("subscriptions", subscription, body).await
    }

    async fn ensure_reply(&self, reply_name: &str) -> Result<String, DbotError> {
        let name = self.settings.reply_topic(reply_name);
        if self.ready_replies.contains(&name) {
            return Ok(name);
        }
        self.ensure_topic(&name).await?;
        self.ensure_subscription(&name, &name).await?;
        self.ready_replies.insert(name.clone());
        Ok(name)
    }

    async fn publish<T: Serialize>(&self, topic: &str, value: &T) -> Result<(), DbotError> {
        if self.cancel.is_cancelled() {
            return Err(DbotError::Closed);
        }
        let data = codec::to_base64_json(value)?;
        let response = self
            .send(
                reqwest::Method::POST,
                format!("{}:publish", self.url("topics", topic)),
                json!({ "messages": [{ "data": data }] }),
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DbotError::Queue {
                message: format!("publish to {topic} returned {status}: {text}"),
                source: None,
            });
        }
        Ok(())
    }

    async fn pull<T: DeserializeOwned>(
        &self,
        subscription: &str,
        timeout: Option<Duration>,
    ) -> Result<T, DbotError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.cancel.is_cancelled() {
                return Err(DbotError::Closed);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DbotError::Timeout {
                            duration: timeout.unwrap_or_default(),
                        });
                    }
                    (deadline - now).min(PULL_WAIT)
                }
                None => PULL_WAIT,
            };
            let request = self.send(
                reqwest::Method::POST,
                format!("{}:pull", self.url("subscriptions", subscription)),
                json!({ "maxMessages": 1 }),
            );
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(DbotError::Closed),
                r = tokio::time::timeout(wait, request) => r,
            };
            let Ok(response) = outcome else {
                continue;
            };
            let response = response?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(DbotError::Queue {
                    message: format!("pull from {subscription} returned {status}: {text}"),
                    source: None,
                });
            }
            let pulled: PullResponse = response
                .json()
                .await
                .map_err(|e| http_error("pull", e))?;
            let Some(received) = pulled.received_messages.into_iter().next() else {
                continue;
            };
            let decoded = codec::from_base64_json::<T>(&received.message.data);
            self.acknowledge(subscription, &received.ack_id).await;
            match decoded {
                Ok(value) => return Ok(value),
                Err(e) => warn!(subscription, error = %e, "dropping malformed message"),
            }
        }
    }

    async fn acknowledge(&self, subscription: &str, ack_id: &str) {
        let result = self
            .send(
                reqwest::Method::POST,
                format!("{}:acknowledge", self.url("subscriptions", subscription)),
                json!({ "ackIds": [ack_id] }),
            )
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(subscription, status = %response.status(), "unable to acknowledge message"),
            Err(e) => warn!(subscription, error = %e, "unable to acknowledge message"),
        }
    }
}

/// Build the RS256 assertion a service account trades for a token.
fn sign_assertion(credentials: &GoogleCredentials, now: i64) -> Result<String, DbotError> {
    let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
        .map_err(|e| DbotError::Config(format!("invalid service-account private key: {e}")))?;
    let mut header = Header::new(Algorithm::RS256);
    if !credentials.private_key_id.is_empty() {
        header.kid = Some(credentials.private_key_id.clone());
    }
    let claims = Claims {
        iss: &credentials.client_email,
        scope: PUBSUB_SCOPE,
        aud: &credentials.token_uri,
        iat: now,
        exp: now + 3600,
    };
    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| DbotError::Crypto(format!("failed to sign service-account assertion: {e}")))
}

fn http_error(op: &str, e: reqwest::Error) -> DbotError {
    DbotError::Queue {
        message: format!("Pub/Sub {op} failed: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl PluginAdapter for PubSubQueue {
    fn name(&self) -> &str {
        "pubsub"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        if self.cancel.is_cancelled() {
            return Ok(HealthStatus::Unhealthy("queue closed".into()));
        }
        match self.bearer().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        self.close().await
    }
}

#[async_trait]
impl Queue for PubSubQueue {
    async fn push_conf(&self, conf: &Configuration) -> Result<(), DbotError> {
        self.publish(&self.settings.conf, conf).await
    }

    async fn pop_conf(&self, timeout: Option<Duration>) -> Result<Configuration, DbotError> {
        let Some(subscription) = &self.conf_subscription else {
            return Err(DbotError::Queue {
                message: "this process has no configuration subscription".into(),
                source: None,
            });
        };
        self.pull(subscription, timeout).await
    }

    async fn push_message(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.publish(&self.settings.message, request).await
    }

    async fn pop_message(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.pull(&self.settings.message, timeout).await
    }

    async fn push_work(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.publish(&self.settings.work, request).await
    }

    async fn pop_work(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.pull(&self.settings.work, timeout).await
    }

    async fn push_work_reply(&self, reply_queue: &str, reply: &WorkReply) -> Result<(), DbotError> {
        let topic = self.ensure_reply(reply_queue).await?;
        self.publish(&topic, reply).await
    }

    async fn pop_work_reply(
        &self,
        reply_queue: &str,
        timeout: Option<Duration>,
    ) -> Result<WorkReply, DbotError> {
        let subscription = self.ensure_reply(reply_queue).await?;
        self.pull(&subscription, timeout).await
    }

    async fn close(&self) -> Result<(), DbotError> {
        self.cancel.cancel();
        Ok(())
    }
}
