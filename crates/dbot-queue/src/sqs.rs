// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Amazon SQS backing.
//!
//! One queue per topic plus one reply queue per reply name, all created on
//! demand. Pops long-poll, delete a message once it decodes, and delete
//! (without retrying) a message that does not.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::{Credentials, Region};
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::QueueAttributeName;
use dashmap::DashMap;
use dbot_config::model::AwsConfig;
use dbot_core::domain::{Configuration, WorkReply, WorkRequest};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, Queue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec;

const REGION: &str = "us-west-2";
const MAX_MESSAGE_SIZE: &str = "262144";
const RETENTION_SECONDS: &str = "360";
const VISIBILITY_TIMEOUT_SECONDS: &str = "60";
const LONG_POLL_SECONDS: u64 = 20;
const MAX_QUEUE_NAME: usize = 80;

/// Queue names, with defaults for the ones left empty in configuration.
#[derive(Debug, Clone)]
pub struct SqsNames {
    pub conf: String,
    pub message: String,
    pub work: String,
}

impl SqsNames {
    pub fn from_config(aws: &AwsConfig) -> Self {
        let or = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            conf: or(&aws.conf_queue_name, "dbot-conf"),
            message: or(&aws.message_queue_name, "dbot-message"),
            work: or(&aws.work_queue_name, "dbot-work"),
        }
    }

    /// `{work}-{reply}` with characters SQS rejects replaced by `-`.
    pub fn reply_queue(&self, reply_name: &str) -> String {
        let raw = format!("{}-{}", self.work, reply_name);
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .take(MAX_QUEUE_NAME)
            .collect()
    }
}

/// SQS-backed queue.
pub struct SqsQueue {
    client: Client,
    names: SqsNames,
    conf_url: String,
    message_url: String,
    work_url: String,
    reply_urls: DashMap<String, String>,
    cancel: CancellationToken,
}

impl SqsQueue {
    /// Connect with the static credentials in `aws` and create the topic
    /// queues, plus the reply queue for `reply_name` when given.
    pub async fn connect(aws: &AwsConfig, reply_name: Option<&str>) -> Result<Self, DbotError> {
        let credentials = Credentials::new(&aws.id, &aws.secret, None, None, "dbot-config");
        let sdk = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(REGION))
            .credentials_provider(credentials)
            .load()
            .await;
        let client = Client::new(&sdk);
        Self::with_client(client, SqsNames::from_config(aws), reply_name).await
    }

    pub async fn with_client(
        client: Client,
        names: SqsNames,
        reply_name: Option<&str>,
    ) -> Result<Self, DbotError> {
        let conf_url = create_queue(&client, &names.conf).await?;
        let message_url = create_queue(&client, &names.message).await?;
        let work_url = create_queue(&client, &names.work).await?;
        let queue = Self {
            client,
            names,
            conf_url,
            message_url,
            work_url,
            reply_urls: DashMap::new(),
            cancel: CancellationToken::new(),
        };
        if let Some(name) = reply_name {
            queue.reply_url(name).await?;
        }
        Ok(queue)
    }

    async fn reply_url(&self, reply_name: &str) -> Result<String, DbotError> {
        if let Some(url) = self.reply_urls.get(reply_name) {
            return Ok(url.clone());
        }
        let url = create_queue(&self.client, &self.names.reply_queue(reply_name)).await?;
        self.reply_urls.insert(reply_name.to_string(), url.clone());
        Ok(url)
    }

    async fn push<T: Serialize>(&self, url: &str, value: &T) -> Result<(), DbotError> {
        if self.cancel.is_cancelled() {
            return Err(DbotError::Closed);
        }
        let body = codec::to_json(value)?;
        self.client
            .send_message()
            .queue_url(url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| sqs_error("send message", e))?;
        Ok(())
    }

    async fn pop<T: DeserializeOwned>(
        &self,
        url: &str,
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
                    long_poll_seconds(deadline - now)
                }
                None => LONG_POLL_SECONDS as i32,
            };
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return Err(DbotError::Closed),
                r = self
                    .client
                    .receive_message()
                    .queue_url(url)
                    .max_number_of_messages(1)
                    .wait_time_seconds(wait)
                    .send() => r.map_err(|e| sqs_error("receive message", e))?,
            };
            let Some(message) = received.messages().first() else {
                continue;
            };
            let decoded = codec::from_json::<T>(message.body().unwrap_or_default());
            if let Some(handle) = message.receipt_handle() {
                if let Err(e) = self
                    .client
                    .delete_message()
                    .queue_url(url)
                    .receipt_handle(handle)
                    .send()
                    .await
                {
                    warn!(queue = %url, error = %DisplayErrorContext(&e), "unable to delete message");
                }
            }
            match decoded {
                Ok(value) => return Ok(value),
                Err(e) => warn!(queue = %url, error = %e, "dropping malformed message"),
            }
        }
    }
}

/// Long-poll wait for the time left before a deadline, capped at 20 s.
fn long_poll_seconds(remaining: Duration) -> i32 {
    remaining.as_secs().min(LONG_POLL_SECONDS) as i32
}

async fn create_queue(client: &Client, name: &str) -> Result<String, DbotError> {
    let out = client
        .create_queue()
        .queue_name(name)
        .attributes(QueueAttributeName::MaximumMessageSize, MAX_MESSAGE_SIZE)
        .attributes(QueueAttributeName::MessageRetentionPeriod, RETENTION_SECONDS)
        .attributes(QueueAttributeName::VisibilityTimeout, VISIBILITY_TIMEOUT_SECONDS)
        .send()
        .await
        .map_err(|e| sqs_error("create queue", e))?;
    let url = out.queue_url().ok_or_else(|| DbotError::Queue {
        message: format!("create queue {name} returned no URL"),
        source: None,
    })?;
    debug!(queue = %name, url = %url, "SQS queue ready");
    Ok(url.to_string())
}

fn sqs_error<E>(op: &str, e: aws_sdk_sqs::error::SdkError<E>) -> DbotError
where
    E: std::error::Error + 'static,
{
    DbotError::Queue {
        message: format!("SQS {op} failed: {}", DisplayErrorContext(&e)),
        source: None,
    }
}

#[async_trait]
impl PluginAdapter for SqsQueue {
    fn name(&self) -> &str {
        "sqs"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        if self.cancel.is_cancelled() {
            return Ok(HealthStatus::Unhealthy("queue closed".into()));
        }
        match self
            .client
            .get_queue_url()
            .queue_name(&self.names.work)
            .send()
            .await
        {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        self.close().await
    }
}

#[async_trait]
impl Queue for SqsQueue {
    async fn push_conf(&self, conf: &Configuration) -> Result<(), DbotError> {
        self.push(&self.conf_url, conf).await
    }

    async fn pop_conf(&self, timeout: Option<Duration>) -> Result<Configuration, DbotError> {
        self.pop(&self.conf_url, timeout).await
    }

    async fn push_message(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.push(&self.message_url, request).await
    }

    async fn pop_message(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.pop(&self.message_url, timeout).await
    }

    async fn push_work(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.push(&self.work_url, request).await
    }

    async fn pop_work(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.pop(&self.work_url, timeout).await
    }

    async fn push_work_reply(&self, reply_queue: &str, reply: &WorkReply) -> Result<(), DbotError> {
        let url = self.reply_url(reply_queue).await?;
        self.push(&url, reply).await
    }

    async fn pop_work_reply(
        &self,
        reply_queue: &str,
        timeout: Option<Duration>,
    ) -> Result<WorkReply, DbotError> {
        let url = self.reply_url(reply_queue).await?;
        self.pop(&url, timeout).await
    }

    async fn close(&self) -> Result<(), DbotError> {
        self.cancel.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_fall_back_to_defaults() {
        let names = SqsNames::from_config(&AwsConfig {
            work_queue_name: "prod-work".into(),
            ..AwsConfig::default()
        });
        assert_eq!(names.conf, "dbot-conf");
        assert_eq!(names.message, "dbot-message");
        assert_eq!(names.work, "prod-work");
    }

    #[test]
    fn reply_queue_name_is_sanitized() {
        let names = SqsNames::from_config(&AwsConfig::default());
        assert_eq!(
            names.reply_queue("ip-10-0-0-1.ec2.internal"),
            "dbot-work-ip-10-0-0-1-ec2-internal"
        );
        assert_eq!(names.reply_queue(&"x".repeat(200)).len(), MAX_QUEUE_NAME);
    }

    #[test]
    fn long_poll_is_capped() {
        assert_eq!(long_poll_seconds(Duration::from_secs(300)), 20);
        assert_eq!(long_poll_seconds(Duration::from_millis(2500)), 2);
        assert_eq!(long_poll_seconds(Duration::from_millis(300)), 0);
    }
}
