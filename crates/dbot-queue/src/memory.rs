// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process queue for single-binary deployments and tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbot_core::domain::{Configuration, WorkReply, WorkRequest};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, Queue};
use tracing::debug;

use crate::local::{CHANNEL_CAPACITY, ConfSubscription, LocalChannels};

/// Bounded in-process channels. Pushes block while a topic is full.
///
/// Every handle shares the same topics. Configuration updates fan out: each
/// handle made with [`MemoryQueue::subscriber`] receives all of them, while
/// `message`, `work` and reply pops compete across handles.
pub struct MemoryQueue {
    channels: Arc<LocalChannels>,
    conf: ConfSubscription,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let channels = Arc::new(LocalChannels::new(capacity));
        let conf = channels.subscribe_conf();
        Self { channels, conf }
    }

    /// Another handle on the same topics with its own configuration feed.
    pub fn subscriber(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            conf: self.channels.subscribe_conf(),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryQueue {
    fn name(&self) -> &str {
        "memory"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        if self.channels.is_closed() {
            return Ok(HealthStatus::Unhealthy("queue closed".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        self.close().await
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push_conf(&self, conf: &Configuration) -> Result<(), DbotError> {
        self.channels.send_conf(conf.clone())
    }

    async fn pop_conf(&self, timeout: Option<Duration>) -> Result<Configuration, DbotError> {
        self.channels.recv_conf(&self.conf, timeout).await
    }

    async fn push_message(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.channels.send_message(request.clone()).await
    }

    async fn pop_message(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.channels.recv_message(timeout).await
    }

    async fn push_work(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.channels.send_work(request.clone()).await
    }

    async fn pop_work(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.channels.recv_work(timeout).await
    }

    async fn push_work_reply(&self, reply_queue: &str, reply: &WorkReply) -> Result<(), DbotError> {
        self.channels.send_reply(reply_queue, reply.clone()).await
    }

    async fn pop_work_reply(
        &self,
        reply_queue: &str,
        timeout: Option<Duration>,
    ) -> Result<WorkReply, DbotError> {
        self.channels.recv_reply(reply_queue, timeout).await
    }

    async fn close(&self) -> Result<(), DbotError> {
        if !self.channels.is_closed() {
            debug!("closing memory queue");
            self.channels.close();
        }
        Ok(())
    }
}
