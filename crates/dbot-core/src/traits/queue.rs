// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message queue contract connecting bots, dedup and workers.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Configuration, WorkReply, WorkRequest};
use crate::error::DbotError;
use crate::traits::adapter::PluginAdapter;

/// Four logical topics with identical semantics across backings.
///
/// - `conf` fans out: every bot instance sees every configuration change.
/// - `message` feeds the dedup role.
/// - `work` is load-balanced across workers.
/// - `workr` is addressed by reply-queue name to the originating bot.
///
/// A `timeout` of `None` waits forever. Pops return [`DbotError::Timeout`]
/// when the timeout elapses and [`DbotError::Closed`] once [`Queue::close`]
/// has been called. Undecodable payloads are logged and dropped by the
/// backing, never handed to the caller.
#[async_trait]
pub trait Queue: PluginAdapter {
    async fn push_conf(&self, conf: &Configuration) -> Result<(), DbotError>;

    async fn pop_conf(&self, timeout: Option<Duration>) -> Result<Configuration, DbotError>;

    async fn push_message(&self, request: &WorkRequest) -> Result<(), DbotError>;

    async fn pop_message(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError>;

    async fn push_work(&self, request: &WorkRequest) -> Result<(), DbotError>;

    async fn pop_work(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError>;

    async fn push_work_reply(&self, reply_queue: &str, reply: &WorkReply) -> Result<(), DbotError>;

    async fn pop_work_reply(
        &self,
        reply_queue: &str,
        timeout: Option<Duration>,
    ) -> Result<WorkReply, DbotError>;

    /// Stop all consumers. Pending and future pops return [`DbotError::Closed`].
    async fn close(&self) -> Result<(), DbotError>;
}
