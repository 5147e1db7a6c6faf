// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build the configured queue backing.

use std::sync::Arc;
use std::time::Duration;

use dbot_config::{DbotConfig, QueueBackend};
use dbot_core::{DbotError, Queue};
use dbot_storage::Database;
use tracing::info;

use crate::db::{DbQueue, DbQueueOptions};
use crate::memory::MemoryQueue;
use crate::pubsub::{PubSubQueue, PubSubSettings};
use crate::sqs::SqsQueue;

/// The reply-queue name of this process: the host name, or `dbot`.
pub fn instance_name() -> String {
    let from_env = std::env::var("HOSTNAME").ok();
    let from_file = || {
        std::fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
    };
    from_env
        .filter(|h| !h.trim().is_empty())
        .or_else(from_file)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "dbot".to_string())
}

/// Create the queue selected by `QueueBackend` (after `auto` resolution).
///
/// The database backing needs `database`; the others ignore it.
pub async fn build_queue(
    config: &DbotConfig,
    database: Option<&Database>,
    reply_name: &str,
) -> Result<Arc<dyn Queue>, DbotError> {
    let backend = config.resolved_queue_backend();
    let wants_replies = config.bot || config.web;
    let reply = wants_replies.then_some(reply_name);
    info!(backend = ?backend, reply_name = %reply_name, "connecting queue");
    let queue: Arc<dyn Queue> = match backend {
        QueueBackend::Memory | QueueBackend::Auto => Arc::new(MemoryQueue::new()),
        QueueBackend::Db => {
            let db = database.ok_or_else(|| {
                DbotError::Config("the database queue needs an open database".into())
            })?;
            let options = DbQueueOptions {
                poll_interval: Duration::from_secs(config.queue_poll.max(1)),
                consume_work: config.worker,
                consume_messages: config.dedup,
                follow_conf: config.bot,
                consume_replies: wants_replies,
                reply_name: reply_name.to_string(),
            };
            Arc::new(DbQueue::start(db.clone(), options).await?)
        }
        QueueBackend::Sqs => Arc::new(SqsQueue::connect(&config.aws, reply).await?),
        QueueBackend::Pubsub => {
            Arc::new(PubSubQueue::connect(PubSubSettings::from_config(&config.g), reply).await?)
        }
    };
    Ok(queue)
}
