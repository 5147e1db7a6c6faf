// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue backed by the `queue` table of the shared database.
//!
//! Pushes insert rows. A poller reads rows addressed to the roles running
//! in this process and feeds them into in-process channels, which the pops
//! read from.
//!
//! - `work` and `message` rows are claimed by one consumer each.
//! - `workr` rows are claimed by the process waiting on that reply name.
//! - `conf` rows are read by every bot after its own high-water mark and
//!   never marked consumed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbot_core::domain::{Configuration, WorkReply, WorkRequest};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, Queue};
use dbot_storage::Database;
use dbot_storage::queries::queue as rows;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::codec;
use crate::local::{CHANNEL_CAPACITY, ConfSubscription, LocalChannels};

const CONF: &str = "conf";
const MESSAGE: &str = "message";
const WORK: &str = "work";
const REPLY: &str = "workr";

/// Rows claimed per topic per poll.
const CLAIM_BATCH: usize = 25;

/// Rows older than this are purged whether consumed or not.
const RETENTION: Duration = Duration::from_secs(360);

/// Which topics this process consumes.
#[derive(Debug, Clone)]
pub struct DbQueueOptions {
    pub poll_interval: Duration,
    /// Claim `work` rows (worker role).
    pub consume_work: bool,
    /// Claim `message` rows (dedup role).
    pub consume_messages: bool,
    /// Follow `conf` rows (bot role).
    pub follow_conf: bool,
    /// Claim `workr` rows for `reply_name` and any name with a waiting pop.
    pub consume_replies: bool,
    pub reply_name: String,
}

/// Database-backed queue.
pub struct DbQueue {
    db: Database,
    channels: Arc<LocalChannels>,
    conf: ConfSubscription,
    poller: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DbQueue {
    /// Start the poller and return the queue.
    ///
    /// The `conf` high-water mark is taken now, so configuration changes
    /// pushed before startup are not replayed.
    pub async fn start(db: Database, options: DbQueueOptions) -> Result<Self, DbotError> {
        let conf_mark = rows::high_water_mark(&db, CONF).await?;
        let channels = Arc::new(LocalChannels::new(CHANNEL_CAPACITY));
        let conf = channels.subscribe_conf();
        let poller = Poller {
            db: db.clone(),
            channels: Arc::clone(&channels),
            options,
            conf_mark,
        };
        let handle = tokio::spawn(poller.run());
        Ok(Self {
            db,
            channels,
            conf,
            poller: std::sync::Mutex::new(Some(handle)),
        })
    }

    async fn push(&self, message_type: &str, name: &str, body: String) -> Result<(), DbotError> {
        if self.channels.is_closed() {
            return Err(DbotError::Closed);
        }
        let id = rows::enqueue(&self.db, message_type, name, &body).await?;
        debug!(queue = %message_type, name = %name, id, "row enqueued");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for DbQueue {
    fn name(&self) -> &str {
        "db"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        if self.channels.is_closed() {
            return Ok(HealthStatus::Unhealthy("queue closed".into()));
        }
        rows::high_water_mark(&self.db, WORK).await?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        self.close().await?;
        let handle = self
            .poller
            .lock()
            .map_err(|_| DbotError::Internal("poller handle lock poisoned".into()))?
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "queue poller ended abnormally");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Queue for DbQueue {
    async fn push_conf(&self, conf: &Configuration) -> Result<(), DbotError> {
        self.push(CONF, "", codec::to_json(conf)?).await
    }

    async fn pop_conf(&self, timeout: Option<Duration>) -> Result<Configuration, DbotError> {
        self.channels.recv_conf(&self.conf, timeout).await
    }

    async fn push_message(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.push(MESSAGE, "", codec::to_json(request)?).await
    }

    async fn pop_message(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.channels.recv_message(timeout).await
    }

    async fn push_work(&self, request: &WorkRequest) -> Result<(), DbotError> {
        self.push(WORK, "", codec::to_json(request)?).await
    }

    async fn pop_work(&self, timeout: Option<Duration>) -> Result<WorkRequest, DbotError> {
        self.channels.recv_work(timeout).await
    }

    async fn push_work_reply(&self, reply_queue: &str, reply: &WorkReply) -> Result<(), DbotError> {
        self.push(REPLY, reply_queue, codec::to_json(reply)?).await
    }

    async fn pop_work_reply(
        &self,
        reply_queue: &str,
        timeout: Option<Duration>,
    ) -> Result<WorkReply, DbotError> {
        self.channels.recv_reply(reply_queue, timeout).await
    }

    async fn close(&self) -> Result<(), DbotError> {
        self.channels.close();
        Ok(())
    }
}

struct Poller {
    db: Database,
    channels: Arc<LocalChannels>,
    options: DbQueueOptions,
    conf_mark: i64,
}

impl Poller {
    async fn run(mut self) {
        let cancel = self.channels.cancel_token().clone();
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("queue poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        if e.is_closed() {
                            return;
                        }
                        error!(error = %e, "queue poll failed, will retry");
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self) -> Result<(), DbotError> {
        if self.options.consume_work {
            for request in self.claim::<WorkRequest>(WORK, "").await? {
                self.channels.send_work(request).await?;
            }
        }
        if self.options.consume_messages {
            for request in self.claim::<WorkRequest>(MESSAGE, "").await? {
                self.channels.send_message(request).await?;
            }
        }
        if self.options.consume_replies {
            let mut names = self.channels.reply_names();
            if !names.contains(&self.options.reply_name) {
                names.push(self.options.reply_name.clone());
            }
            for name in names {
                for reply in self.claim::<WorkReply>(REPLY, &name).await? {
                    self.channels.send_reply(&name, reply).await?;
                }
            }
        }
        if self.options.follow_conf {
            for row in rows::after(&self.db, CONF, self.conf_mark).await? {
                self.conf_mark = row.id;
                match codec::from_json::<Configuration>(&row.message) {
                    Ok(conf) => self.channels.send_conf(conf)?,
                    Err(e) => warn!(queue = CONF, id = row.id, error = %e, "dropping malformed row"),
                }
            }
        }
        let cutoff = Utc::now()
            - chrono::Duration::from_std(RETENTION).unwrap_or_else(|_| chrono::Duration::minutes(6));
        let purged = rows::purge(&self.db, cutoff).await?;
        if purged > 0 {
            debug!(purged, "queue rows purged");
        }
        Ok(())
    }

    /// Claim rows and decode them, dropping the ones that fail to decode.
    async fn claim<T: DeserializeOwned>(
        &self,
        message_type: &str,
        name: &str,
    ) -> Result<Vec<T>, DbotError> {
        let claimed = rows::claim(&self.db, message_type, name, CLAIM_BATCH).await?;
        Ok(claimed
            .into_iter()
            .filter_map(|row| match codec::from_json::<T>(&row.message) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(queue = %message_type, id = row.id, error = %e, "dropping malformed row");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(reply_name: &str) -> DbQueueOptions {
        DbQueueOptions {
            poll_interval: Duration::from_millis(20),
            consume_work: true,
            consume_messages: true,
            follow_conf: true,
            consume_replies: true,
            reply_name: reply_name.into(),
        }
    }

    #[tokio::test]
    async fn work_flows_through_the_table() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("q.db").to_str().unwrap())
            .await
            .unwrap();
        let queue = DbQueue::start(db, options("bot-1")).await.unwrap();

        let request = WorkRequest {
            message_id: "1.1".into(),
            reply_queue: "bot-1".into(),
            ..WorkRequest::default()
        };
        queue.push_work(&request).await.unwrap();
        let popped = queue.pop_work(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(popped, request);

        let reply = WorkReply::for_request(&request);
        queue.push_work_reply("bot-1", &reply).await.unwrap();
        let got = queue
            .pop_work_reply("bot-1", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(got.message_id, "1.1");
        queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn conf_pushed_before_start_is_not_replayed() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("q.db").to_str().unwrap())
            .await
            .unwrap();
        rows::enqueue(&db, CONF, "", &codec::to_json(&Configuration::default()).unwrap())
            .await
            .unwrap();
        let queue = DbQueue::start(db, options("bot-1")).await.unwrap();
        let err = queue
            .pop_conf(Some(Duration::from_millis(150)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let conf = Configuration {
            team: "T1".into(),
            im: true,
            ..Configuration::default()
        };
        queue.push_conf(&conf).await.unwrap();
        let got = queue.pop_conf(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(got.team, "T1");
        queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_rows_are_dropped() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("q.db").to_str().unwrap())
            .await
            .unwrap();
        rows::enqueue(&db, WORK, "", "{not json").await.unwrap();
        let queue = DbQueue::start(db.clone(), options("bot-1")).await.unwrap();
        let err = queue
            .pop_work(Some(Duration::from_millis(150)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        // The poisoned row was consumed, not retried.
        assert!(rows::claim(&db, WORK, "", 10).await.unwrap().is_empty());
        queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn push_after_close_fails() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("q.db").to_str().unwrap())
            .await
            .unwrap();
        let queue = DbQueue::start(db, options("bot-1")).await.unwrap();
        queue.close().await.unwrap();
        let err = queue.push_work(&WorkRequest::default()).await.unwrap_err();
        assert!(err.is_closed());
        assert!(queue.pop_work(None).await.unwrap_err().is_closed());
    }
}
