// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process channels shared by the memory and database backings.
//!
//! `message` and `work` are bounded FIFO channels whose receivers sit behind
//! a mutex, so competing poppers are served one message each. `conf` is a
//! broadcast: every [`ConfSubscription`] sees every configuration pushed
//! after it was taken.
//!
//! Reply channels are bounded too. They are created on first use per
//! reply-queue name and released when a pop finishes with nobody else
//! waiting on or sending to that name. A channel nobody has touched for
//! [`REPLY_IDLE_TTL`] is dropped with whatever it still holds.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dbot_core::DbotError;
use dbot_core::domain::{Configuration, WorkReply, WorkRequest};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of each bounded channel.
pub const CHANNEL_CAPACITY: usize = 100;

/// Reply channels idle this long with no popper are dropped.
pub const REPLY_IDLE_TTL: Duration = Duration::from_secs(300);

/// Minimum spacing between idle sweeps.
const SWEEP_EVERY: Duration = Duration::from_secs(60);

struct Topic<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
}

impl<T> Topic<T> {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

struct ReplyChannel {
    // Both ends are shared through `Arc` so the map can tell whether a
    // popper or a sender is still using the channel.
    tx: Arc<mpsc::Sender<WorkReply>>,
    rx: Arc<Mutex<mpsc::Receiver<WorkReply>>>,
    last_used: Instant,
}

impl ReplyChannel {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: Arc::new(tx),
            rx: Arc::new(Mutex::new(rx)),
            last_used: Instant::now(),
        }
    }

    /// Nobody but the map holds either end.
    fn unused(&self) -> bool {
        Arc::strong_count(&self.rx) == 1 && Arc::strong_count(&self.tx) == 1
    }
}

/// One consumer's view of the `conf` broadcast.
pub(crate) struct ConfSubscription {
    rx: Mutex<broadcast::Receiver<Configuration>>,
}

/// The four logical topics as in-process channels.
pub(crate) struct LocalChannels {
    capacity: usize,
    conf: broadcast::Sender<Configuration>,
    message: Topic<WorkRequest>,
    work: Topic<WorkRequest>,
    replies: DashMap<String, ReplyChannel>,
    last_sweep: std::sync::Mutex<Instant>,
    cancel: CancellationToken,
}

impl LocalChannels {
    pub(crate) fn new(capacity: usize) -> Self {
        let (conf, _) = broadcast::channel(capacity);
        Self {
            capacity,
            conf,
            message: Topic::new(capacity),
            work: Topic::new(capacity),
            replies: DashMap::new(),
            last_sweep: std::sync::Mutex::new(Instant::now()),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }

    /// Reply-queue names with a channel currently allocated.
    pub(crate) fn reply_names(&self) -> Vec<String> {
        self.replies.iter().map(|e| e.key().clone()).collect()
    }

    /// Start receiving configurations pushed from now on.
    pub(crate) fn subscribe_conf(&self) -> ConfSubscription {
        ConfSubscription {
            rx: Mutex::new(self.conf.subscribe()),
        }
    }

    /// Broadcast `conf` to every subscription. Never blocks; a subscriber
    /// more than a channel's capacity behind skips the oldest entries.
    pub(crate) fn send_conf(&self, conf: Configuration) -> Result<(), DbotError> {
        if self.is_closed() {
            return Err(DbotError::Closed);
        }
        if self.conf.send(conf).is_err() {
            debug!("configuration pushed with no subscriber");
        }
        Ok(())
    }

    pub(crate) async fn recv_conf(
        &self,
        subscription: &ConfSubscription,
        timeout: Option<Duration>,
    ) -> Result<Configuration, DbotError> {
        self.wait(
            async {
                let mut rx = subscription.rx.lock().await;
                loop {
                    match rx.recv().await {
                        Ok(conf) => return Some(conf),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "configuration subscriber lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
            timeout,
        )
        .await
    }

    pub(crate) async fn send_message(&self, request: WorkRequest) -> Result<(), DbotError> {
        self.send(&self.message, request).await
    }

    pub(crate) async fn recv_message(
        &self,
        timeout: Option<Duration>,
    ) -> Result<WorkRequest, DbotError> {
        self.recv(&self.message, timeout).await
    }

    pub(crate) async fn send_work(&self, request: WorkRequest) -> Result<(), DbotError> {
        self.send(&self.work, request).await
    }

    pub(crate) async fn recv_work(
        &self,
        timeout: Option<Duration>,
    ) -> Result<WorkRequest, DbotError> {
        self.recv(&self.work, timeout).await
    }

    /// Deliver `reply` to the channel named `name`, creating it if needed.
    /// Blocks while that channel is full.
    pub(crate) async fn send_reply(&self, name: &str, reply: WorkReply) -> Result<(), DbotError> {
        if self.is_closed() {
            return Err(DbotError::Closed);
        }
        self.sweep_idle();
        // Holding a sender clone keeps `release` and `sweep_idle` away from
        // this channel until the send completes.
        let tx = {
            let mut entry = self
                .replies
                .entry(name.to_string())
                .or_insert_with(|| ReplyChannel::new(self.capacity));
            entry.last_used = Instant::now();
            Arc::clone(&entry.tx)
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DbotError::Closed),
            sent = tx.send(reply) => sent.map_err(|_| DbotError::Closed),
        }
    }

    pub(crate) async fn recv_reply(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<WorkReply, DbotError> {
        self.sweep_idle();
        let rx = {
            let mut entry = self
                .replies
                .entry(name.to_string())
                .or_insert_with(|| ReplyChannel::new(self.capacity));
            entry.last_used = Instant::now();
            Arc::clone(&entry.rx)
        };
        let result = self
            .wait(
                async {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                },
                timeout,
            )
            .await;
        drop(rx);
        self.release(name);
        result
    }

    /// Drop the channel for `name` if it is empty and nobody else uses it.
    fn release(&self, name: &str) {
        self.replies.remove_if(name, |_, ch| {
            ch.unused() && ch.rx.try_lock().map(|r| r.is_empty()).unwrap_or(false)
        });
    }

    /// Drop reply channels nobody touched for [`REPLY_IDLE_TTL`].
    fn sweep_idle(&self) {
        let now = Instant::now();
        {
            let Ok(mut last) = self.last_sweep.lock() else {
                return;
            };
            if now.duration_since(*last) < SWEEP_EVERY {
                return;
            }
            *last = now;
        }
        self.replies.retain(|name, ch| {
            let idle = ch.unused() && now.duration_since(ch.last_used) >= REPLY_IDLE_TTL;
            if idle {
                debug!(reply_queue = %name, "dropping idle reply channel");
            }
            !idle
        });
    }

    async fn send<T>(&self, topic: &Topic<T>, value: T) -> Result<(), DbotError> {
        if self.is_closed() {
            return Err(DbotError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DbotError::Closed),
            sent = topic.tx.send(value) => sent.map_err(|_| DbotError::Closed),
        }
    }

    async fn recv<T>(&self, topic: &Topic<T>, timeout: Option<Duration>) -> Result<T, DbotError> {
        self.wait(
            async {
                let mut guard = topic.rx.lock().await;
                guard.recv().await
            },
            timeout,
        )
        .await
    }

    /// Await `next` until it yields, `timeout` elapses or the channels close.
    async fn wait<T>(
        &self,
        next: impl Future<Output = Option<T>>,
        timeout: Option<Duration>,
    ) -> Result<T, DbotError> {
        if self.is_closed() {
            return Err(DbotError::Closed);
        }
        let bounded = async {
            match timeout {
                Some(duration) => tokio::time::timeout(duration, next)
                    .await
                    .map_err(|_| DbotError::Timeout { duration }),
                None => Ok(next.await),
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DbotError::Closed),
            received = bounded => received?.ok_or(DbotError::Closed),
        }
    }
}
