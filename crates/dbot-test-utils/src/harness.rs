// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process harness for end-to-end tests.
//!
//! `TestHarness` runs the bot, the dedup stage and the worker against one
//! in-memory queue, a temp SQLite repository, the mock chat platform and
//! scripted oracles. Tests drive it with `send_event()` and observe what the
//! bot posted through `chat`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dbot_bot::{Bot, InboundEvent, event_channel};
use dbot_config::DbotConfig;
use dbot_core::domain::{Configuration, Team, User};
use dbot_core::event::Event;
use dbot_core::{DbotError, MalwareScanner, Queue, Repo, XfeCredentials};
use dbot_queue::MemoryQueue;
use dbot_storage::SqliteRepo;
use dbot_vault::Vault;
use dbot_worker::{Worker, WorkerOptions};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::mock_chat::MockChat;
use crate::mock_oracles::{MockScanner, MockVt, MockXfe};

/// Vault key of the harness repository.
pub const HARNESS_KEY: &str = "0123456789abcdef0123456789abcdef";
/// External id of the seeded team.
pub const HARNESS_TEAM: &str = "T123";
/// External id of the seeded bot user.
pub const HARNESS_BOT: &str = "UBOT";
/// External id of the seeded human user.
pub const HARNESS_USER: &str = "U1";

/// Builder for a [`TestHarness`].
pub struct TestHarnessBuilder {
    dedup: bool,
    file_size_limit: u64,
    scanner: Option<Arc<MockScanner>>,
    xfe: Arc<MockXfe>,
    vt: Arc<MockVt>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            dedup: false,
            file_size_limit: 10 * 1024 * 1024,
            scanner: None,
            xfe: Arc::new(MockXfe::new()),
            vt: Arc::new(MockVt::new()),
        }
    }

    /// Route messages through the dedup stage.
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    /// Largest file the worker downloads.
    pub fn with_file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = limit;
        self
    }

    /// Scan downloaded files with `scanner`.
    pub fn with_scanner(mut self, scanner: MockScanner) -> Self {
        self.scanner = Some(Arc::new(scanner));
        self
    }

    /// Use pre-scripted X-Force answers.
    pub fn with_xfe(mut self, xfe: MockXfe) -> Self {
        self.xfe = Arc::new(xfe);
        self
    }

    /// Use pre-scripted VirusTotal answers.
    pub fn with_vt(mut self, vt: MockVt) -> Self {
        self.vt = Arc::new(vt);
        self
    }

    /// Seed storage and start every role.
    pub async fn build(self) -> Result<TestHarness, DbotError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| DbotError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("dbot.db");
        let vault = Vault::new(HARNESS_KEY)?;
        let sqlite = SqliteRepo::open(&db_path.to_string_lossy(), vault).await?;
        sqlite.set_team_and_user(&seed_team(), &seed_user()).await?;
        sqlite
            .set_channels_and_groups(&Configuration::all_channels("t-1"))
            .await?;
        let repo: Arc<dyn Repo> = Arc::new(sqlite);

        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new());
        let chat = MockChat::new();
        let config = Arc::new(DbotConfig {
            external_address: "https://dbot.example".into(),
            dedup: self.dedup,
            file_size_limit: self.file_size_limit,
            ..DbotConfig::default()
        });

        let scanner = self
            .scanner
            .clone()
            .map(|s| s as Arc<dyn MalwareScanner>);
        let worker = Arc::new(Worker::new(
            queue.clone(),
            self.xfe.clone(),
            self.vt.clone(),
            scanner,
            WorkerOptions {
                tasks: 2,
                file_size_limit: self.file_size_limit,
                vt_key: "harness-vt".into(),
                xfe: XfeCredentials::default(),
            },
        )?);

        let bot = Bot::new(
            config.clone(),
            repo.clone(),
            queue.clone(),
            Arc::new(chat.clone()),
            "harness-reply",
        )
        .await?;

        let cancel = CancellationToken::new();
        let (events, receiver) = event_channel();
        let mut tasks = vec![
            tokio::spawn(worker.run(cancel.clone())),
            tokio::spawn(bot.clone().run(receiver, cancel.clone())),
        ];
        if self.dedup {
            tasks.push(tokio::spawn(dbot_dedup::run(queue.clone(), cancel.clone())));
        }

        Ok(TestHarness {
            chat,
            xfe: self.xfe,
            vt: self.vt,
            scanner: self.scanner,
            repo,
            queue,
            bot,
            config,
            events,
            cancel,
            tasks,
            _temp_dir: temp_dir,
        })
    }
}

fn seed_team() -> Team {
    Team {
        id: "t-1".into(),
        name: "Acme".into(),
        external_id: HARNESS_TEAM.into(),
        bot_user_id: HARNESS_BOT.into(),
        bot_token: "xoxb-bot".into(),
        created: Some(Utc::now()),
        ..Team::default()
    }
}

fn seed_user() -> User {
    User {
        id: "u-1".into(),
        team: "t-1".into(),
        name: "alice".into(),
        external_id: HARNESS_USER.into(),
        token: "xoxp-U1".into(),
        is_admin: true,
        created: Some(Utc::now()),
        ..User::default()
    }
}

/// A running DBot with mocked edges.
pub struct TestHarness {
    /// Every chat call the bot made.
    pub chat: MockChat,
    pub xfe: Arc<MockXfe>,
    pub vt: Arc<MockVt>,
    pub scanner: Option<Arc<MockScanner>>,
    /// Temp SQLite repository seeded with one team, one user and an
    /// all-channels subscription.
    pub repo: Arc<dyn Repo>,
    pub queue: Arc<dyn Queue>,
    pub bot: Arc<Bot>,
    pub config: Arc<DbotConfig>,
    events: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Deliver `event` as if it came from the seeded team.
    pub async fn send_event(&self, event: Event) -> Result<(), DbotError> {
        self.events
            .send(InboundEvent {
                team_id: HARNESS_TEAM.into(),
                event,
            })
            .await
            .map_err(|_| DbotError::Closed)
    }

    /// Wait up to `timeout` for at least `n` posts.
    pub async fn wait_for_posts(&self, n: usize, timeout: Duration) -> bool {
        self.chat.wait_for_posts(n, timeout).await
    }

    /// Cancel every role and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "harness task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbot_core::event::MessageEvent;

    #[tokio::test]
    async fn help_is_answered_end_to_end() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness
            .send_event(Event::Message(MessageEvent {
                channel: "D1".into(),
                user: HARNESS_USER.into(),
                text: "help".into(),
                ts: "1.0".into(),
            }))
            .await
            .unwrap();
        assert!(harness.wait_for_posts(1, Duration::from_secs(5)).await);
        assert_eq!(harness.chat.posts()[0].channel, "D1");
        harness.shutdown().await;
    }
}
