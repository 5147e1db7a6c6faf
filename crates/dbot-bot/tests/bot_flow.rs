// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot event and reply handling against a recording chat client, a real
//! SQLite repository and the in-memory queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbot_bot::routing::{Poster, choose_client};
use dbot_bot::{Bot, InboundEvent, event_channel};
use dbot_config::DbotConfig;
use dbot_core::chat::{
    AuthTest, Conversation, FileInfo, HistoryMessage, OAuthAccess, PostMessage, TeamInfo, UserInfo,
};
use dbot_core::domain::{
    Configuration, Context, FileRef, FileReply, HashReply, RequestKind, Team, UrlReply, User,
    UserStatus, WorkReply,
};
use dbot_core::event::{Event, FileEvent, MessageEvent};
use dbot_core::{ChatClient, ChatConnector, DbotError, Queue, ReplyType, Repo, Verdict};
use dbot_queue::MemoryQueue;
use dbot_storage::SqliteRepo;
use dbot_vault::Vault;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

const KEY: &str = "0123456789abcdef0123456789abcdef";
const TEAM: &str = "T123";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Post { token: String, message: PostMessage },
    Comment { token: String, file: String, text: String },
    Reaction { token: String, name: String, file: String },
    Invite { token: String, channel: String, users: String },
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
    conversations: Vec<Conversation>,
    /// Panic inside the next `post_message`.
    explode_next_post: AtomicBool,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn posts(&self) -> Vec<(String, PostMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Post { token, message } => Some((token, message)),
                _ => None,
            })
            .collect()
    }
}

struct RecordingClient {
    token: String,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl ChatClient for RecordingClient {
    async fn post_message(&self, message: &PostMessage) -> Result<String, DbotError> {
        if self.recorder.explode_next_post.swap(false, Ordering::SeqCst) {
            panic!("chat client blew up");
        }
        self.recorder.calls.lock().unwrap().push(Call::Post {
            token: self.token.clone(),
            message: message.clone(),
        });
        Ok("1500000000.000100".into())
    }

    async fn file_info(&self, _file_id: &str) -> Result<FileInfo, DbotError> {
        Ok(FileInfo::default())
    }

    async fn file_add_comment(&self, file_id: &str, comment: &str) -> Result<(), DbotError> {
        self.recorder.calls.lock().unwrap().push(Call::Comment {
            token: self.token.clone(),
            file: file_id.into(),
            text: comment.into(),
        });
        Ok(())
    }

    async fn reactions_add(&self, name: &str, file_id: &str) -> Result<(), DbotError> {
        self.recorder.calls.lock().unwrap().push(Call::Reaction {
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

    async fn user_info(&self, _user: &str) -> Result<UserInfo, DbotError> {
        Ok(UserInfo::default())
    }

    async fn list_conversations(&self, _types: &str) -> Result<Vec<Conversation>, DbotError> {
        Ok(self.recorder.conversations.clone())
    }

    async fn conversations_invite(&self, channel: &str, users: &str) -> Result<(), DbotError> {
        self.recorder.calls.lock().unwrap().push(Call::Invite {
            token: self.token.clone(),
            channel: channel.into(),
            users: users.into(),
        });
        Ok(())
    }
}

struct RecordingConnector(Arc<Recorder>);

#[async_trait]
impl ChatConnector for RecordingConnector {
    fn client(&self, token: &str) -> Arc<dyn ChatClient> {
        Arc::new(RecordingClient {
            token: token.into(),
            recorder: self.0.clone(),
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
            message: "not used".into(),
            source: None,
        })
    }
}

struct Fixture {
    bot: Arc<Bot>,
    repo: Arc<dyn Repo>,
    queue: Arc<MemoryQueue>,
    recorder: Arc<Recorder>,
    _dir: TempDir,
}

fn team() -> Team {
    Team {
        id: "t-1".into(),
        name: "Acme".into(),
        external_id: TEAM.into(),
        bot_user_id: "UBOT".into(),
        bot_token: "xoxb-bot".into(),
        vt_key: "team-vt-key".into(),
        created: Some(Utc::now()),
        ..Team::default()
    }
}

fn user(id: &str, external: &str) -> User {
    User {
        id: id.into(),
        team: "t-1".into(),
        name: format!("user-{id}"),
        external_id: external.into(),
        token: format!("xoxp-{external}"),
        is_admin: true,
        created: Some(Utc::now()),
        ..User::default()
    }
}

async fn fixture_with(dedup: bool, conversations: Vec<Conversation>) -> Fixture {
    fixture_subscribed(dedup, conversations, Configuration::all_channels("t-1")).await
}

async fn fixture_subscribed(
    dedup: bool,
    conversations: Vec<Conversation>,
    subscription: Configuration,
) -> Fixture {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dbot.db");
    let repo = SqliteRepo::open(path.to_str().unwrap(), Vault::new(KEY).unwrap())
        .await
        .unwrap();
    repo.set_team_and_user(&team(), &user("u-1", "U1")).await.unwrap();
    repo.set_channels_and_groups(&subscription).await.unwrap();
    let repo: Arc<dyn Repo> = Arc::new(repo);
    let queue = Arc::new(MemoryQueue::new());
    let recorder = Arc::new(Recorder {
        conversations,
        ..Recorder::default()
    });
    let config = DbotConfig {
        external_address: "https://dbot.example".into(),
        dedup,
        ..DbotConfig::default()
    };
    let bot = Bot::new(
        Arc::new(config),
        repo.clone(),
        queue.clone(),
        Arc::new(RecordingConnector(recorder.clone())),
        "bot-reply",
    )
    .await
    .unwrap();
    Fixture {
        bot,
        repo,
        queue,
        recorder,
        _dir: dir,
    }
}

async fn fixture() -> Fixture {
    fixture_with(false, Vec::new()).await
}

fn message(channel: &str, user: &str, text: &str, ts: &str) -> Event {
    Event::Message(MessageEvent {
        channel: channel.into(),
        user: user.into(),
        text: text.into(),
        ts: ts.into(),
    })
}

fn context(channel: &str) -> Context {
    Context {
        team: TEAM.into(),
        user: "U1".into(),
        original_user: "U1".into(),
        channel: channel.into(),
        event_type: "message".into(),
    }
}

fn dirty_url_reply(ts: &str) -> WorkReply {
    let mut kind = ReplyType::empty();
    kind.insert(ReplyType::URL);
    WorkReply {
        kind,
        message_id: ts.into(),
        urls: vec![UrlReply {
            details: "http://evil.example/payload".into(),
            result: Verdict::Dirty,
            ..UrlReply::default()
        }],
        context: context("C1"),
        ..WorkReply::default()
    }
}

async fn no_work(queue: &MemoryQueue) -> bool {
    queue
        .pop_work(Some(Duration::from_millis(50)))
        .await
        .is_err_and(|e| e.is_timeout())
}

#[tokio::test]
async fn help_command_answers_without_work() {
    let f = fixture().await;
    f.bot
        .handle_event(TEAM, message("D1", "U1", "help", "1.1"))
        .await
        .unwrap();

    let posts = f.recorder.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].0, "xoxb-bot");
    assert_eq!(posts[0].1.channel, "D1");
    assert!(posts[0].1.text.contains("verbose on"));
    assert!(no_work(&f.queue).await);
    assert_eq!(f.bot.stats().snapshot("t-1").await.unwrap().messages, 1);
}

#[tokio::test]
async fn message_with_indicator_becomes_work() {
    let f = fixture().await;
    f.bot
        .handle_event(TEAM, message("C1", "U1", "look at http://evil.example/x", "1.2"))
        .await
        .unwrap();

    let request = f.queue.pop_work(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(request.kind, RequestKind::Message);
    assert_eq!(request.message_id, "1.2");
    assert_eq!(request.reply_queue, "bot-reply");
    assert_eq!(request.context.team, TEAM);
    assert_eq!(request.context.original_user, "U1");
    assert_eq!(request.vt_key, "team-vt-key");
    assert!(f.bot.stats().snapshot("t-1").await.is_none());
}

#[tokio::test]
async fn dedup_mode_routes_through_message_queue() {
    let f = fixture_with(true, Vec::new()).await;
    f.bot
        .handle_event(TEAM, message("C1", "U1", "8.8.8.8", "1.3"))
        .await
        .unwrap();

    let request = f.queue.pop_message(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(request.text, "8.8.8.8");
    assert!(no_work(&f.queue).await);
}

#[tokio::test]
async fn plain_message_is_only_counted() {
    let f = fixture().await;
    f.bot
        .handle_event(TEAM, message("C1", "U1", "good morning", "1.4"))
        .await
        .unwrap();

    assert!(no_work(&f.queue).await);
    assert_eq!(f.bot.stats().snapshot("t-1").await.unwrap().messages, 1);
}

#[tokio::test]
async fn own_messages_are_ignored() {
    let f = fixture().await;
    f.bot
        .handle_event(TEAM, message("C1", "UBOT", "http://evil.example", "1.5"))
        .await
        .unwrap();

    assert!(no_work(&f.queue).await);
    assert!(f.bot.stats().snapshot("t-1").await.is_none());
    assert!(f.recorder.calls().is_empty());
}

fn channel(id: &str, name: &str) -> Conversation {
    Conversation {
        id: id.into(),
        name: name.into(),
        is_channel: true,
        is_member: true,
        ..Conversation::default()
    }
}

#[tokio::test]
async fn pattern_only_subscription_skips_unmatched_channels() {
    let subscription = Configuration {
        team: "t-1".into(),
        regexp: "^sec".into(),
        ..Configuration::default()
    };
    let conversations = vec![channel("C999", "random"), channel("C7", "sec-alerts")];
    let f = fixture_subscribed(false, conversations, subscription).await;

    f.bot
        .handle_event(
            TEAM,
            message("C999", "U1", "ping 8.8.8.8 d41d8cd98f00b204e9800998ecf8427e", "1.7"),
        )
        .await
        .unwrap();
    assert!(no_work(&f.queue).await);
    assert!(f.recorder.calls().is_empty());

    f.bot
        .handle_event(TEAM, message("C7", "U1", "ping 8.8.8.8", "1.8"))
        .await
        .unwrap();
    let request = f.queue.pop_work(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(request.context.channel, "C7");
}

#[tokio::test]
async fn empty_subscription_monitors_nothing() {
    let subscription = Configuration {
        team: "t-1".into(),
        ..Configuration::default()
    };
    let f = fixture_subscribed(false, vec![channel("C999", "random")], subscription).await;

    for (channel, ts) in [("C999", "1.9"), ("G5", "1.10"), ("D1", "1.11")] {
        f.bot
            .handle_event(TEAM, message(channel, "U1", "ping 8.8.8.8", ts))
            .await
            .unwrap();
    }
    assert!(no_work(&f.queue).await);
    assert!(f.recorder.calls().is_empty());
}

#[tokio::test]
async fn file_share_carries_bot_token() {
    let f = fixture().await;
    let event = Event::FileShare(FileEvent {
        channel: "C1".into(),
        user: "U1".into(),
        ts: String::new(),
        file: FileRef {
            id: "F1".into(),
            url: "https://files.example/F1".into(),
            name: "invoice.pdf".into(),
            size: 1024,
            token: String::new(),
        },
    });
    f.bot.handle_event(TEAM, event).await.unwrap();

    let request = f.queue.pop_work(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(request.kind, RequestKind::File);
    assert_eq!(request.message_id, "F1");
    assert_eq!(request.file.unwrap().token, "xoxb-bot");
}

#[tokio::test]
async fn dirty_reply_is_posted_with_one_time_announcement() {
    let f = fixture().await;
    f.bot.handle_reply(dirty_url_reply("2.1")).await.unwrap();
    f.bot.handle_reply(dirty_url_reply("2.2")).await.unwrap();

    let posts = f.recorder.posts();
    assert_eq!(posts.len(), 3);
    assert!(posts.iter().all(|(token, _)| token == "xoxp-U1"));
    assert_eq!(posts[0].1.text, "<@U1> has added <@UBOT> to monitor this channel");
    assert!(posts[1].1.text.starts_with("Security check by DBot"));
    assert_eq!(posts[1].1.attachments[0].color, "danger");
    assert!(posts[2].1.text.starts_with("Security check by DBot"));

    let stats = f.bot.stats().snapshot("t-1").await.unwrap();
    assert_eq!(stats.urls.dirty, 2);
    let stored = f.repo.was_message_sent_on_channel("t-1", "C1").await.unwrap();
    assert!(stored);
}

#[tokio::test]
async fn clean_reply_in_quiet_channel_is_not_posted() {
    let f = fixture().await;
    let mut reply = dirty_url_reply("2.3");
    reply.urls[0].result = Verdict::Clean;
    f.bot.handle_reply(reply).await.unwrap();

    assert!(f.recorder.posts().is_empty());
    assert_eq!(f.bot.stats().snapshot("t-1").await.unwrap().urls.clean, 1);
}

#[tokio::test]
async fn oversized_file_gets_comment_and_reaction() {
    let f = fixture().await;
    let mut kind = ReplyType::empty();
    kind.insert(ReplyType::FILE);
    let reply = WorkReply {
        kind,
        message_id: "F9".into(),
        file: Some(FileReply {
            details: FileRef {
                id: "F9".into(),
                name: "huge.iso".into(),
                size: 900 * 1024 * 1024,
                ..FileRef::default()
            },
            file_too_large: true,
            ..FileReply::default()
        }),
        hashes: vec![HashReply::default()],
        context: context("C1"),
        ..WorkReply::default()
    };
    f.bot.handle_reply(reply).await.unwrap();

    let calls = f.recorder.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        Call::Comment { file, text, .. } if file == "F9" && text.contains("too large")
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        Call::Reaction { name, file, .. } if name == "warning" && file == "F9"
    )));
    assert!(!f.recorder.posts().is_empty());
}

#[tokio::test]
async fn choose_client_prefers_original_user_then_user_then_bot() {
    let f = fixture().await;
    let connector = RecordingConnector(f.recorder.clone());
    let team = team();

    let chosen = choose_client(f.repo.as_ref(), &connector, &team, &context("C1"))
        .await
        .unwrap();
    assert!(matches!(chosen.poster, Poster::OriginalUser(ref u) if u.external_id == "U1"));

    let ctx = Context {
        original_user: "UNKNOWN".into(),
        ..context("C1")
    };
    let chosen = choose_client(f.repo.as_ref(), &connector, &team, &ctx).await.unwrap();
    assert!(matches!(chosen.poster, Poster::User(_)));

    let mut blocked = user("u-2", "U2");
    blocked.status = UserStatus::Deleted;
    f.repo.set_user(&blocked).await.unwrap();
    let ctx = Context {
        user: "U2".into(),
        original_user: "U2".into(),
        ..context("C1")
    };
    let chosen = choose_client(f.repo.as_ref(), &connector, &team, &ctx).await.unwrap();
    assert_eq!(chosen.poster, Poster::Bot);

    let tokenless = Team {
        bot_token: String::new(),
        ..team.clone()
    };
    let ctx = Context {
        user: "UX".into(),
        original_user: "UX".into(),
        ..context("C1")
    };
    assert!(choose_client(f.repo.as_ref(), &connector, &tokenless, &ctx).await.is_err());
}

#[tokio::test]
async fn verbose_command_persists_and_notifies() {
    let f = fixture_with(false, vec![channel("C42", "security")]).await;
    f.bot
        .handle_event(TEAM, message("D1", "U1", "verbose on #security", "3.1"))
        .await
        .unwrap();

    let saved = f.repo.channels_and_groups("t-1").await.unwrap();
    assert_eq!(saved.verbose_channels, vec!["C42".to_string()]);
    let pushed = f.queue.pop_conf(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(pushed.team, "t-1");
    assert_eq!(f.recorder.posts().len(), 1);
}

#[tokio::test]
async fn flush_writes_statistics() {
    let f = fixture().await;
    f.bot
        .handle_event(TEAM, message("C1", "U1", "nothing here", "4.1"))
        .await
        .unwrap();
    f.bot
        .handle_event(TEAM, message("C1", "U1", "still nothing", "4.2"))
        .await
        .unwrap();

    assert_eq!(f.bot.stats().flush(&f.repo).await, 1);
    assert_eq!(f.repo.total_messages().await.unwrap(), 2);
    assert!(f.bot.stats().snapshot("t-1").await.is_none());
}

#[tokio::test]
async fn failed_flush_keeps_counts_for_the_next_one() {
    let f = fixture().await;
    f.bot
        .handle_event(TEAM, message("C1", "U1", "nothing here", "4.3"))
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let broken = SqliteRepo::open(
        dir.path().join("broken.db").to_str().unwrap(),
        Vault::new(KEY).unwrap(),
    )
    .await
    .unwrap();
    broken.database().clone().close().await.unwrap();
    let broken: Arc<dyn Repo> = Arc::new(broken);

    assert_eq!(f.bot.stats().flush(&broken).await, 0);
    assert_eq!(f.bot.stats().snapshot("t-1").await.unwrap().messages, 1);

    f.bot
        .handle_event(TEAM, message("C1", "U1", "still nothing", "4.4"))
        .await
        .unwrap();
    assert_eq!(f.bot.stats().flush(&f.repo).await, 1);
    assert_eq!(f.repo.total_messages().await.unwrap(), 2);
}

#[tokio::test]
async fn run_loop_consumes_events_and_replies() {
    let f = fixture().await;
    let (tx, rx) = event_channel();
    let cancel = CancellationToken::new();
    let running = tokio::spawn(f.bot.clone().run(rx, cancel.clone()));

    tx.send(InboundEvent {
        team_id: TEAM.into(),
        event: message("C1", "U1", "check 1.2.3.4", "5.1"),
    })
    .await
    .unwrap();
    let request = f.queue.pop_work(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(request.message_id, "5.1");

    f.queue
        .push_work_reply("bot-reply", &dirty_url_reply("5.1"))
        .await
        .unwrap();
    for _ in 0..50 {
        if f.recorder.posts().len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(f.recorder.posts().len(), 2);

    cancel.cancel();
    running.await.unwrap();
    assert_eq!(f.repo.total_messages().await.unwrap(), 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn panicking_handler_does_not_stop_the_event_loop() {
    let f = fixture().await;
    f.recorder.explode_next_post.store(true, Ordering::SeqCst);
    let (tx, rx) = event_channel();
    let cancel = CancellationToken::new();
    let running = tokio::spawn(f.bot.clone().run(rx, cancel.clone()));

    for ts in ["6.1", "6.2"] {
        tx.send(InboundEvent {
            team_id: TEAM.into(),
            event: message("D1", "U1", "help", ts),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    for _ in 0..50 {
        if !f.recorder.posts().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let posts = f.recorder.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].1.channel, "D1");
    assert!(logs_contain("handler panicked"));

    cancel.cancel();
    running.await.unwrap();
    assert!(logs_contain("bot stopped"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn broadcast_configuration_is_applied_and_logged() {
    let f = fixture().await;
    let (_tx, rx) = event_channel();
    let cancel = CancellationToken::new();
    let running = tokio::spawn(f.bot.clone().run(rx, cancel.clone()));

    let conf = Configuration {
        team: "t-1".into(),
        channels: vec!["C9".into()],
        ..Configuration::default()
    };
    f.queue.push_conf(&conf).await.unwrap();
    for _ in 0..50 {
        if logs_contain("configuration updated") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(logs_contain("configuration updated"));

    cancel.cancel();
    running.await.unwrap();
    assert!(logs_contain("bot stopped"));
}
