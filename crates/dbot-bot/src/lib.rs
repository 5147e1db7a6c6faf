// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bot role.
//!
//! [`Bot::run`] drives three cooperative loops: chat events in, work replies
//! back from the workers, and a one-minute ticker that logs a heartbeat and
//! flushes statistics. A fourth loop follows configuration changes pushed by
//! the web tier. Every event and reply is handled in its own task so a panic
//! is logged and the loops carry on.

pub mod commands;
pub mod format;
pub mod routing;
pub mod stats;
pub mod subscription;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dbot_config::DbotConfig;
use dbot_core::chat::{Attachment, PostMessage};
use dbot_core::domain::{
    Context, FileRef, MaliciousContent, RequestKind, WorkReply, WorkRequest,
};
use dbot_core::event::{Event, FileEvent, MessageEvent};
use dbot_core::indicators::has_indicator;
use dbot_core::{ChatConnector, DbotError, Queue, ReplyType, Repo, Verdict};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::commands::Command;
use crate::format::{FileNotice, Links};
use crate::routing::{ChosenClient, choose_client};
use crate::stats::StatsCollector;
use crate::subscription::{Subscription, Subscriptions};

pub use routing::Poster;

/// Interval of the heartbeat and statistics flush.
pub const TICK: Duration = Duration::from_secs(60);
/// How long shutdown waits for in-flight handlers.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 1024;

/// A decoded chat event and the external id of its workspace.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub team_id: String,
    pub event: Event,
}

/// Channel pair feeding [`Bot::run`]; the sender goes to the web tier.
pub fn event_channel() -> (mpsc::Sender<InboundEvent>, mpsc::Receiver<InboundEvent>) {
    mpsc::channel(EVENT_BUFFER)
}

pub struct Bot {
    config: Arc<DbotConfig>,
    repo: Arc<dyn Repo>,
    queue: Arc<dyn Queue>,
    connector: Arc<dyn ChatConnector>,
    reply_name: String,
    subscriptions: Subscriptions,
    stats: StatsCollector,
    tasks: TaskTracker,
}

impl Bot {
    /// Create the bot and load every workspace.
    pub async fn new(
        config: Arc<DbotConfig>,
        repo: Arc<dyn Repo>,
        queue: Arc<dyn Queue>,
        connector: Arc<dyn ChatConnector>,
        reply_name: impl Into<String>,
    ) -> Result<Arc<Self>, DbotError> {
        let subscriptions = Subscriptions::new(repo.clone(), connector.clone());
        subscriptions.load_all().await?;
        Ok(Arc::new(Self {
            config,
            repo,
            queue,
            connector,
            reply_name: reply_name.into(),
            subscriptions,
            stats: StatsCollector::new(),
            tasks: TaskTracker::new(),
        }))
    }

    /// The queue name workers reply to.
    pub fn reply_name(&self) -> &str {
        &self.reply_name
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Run until `cancel` fires, then drain in-flight handlers and flush stats.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<InboundEvent>,
        cancel: CancellationToken,
    ) {
        info!(reply_queue = %self.reply_name, "bot started");
        let loops = [
            tokio::spawn(self.clone().consume_replies(cancel.clone())),
            tokio::spawn(self.clone().follow_configuration(cancel.clone())),
            tokio::spawn(self.clone().tick(cancel.clone())),
        ];

        let mut events_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                ev = events.recv(), if events_open => match ev {
                    Some(InboundEvent { team_id, event }) => {
                        let bot = self.clone();
                        self.guarded("event", async move { bot.handle_event(&team_id, event).await });
                    }
                    None => {
                        debug!("event source closed");
                        events_open = false;
                    }
                },
            }
        }

        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "bot loop failed");
            }
        }
        self.tasks.close();
        if tokio::time::timeout(DRAIN_TIMEOUT, self.tasks.wait()).await.is_err() {
            warn!(pending = self.tasks.len(), "handlers still running at shutdown");
        }
        self.stats.flush(&self.repo).await;
        info!("bot stopped");
    }

    /// Run `fut` in its own task; failures and panics are logged, never propagated.
    fn guarded<F>(&self, what: &'static str, fut: F)
    where
        F: Future<Output = Result<(), DbotError>> + Send + 'static,
    {
        let inner = tokio::spawn(fut);
        self.tasks.spawn(async move {
            match inner.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = what, error = %e, "handler failed"),
                Err(e) if e.is_panic() => error!(task = what, "handler panicked"),
                Err(e) => debug!(task = what, error = %e, "handler cancelled"),
            }
        });
    }

    async fn consume_replies(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.queue.pop_work_reply(&self.reply_name, None) => r,
            };
            match popped {
                Ok(reply) => {
                    let bot = self.clone();
                    self.guarded("reply", async move { bot.handle_reply(reply).await });
                }
                Err(e) if e.is_closed() => break,
                Err(e) => {
                    warn!(error = %e, "unable to pop work reply");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        debug!("reply consumer stopped");
    }

    async fn follow_configuration(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.queue.pop_conf(None) => r,
            };
            match popped {
                Ok(conf) => {
                    let team = conf.team.clone();
                    if self.subscriptions.update_configuration(conf).await {
                        info!(team = %team, "configuration updated");
                    } else {
                        debug!(team = %team, "configuration for a team not loaded here");
                    }
                }
                Err(e) if e.is_closed() => break,
                Err(e) => {
                    warn!(error = %e, "unable to pop configuration");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        debug!("configuration monitor stopped");
    }

    async fn tick(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(TICK);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let teams = self.subscriptions.len().await;
                    info!(teams, "heartbeat");
                    self.stats.flush(&self.repo).await;
                }
            }
        }
    }

    /// Classify one event and act on it.
    pub async fn handle_event(&self, team_id: &str, event: Event) -> Result<(), DbotError> {
        if event == Event::Ignored {
            return Ok(());
        }
        let sub = self.subscriptions.get(team_id).await?;
        let user = event.user().unwrap_or_default().to_string();
        if user.is_empty() || user == sub.team.bot_user_id {
            debug!(team = %team_id, "ignoring own or anonymous event");
            return Ok(());
        }
        let channel = event.channel().unwrap_or_default().to_string();

        if let Event::Message(m) = &event
            && channel.starts_with('D')
            && let Some(command) = Command::parse(&m.text)
        {
            self.run_command(command, &sub, &channel, &m.text).await;
            self.stats.record_message(&sub.team.id).await;
            return Ok(());
        }

        if !channel.is_empty() && !self.interested(&sub, &channel).await {
            debug!(team = %team_id, channel = %channel, "channel not monitored");
            return Ok(());
        }

        let context = Context {
            team: sub.team.external_id.clone(),
            user: user.clone(),
            original_user: user,
            channel,
            event_type: event.event_type().to_string(),
        };
        let request = match &event {
            Event::Message(m) | Event::MessageChanged(m) | Event::FileComment(m) => {
                has_indicator(&m.text).then(|| self.message_request(&sub, m, context))
            }
            Event::FileShare(f) | Event::FileMention(f) | Event::FileCreated(f) => {
                (!f.file.id.is_empty()).then(|| self.file_request(&sub, f, context))
            }
            Event::Ignored => None,
        };
        match request {
            Some(request) => self.submit(&request).await,
            None => {
                self.stats.record_message(&sub.team.id).await;
                Ok(())
            }
        }
    }

    /// Whether the workspace subscribed to `channel`.
    ///
    /// Only an explicit `all` monitors everything; an empty subscription
    /// monitors nothing. A channel-name pattern is resolved against the
    /// conversation list.
    async fn interested(&self, sub: &Subscription, channel: &str) -> bool {
        let conf = &sub.configuration;
        if conf.is_interested_in(channel, "") {
            return true;
        }
        if conf.regexp.is_empty() {
            return false;
        }
        match sub
            .client
            .list_conversations("public_channel,private_channel")
            .await
        {
            Ok(conversations) => conversations
                .iter()
                .find(|c| c.id == channel)
                .is_some_and(|c| conf.is_interested_in(channel, &c.name)),
            Err(e) => {
                warn!(channel = %channel, error = %e, "unable to resolve channel name");
                false
            }
        }
    }

    fn base_request(&self, sub: &Subscription, message_id: String, context: Context) -> WorkRequest {
        WorkRequest {
            message_id,
            reply_queue: self.reply_name.clone(),
            context,
            vt_key: sub.team.vt_key.clone(),
            xfe_key: sub.team.xfe_key.clone(),
            xfe_pass: sub.team.xfe_pass.clone(),
            ..WorkRequest::default()
        }
    }

    fn message_request(&self, sub: &Subscription, m: &MessageEvent, context: Context) -> WorkRequest {
        WorkRequest {
            kind: RequestKind::Message,
            text: m.text.clone(),
            ..self.base_request(sub, m.ts.clone(), context)
        }
    }

    fn file_request(&self, sub: &Subscription, f: &FileEvent, context: Context) -> WorkRequest {
        let message_id = if f.ts.is_empty() { f.file.id.clone() } else { f.ts.clone() };
        WorkRequest {
            kind: RequestKind::File,
            file: Some(FileRef {
                token: sub.team.bot_token.clone(),
                ..f.file.clone()
            }),
            ..self.base_request(sub, message_id, context)
        }
    }

    /// Hand a request to the dedup role when it runs, straight to workers otherwise.
    async fn submit(&self, request: &WorkRequest) -> Result<(), DbotError> {
        debug!(
            team = %request.context.team,
            message_id = %request.message_id,
            kind = ?request.kind,
            "submitting work"
        );
        if self.config.dedup {
            self.queue.push_message(request).await
        } else {
            self.queue.push_work(request).await
        }
    }

    /// Count, store and post one work reply.
    pub async fn handle_reply(&self, reply: WorkReply) -> Result<(), DbotError> {
        let context = reply.context.clone();
        debug!(team = %context.team, message_id = %reply.message_id, "handling reply");
        let sub = self.subscriptions.get(&context.team).await?;
        self.stats.record_reply(&sub.team.id, &reply).await;
        self.store_convicted(&sub, &reply).await;

        let verbose = !context.channel.is_empty() && sub.configuration.is_verbose(&context.channel);
        let links = Links {
            external_address: &self.config.external_address,
            context: &context,
            message_id: &reply.message_id,
        };
        if reply.kind.contains(ReplyType::FILE) {
            let Some(file) = &reply.file else {
                warn!(message_id = %reply.message_id, "file reply without file details");
                return Ok(());
            };
            let notice = format::file_notice(file, reply.hashes.first(), &links, verbose);
            return self.deliver_file(&sub, &context, &file.details.id, notice).await;
        }

        let attachments = format::message_attachments(&reply, &links, verbose);
        if !format::should_post(&attachments, verbose) {
            debug!(message_id = %reply.message_id, "reply clean, not posting");
            return Ok(());
        }
        let chosen = choose_client(self.repo.as_ref(), self.connector.as_ref(), &sub.team, &context)
            .await?;
        self.post(&sub, &context, &chosen, attachments).await
    }

    async fn deliver_file(
        &self,
        sub: &Subscription,
        context: &Context,
        file_id: &str,
        notice: FileNotice,
    ) -> Result<(), DbotError> {
        let chosen = choose_client(self.repo.as_ref(), self.connector.as_ref(), &sub.team, context)
            .await?;
        if !context.channel.is_empty() && notice.post {
            self.post(sub, context, &chosen, notice.attachments).await?;
        }
        if file_id.is_empty() || context.original_user == sub.team.bot_user_id {
            return Ok(());
        }
        chosen.client.file_add_comment(file_id, &notice.comment).await?;
        if let Some(reaction) = notice.reaction
            && let Err(e) = chosen.client.reactions_add(reaction, file_id).await
        {
            warn!(file = %file_id, error = %e, "unable to add reaction");
        }
        Ok(())
    }

    async fn post(
        &self,
        sub: &Subscription,
        context: &Context,
        chosen: &ChosenClient,
        attachments: Vec<Attachment>,
    ) -> Result<(), DbotError> {
        if !context.channel.starts_with('D') {
            self.announce(sub, context, chosen).await;
        }
        let mut message = PostMessage::text(&context.channel, format::main_text(&self.config.external_address));
        message.attachments = attachments;
        chosen.client.post_message(&message).await?;
        Ok(())
    }

    /// Post the one-time "added to monitor" notice if this call wins the insert.
    async fn announce(&self, sub: &Subscription, context: &Context, chosen: &ChosenClient) {
        match self
            .repo
            .message_sent_on_channel(&sub.team.id, &context.channel)
            .await
        {
            Ok(true) => {
                let who = chosen.user_external_id().unwrap_or(&context.user);
                let bot = if sub.team.bot_user_id.is_empty() {
                    "DBot".to_string()
                } else {
                    format!("<@{}>", sub.team.bot_user_id)
                };
                let text = format!("<@{who}> has added {bot} to monitor this channel");
                if let Err(e) = chosen
                    .client
                    .post_message(&PostMessage::text(&context.channel, text))
                    .await
                {
                    warn!(channel = %context.channel, error = %e, "unable to post announcement");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(channel = %context.channel, error = %e, "unable to record first post"),
        }
    }

    async fn store_convicted(&self, sub: &Subscription, reply: &WorkReply) {
        let base = MaliciousContent {
            team: sub.team.id.clone(),
            channel: reply.context.channel.clone(),
            message_id: reply.message_id.clone(),
            ..MaliciousContent::default()
        };
        let mut convicted = Vec::new();
        if reply.kind.contains(ReplyType::FILE) {
            if let Some(file) = reply.file.as_ref().filter(|f| f.result == Verdict::Dirty) {
                let md5 = reply.hashes.first();
                convicted.push(MaliciousContent {
                    message_id: file.details.id.clone(),
                    content_type: ReplyType::FILE.bits(),
                    content: md5.map(|h| h.details.clone()).unwrap_or_default(),
                    file_name: file.details.name.clone(),
                    vt: md5.map(hash_vt_score).unwrap_or_default(),
                    xfe: md5.map(hash_xfe_score).unwrap_or_default(),
                    clamav: file.virus.clone(),
                    ..base.clone()
                });
            }
        } else {
            for h in reply.hashes.iter().filter(|h| h.result == Verdict::Dirty) {
                convicted.push(MaliciousContent {
                    content_type: ReplyType::HASH.bits(),
                    content: h.details.clone(),
                    vt: hash_vt_score(h),
                    xfe: hash_xfe_score(h),
                    ..base.clone()
                });
            }
            for u in reply.urls.iter().filter(|u| u.result == Verdict::Dirty) {
                let vt = u.vt.url_report.as_ref();
                convicted.push(MaliciousContent {
                    content_type: ReplyType::URL.bits(),
                    content: u.details.clone(),
                    vt: vt.map(|r| format!("{} / {}", r.positives, r.total)).unwrap_or_default(),
                    xfe: u
                        .xfe
                        .url_details
                        .as_ref()
                        .map(|d| d.score.to_string())
                        .unwrap_or_default(),
                    ..base.clone()
                });
            }
            for ip in reply.ips.iter().filter(|ip| ip.result == Verdict::Dirty) {
                convicted.push(MaliciousContent {
                    content_type: ReplyType::IP.bits(),
                    content: ip.details.clone(),
                    vt: ip
                        .vt
                        .ip_report
                        .as_ref()
                        .map(|r| r.detected_urls.len().to_string())
                        .unwrap_or_default(),
                    xfe: ip
                        .xfe
                        .ip_reputation
                        .as_ref()
                        .map(|r| r.score.to_string())
                        .unwrap_or_default(),
                    ..base.clone()
                });
            }
        }
        for content in convicted {
            if let Err(e) = self.repo.store_malicious_content(&content).await {
                warn!(team = %sub.team.id, error = %e, "unable to store convicted content");
            }
        }
    }
}

fn hash_vt_score(h: &dbot_core::domain::HashReply) -> String {
    h.vt
        .file_report
        .as_ref()
        .map(|r| format!("{} / {}", r.positives, r.total))
        .unwrap_or_default()
}

fn hash_xfe_score(h: &dbot_core::domain::HashReply) -> String {
    h.xfe
        .malware
        .as_ref()
        .map(|m| m.family.join(","))
        .unwrap_or_default()
}
