// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker pool: pop work, enrich every indicator, push one reply.
//!
//! Each request is handled in its own task so a panic loses that request
//! only. Oracle calls for one request run concurrently and are joined before
//! the reply is built.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dbot_config::DbotConfig;
use dbot_core::domain::{
    FileRef, FileReply, HashReply, IpReply, RequestKind, UrlReply, VtHashResult, VtIpResult,
    VtUrlResult, WorkReply, WorkRequest, XfeHashResult, XfeIpResult, XfeUrlResult,
};
use dbot_core::indicators;
use dbot_core::{
    DbotError, MalwareScanner, Queue, ReplyType, Verdict, VtOracle, XfeCredentials, XfeOracle,
};
use futures::future::join_all;
use md5::{Digest, Md5};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clamd::ClamdScanner;
use crate::ip::{IpClass, classify};
use crate::scorer;
use crate::vt::VtClient;
use crate::xfe::XfeClient;

/// Pause after a queue error that is neither close nor timeout.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Tunables and default oracle credentials.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Number of concurrent consumer tasks.
    pub tasks: usize,
    /// Largest file downloaded and scanned, in bytes.
    pub file_size_limit: u64,
    pub vt_key: String,
    pub xfe: XfeCredentials,
}

impl WorkerOptions {
    pub fn from_config(config: &DbotConfig) -> Self {
        Self {
            tasks: config.worker_count(),
            file_size_limit: config.file_size_limit,
            vt_key: config.vt.clone(),
            xfe: XfeCredentials {
                key: config.xfe.key.clone(),
                password: config.xfe.password.clone(),
            },
        }
    }
}

/// Enrichment worker.
pub struct Worker {
    queue: Arc<dyn Queue>,
    xfe: Arc<dyn XfeOracle>,
    vt: Arc<dyn VtOracle>,
    scanner: Option<Arc<dyn MalwareScanner>>,
    http: reqwest::Client,
    options: WorkerOptions,
}

enum Download {
    Content(Vec<u8>),
    TooLarge,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn Queue>,
        xfe: Arc<dyn XfeOracle>,
        vt: Arc<dyn VtOracle>,
        scanner: Option<Arc<dyn MalwareScanner>>,
        options: WorkerOptions,
    ) -> Result<Self, DbotError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| DbotError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            queue,
            xfe,
            vt,
            scanner,
            http,
            options,
        })
    }

    /// A worker talking to the real oracles and the configured clamd socket.
    pub fn from_config(config: &DbotConfig, queue: Arc<dyn Queue>) -> Result<Self, DbotError> {
        let scanner: Option<Arc<dyn MalwareScanner>> = if config.clam_ctl.is_empty() {
            None
        } else {
            Some(Arc::new(ClamdScanner::new(&config.clam_ctl)))
        };
        Self::new(
            queue,
            Arc::new(XfeClient::new()?),
            Arc::new(VtClient::new()?),
            scanner,
            WorkerOptions::from_config(config),
        )
    }

    /// Run the consumer tasks until `cancel` fires or the queue closes.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let tasks = self.options.tasks.max(1);
        info!(tasks, "worker started");
        let handles: Vec<_> = (0..tasks)
            .map(|id| tokio::spawn(Arc::clone(&self).consume(id, cancel.clone())))
            .collect();
        for handle in join_all(handles).await {
            if let Err(e) = handle {
                error!(error = %e, "worker task failed");
            }
        }
        info!("worker stopped");
    }

    async fn consume(self: Arc<Self>, id: usize, cancel: CancellationToken) {
        loop {
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.queue.pop_work(None) => r,
            };
            let request = match popped {
                Ok(request) => request,
                Err(e) if e.is_closed() => break,
                Err(e) => {
                    warn!(task = id, error = %e, "unable to pop work");
                    tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
                    continue;
                }
            };
            if !request.is_routable() {
                warn!(message_id = %request.message_id, "dropping work without reply queue or team");
                continue;
            }
            let worker = Arc::clone(&self);
            let message_id = request.message_id.clone();
            let outcome = tokio::spawn(async move { worker.handle(request).await }).await;
            if let Err(e) = outcome {
                if e.is_panic() {
                    error!(message_id = %message_id, "panic while handling work request");
                } else {
                    warn!(message_id = %message_id, error = %e, "work task cancelled");
                }
            }
        }
        debug!(task = id, "worker task exiting");
    }

    async fn handle(&self, request: WorkRequest) {
        let reply = match self.process(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(message_id = %request.message_id, team = %request.context.team, error = %e, "dropping work request");
                return;
            }
        };
        if let Err(e) = self
            .queue
            .push_work_reply(&request.reply_queue, &reply)
            .await
        {
            warn!(message_id = %request.message_id, queue = %request.reply_queue, error = %e, "unable to push work reply");
        }
    }

    /// Enrich one request into its reply.
    ///
    /// Oracle failures end up inside the reply. Only a failed download or a
    /// malformed request is an error.
    pub async fn process(&self, request: &WorkRequest) -> Result<WorkReply, DbotError> {
        let mut reply = WorkReply::for_request(request);
        match request.kind {
            RequestKind::Message => self.handle_message(request, &mut reply).await,
            RequestKind::File => self.handle_file(request, &mut reply).await?,
        }
        info!(
            message_id = %request.message_id,
            team = %request.context.team,
            kind = reply.kind.bits(),
            "work request processed"
        );
        Ok(reply)
    }

    fn credentials(&self, request: &WorkRequest) -> (XfeCredentials, String) {
        let xfe = if !request.xfe_key.is_empty() && !request.xfe_pass.is_empty() {
            XfeCredentials {
                key: request.xfe_key.clone(),
                password: request.xfe_pass.clone(),
            }
        } else {
            self.options.xfe.clone()
        };
        let vt = if request.vt_key.is_empty() {
            self.options.vt_key.clone()
        } else {
            request.vt_key.clone()
        };
        (xfe, vt)
    }

    async fn handle_message(&self, request: &WorkRequest, reply: &mut WorkReply) {
        let found = indicators::extract(&request.text);
        let (xfe, vt_key) = self.credentials(request);
        let online = request.online;

        let (urls, ips, hashes) = tokio::join!(
            join_all(
                found
                    .urls
                    .iter()
                    .map(|u| self.url_reply(&xfe, &vt_key, u, online))
            ),
            join_all(
                found
                    .ips
                    .iter()
                    .map(|ip| self.ip_reply(&xfe, &vt_key, ip, online))
            ),
            join_all(found.hashes.iter().map(|h| self.hash_reply(&xfe, &vt_key, h))),
        );
        if !urls.is_empty() {
            reply.kind.insert(ReplyType::URL);
        }
        if !ips.is_empty() {
            reply.kind.insert(ReplyType::IP);
        }
        if !hashes.is_empty() {
            reply.kind.insert(ReplyType::HASH);
        }
        reply.urls = urls;
        reply.ips = ips;
        reply.hashes = hashes;
    }

    async fn url_reply(
        &self,
        creds: &XfeCredentials,
        vt_key: &str,
        url: &str,
        online: bool,
    ) -> UrlReply {
        let malware = async {
            if online {
                Some(self.xfe.url_malware(creds, url).await)
            } else {
                None
            }
        };
        let (details, resolve, malware, report) = tokio::join!(
            self.xfe.url(creds, url),
            self.xfe.resolve(creds, url),
            malware,
            self.vt.url_report(vt_key, url),
        );

        let mut xfe = XfeUrlResult::default();
        match details {
            Ok(d) => xfe.url_details = Some(d),
            Err(e) if e.is_not_found() => xfe.not_found = true,
            Err(e) => xfe.error = e.to_string(),
        }
        xfe.resolve = resolve.ok();
        xfe.url_malware = malware.and_then(Result::ok);

        let mut vt = VtUrlResult::default();
        match report {
            Ok(r) => {
                vt.not_found = r.response_code == 0;
                vt.url_report = Some(r);
            }
            Err(e) if e.is_not_found() => vt.not_found = true,
            Err(e) => vt.error = e.to_string(),
        }

        let result = scorer::score_url(&xfe, &vt);
        UrlReply {
            details: url.to_string(),
            result,
            xfe,
            vt,
        }
    }

    async fn ip_reply(
        &self,
        creds: &XfeCredentials,
        vt_key: &str,
        ip: &str,
        online: bool,
    ) -> IpReply {
        let mut reply = IpReply {
            details: ip.to_string(),
            result: Verdict::Unknown,
            ..IpReply::default()
        };
        match classify(ip) {
            IpClass::Private => {
                reply.private = true;
                reply.xfe.not_found = true;
                return reply;
            }
            IpClass::NonGlobal => {
                reply.xfe.not_found = true;
                return reply;
            }
            IpClass::Public => {}
        }

        let history = async {
            if online {
                Some(self.xfe.ip_history(creds, ip).await)
            } else {
                None
            }
        };
        let (reputation, history, report) = tokio::join!(
            self.xfe.ip_reputation(creds, ip),
            history,
            self.vt.ip_report(vt_key, ip),
        );

        let mut xfe = XfeIpResult::default();
        match reputation {
            Ok(r) => xfe.ip_reputation = Some(r),
            Err(e) if e.is_not_found() => xfe.not_found = true,
            Err(e) => xfe.error = e.to_string(),
        }
        xfe.ip_history = history.and_then(Result::ok);

        let mut vt = VtIpResult::default();
        match report {
            Ok(r) => {
                vt.not_found = r.response_code == 0;
                vt.ip_report = Some(r);
            }
            Err(e) if e.is_not_found() => vt.not_found = true,
            Err(e) => vt.error = e.to_string(),
        }

        reply.result = scorer::score_ip(&xfe, &vt, Utc::now());
        reply.xfe = xfe;
        reply.vt = vt;
        reply
    }

    async fn hash_reply(&self, creds: &XfeCredentials, vt_key: &str, hash: &str) -> HashReply {
        let (malware, report) = tokio::join!(
            self.xfe.malware(creds, hash),
            self.vt.file_report(vt_key, hash),
        );

        let mut xfe = XfeHashResult::default();
        match malware {
            Ok(m) => xfe.malware = Some(m),
            Err(e) if e.is_not_found() => xfe.not_found = true,
            Err(e) => xfe.error = e.to_string(),
        }

        let mut vt = VtHashResult::default();
        match report {
            Ok(r) => {
                vt.not_found = r.response_code == 0;
                vt.file_report = Some(r);
            }
            Err(e) if e.is_not_found() => vt.not_found = true,
            Err(e) => vt.error = e.to_string(),
        }

        let result = scorer::score_hash(&xfe, &vt);
        HashReply {
            details: hash.to_string(),
            result,
            xfe,
            vt,
        }
    }

    async fn handle_file(
        &self,
        request: &WorkRequest,
        reply: &mut WorkReply,
    ) -> Result<(), DbotError> {
        let file = request
            .file
            .as_ref()
            .ok_or_else(|| DbotError::Internal("file request without a file".into()))?;
        reply.kind.insert(ReplyType::FILE);
        let mut file_reply = FileReply {
            details: file.without_token(),
            result: Verdict::Unknown,
            ..FileReply::default()
        };

        let limit = self.options.file_size_limit;
        if file.size > limit {
            info!(file = %file.name, size = file.size, limit, "file too large, skipping");
            file_reply.file_too_large = true;
            reply.file = Some(file_reply);
            return Ok(());
        }
        let content = match self.download(file, limit).await? {
            Download::Content(content) => content,
            Download::TooLarge => {
                info!(file = %file.name, limit, "downloaded file exceeds limit");
                file_reply.file_too_large = true;
                reply.file = Some(file_reply);
                return Ok(());
            }
        };

        let md5 = hex::encode(Md5::digest(&content));
        debug!(file = %file.name, md5 = %md5, "file hashed");
        let (xfe, vt_key) = self.credentials(request);
        let scan = async {
            match &self.scanner {
                Some(scanner) => Some(scanner.scan(&file.name, &content).await),
                None => None,
            }
        };
        let (hash, scan) = tokio::join!(self.hash_reply(&xfe, &vt_key, &md5), scan);

        let scanned = match scan {
            Some(Ok(virus)) => {
                file_reply.virus = virus.unwrap_or_default();
                true
            }
            Some(Err(e)) => {
                warn!(file = %file.name, error = %e, "local scan failed");
                file_reply.error = e.to_string();
                false
            }
            None => false,
        };
        file_reply.result = scorer::score_file(Some(&hash), &file_reply.virus, scanned);
        reply.hashes = vec![hash];
        reply.file = Some(file_reply);
        Ok(())
    }

    async fn download(&self, file: &FileRef, limit: u64) -> Result<Download, DbotError> {
        let download_error = |message: String| DbotError::Chat {
            message,
            source: None,
        };
        let mut response = self
            .http
            .get(&file.url)
            .bearer_auth(&file.token)
            .send()
            .await
            .map_err(|e| download_error(format!("unable to download {}: {e}", file.name)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!(
                "unable to download {}: status {status}",
                file.name
            )));
        }
        let mut content = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_error(format!("download of {} interrupted: {e}", file.name)))?
        {
            if (content.len() + chunk.len()) as u64 > limit {
                return Ok(Download::TooLarge);
            }
            content.extend_from_slice(&chunk);
        }
        Ok(Download::Content(content))
    }
}
