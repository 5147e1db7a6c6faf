// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-flight work requests and replies.

use serde::{Deserialize, Serialize};

use crate::oracle::{
    VtFileReport, VtIpReport, VtUrlReport, XfeIpHistory, XfeIpReputation, XfeMalware,
    XfeResolve, XfeUrlDetails, XfeUrlMalware,
};
use crate::types::{ReplyType, Verdict};

/// Where a request came from. Echoed unchanged in the reply.
///
/// All ids are the chat platform's external ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub team: String,
    pub user: String,
    #[serde(default)]
    pub original_user: String,
    #[serde(default)]
    pub channel: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// A shared file to download and scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Token used for the download. Stripped before a reply is built.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl FileRef {
    /// A copy safe to echo back to the chat channel.
    pub fn without_token(&self) -> FileRef {
        FileRef {
            token: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Message,
    File,
}

/// A unit of enrichment work pushed by the bot or the web tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    /// Name of the queue the reply must be pushed to.
    pub reply_queue: String,
    pub context: Context,
    /// On-demand requests ask for the extended oracle calls.
    #[serde(default)]
    pub online: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vt_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub xfe_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub xfe_pass: String,
}

impl WorkRequest {
    /// Requests without a reply queue or workspace cannot be answered.
    pub fn is_routable(&self) -> bool {
        !self.reply_queue.is_empty() && !self.context.team.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeUrlResult {
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub resolve: Option<XfeResolve>,
    #[serde(default)]
    pub url_details: Option<XfeUrlDetails>,
    #[serde(default)]
    pub url_malware: Option<XfeUrlMalware>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtUrlResult {
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub url_report: Option<VtUrlReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlReply {
    pub details: String,
    pub result: Verdict,
    pub xfe: XfeUrlResult,
    pub vt: VtUrlResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeIpResult {
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub ip_reputation: Option<XfeIpReputation>,
    #[serde(default)]
    pub ip_history: Option<XfeIpHistory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtIpResult {
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub ip_report: Option<VtIpReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpReply {
    pub details: String,
    pub result: Verdict,
    #[serde(default)]
    pub private: bool,
    pub xfe: XfeIpResult,
    pub vt: VtIpResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeHashResult {
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub malware: Option<XfeMalware>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtHashResult {
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub file_report: Option<VtFileReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HashReply {
    pub details: String,
    pub result: Verdict,
    pub xfe: XfeHashResult,
    pub vt: VtHashResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileReply {
    pub details: FileRef,
    pub result: Verdict,
    #[serde(default)]
    pub file_too_large: bool,
    /// Signature name reported by the local scanner.
    #[serde(default)]
    pub virus: String,
    /// Scanner failure, if any.
    #[serde(default)]
    pub error: String,
}

/// The consolidated answer to one [`WorkRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkReply {
    #[serde(rename = "type")]
    pub kind: ReplyType,
    pub message_id: String,
    #[serde(default)]
    pub hashes: Vec<HashReply>,
    #[serde(default)]
    pub urls: Vec<UrlReply>,
    #[serde(default)]
    pub ips: Vec<IpReply>,
    #[serde(default)]
    pub file: Option<FileReply>,
    pub context: Context,
}

impl WorkReply {
    /// An empty reply bound to `request`'s id and context.
    pub fn for_request(request: &WorkRequest) -> Self {
        Self {
            message_id: request.message_id.clone(),
            context: request.context.clone(),
            ..Self::default()
        }
    }
}
