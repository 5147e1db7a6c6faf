// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw reputation service responses.
//!
//! Field names follow the services' JSON so the same records decode the HTTP
//! bodies and travel verbatim inside a [`WorkReply`](crate::domain::WorkReply).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// --- IBM X-Force Exchange ---

/// `GET /url/{url}` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeUrlDetails {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub cats: BTreeMap<String, bool>,
    #[serde(default)]
    pub score: f64,
}

/// `GET /resolve/{host}` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeResolve {
    #[serde(rename = "A", default)]
    pub a: Vec<String>,
    #[serde(rename = "AAAA", default)]
    pub aaaa: Vec<String>,
}

/// `GET /url/malware/{url}` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeUrlMalware {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub malware: Vec<serde_json::Value>,
}

/// `GET /ipr/{ip}` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeIpReputation {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub cats: BTreeMap<String, i64>,
    #[serde(default)]
    pub geo: BTreeMap<String, serde_json::Value>,
}

impl XfeIpReputation {
    pub fn country(&self) -> Option<&str> {
        self.geo.get("country").and_then(|v| v.as_str())
    }
}

/// `GET /ipr/history/{ip}` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeIpHistory {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
}

/// `GET /malware/{hash}` result (the `malware` object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeMalware {
    #[serde(default)]
    pub family: Vec<String>,
    #[serde(default, rename = "mimetype")]
    pub mime_type: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub origins: XfeOrigins,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeOrigins {
    #[serde(default)]
    pub external: XfeExternal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct XfeExternal {
    #[serde(default)]
    pub family: Vec<String>,
    #[serde(default, rename = "detectionCoverage")]
    pub detection_coverage: u32,
}

impl XfeMalware {
    /// True when either the main or the external origin names a family.
    pub fn has_family(&self) -> bool {
        !self.family.is_empty() || !self.origins.external.family.is_empty()
    }
}

// --- VirusTotal ---

/// `url/report` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtUrlReport {
    #[serde(default)]
    pub response_code: i32,
    #[serde(default)]
    pub verbose_msg: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub scan_date: String,
    #[serde(default)]
    pub positives: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub permalink: String,
}

/// One entry of `detected_urls` in an IP report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtDetectedUrl {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub positives: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub scan_date: String,
}

/// `ip-address/report` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtIpReport {
    #[serde(default)]
    pub response_code: i32,
    #[serde(default)]
    pub verbose_msg: String,
    #[serde(default)]
    pub detected_urls: Vec<VtDetectedUrl>,
}

/// `file/report` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VtFileReport {
    #[serde(default)]
    pub response_code: i32,
    #[serde(default)]
    pub verbose_msg: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub scan_date: String,
    #[serde(default)]
    pub positives: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub permalink: String,
}
