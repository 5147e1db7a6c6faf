// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reputation service and local scanner contracts.
//!
//! Each call returns a structured response, [`DbotError::NotFound`] when the
//! service has no record, or another error.

use async_trait::async_trait;

use crate::error::DbotError;
use crate::oracle::{
    VtFileReport, VtIpReport, VtUrlReport, XfeIpHistory, XfeIpReputation, XfeMalware,
    XfeResolve, XfeUrlDetails, XfeUrlMalware,
};

/// Basic-auth credentials for X-Force Exchange.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct XfeCredentials {
    pub key: String,
    pub password: String,
}

impl std::fmt::Debug for XfeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XfeCredentials")
            .field("key", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// URL, IP and malware-hash reputation (IBM X-Force Exchange).
#[async_trait]
pub trait XfeOracle: Send + Sync {
    async fn url(&self, creds: &XfeCredentials, url: &str) -> Result<XfeUrlDetails, DbotError>;

    async fn resolve(&self, creds: &XfeCredentials, url: &str) -> Result<XfeResolve, DbotError>;

    async fn url_malware(
        &self,
        creds: &XfeCredentials,
        url: &str,
    ) -> Result<XfeUrlMalware, DbotError>;

    async fn ip_reputation(
        &self,
        creds: &XfeCredentials,
        ip: &str,
    ) -> Result<XfeIpReputation, DbotError>;

    async fn ip_history(&self, creds: &XfeCredentials, ip: &str)
    -> Result<XfeIpHistory, DbotError>;

    async fn malware(&self, creds: &XfeCredentials, hash: &str) -> Result<XfeMalware, DbotError>;
}

/// URL, IP and file-hash reports (VirusTotal).
#[async_trait]
pub trait VtOracle: Send + Sync {
    async fn url_report(&self, api_key: &str, url: &str) -> Result<VtUrlReport, DbotError>;

    async fn ip_report(&self, api_key: &str, ip: &str) -> Result<VtIpReport, DbotError>;

    async fn file_report(&self, api_key: &str, hash: &str) -> Result<VtFileReport, DbotError>;
}

/// Local signature scanner.
#[async_trait]
pub trait MalwareScanner: Send + Sync {
    /// Returns the signature name when the content is infected.
    async fn scan(&self, name: &str, content: &[u8]) -> Result<Option<String>, DbotError>;
}
