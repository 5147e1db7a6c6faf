// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IBM X-Force Exchange client.
//!
//! Basic auth with the key/password pair carried per call, so per-workspace
//! credentials share one connection pool. HTTP 404 maps to
//! [`DbotError::NotFound`].

use std::time::Duration;

use async_trait::async_trait;
use dbot_core::oracle::{
    XfeIpHistory, XfeIpReputation, XfeMalware, XfeResolve, XfeUrlDetails, XfeUrlMalware,
};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, XfeCredentials, XfeOracle};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://api.xforce.ibmcloud.com";

/// X-Force Exchange REST client.
#[derive(Debug, Clone)]
pub struct XfeClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Deserialize)]
struct UrlEnvelope {
    result: XfeUrlDetails,
}

#[derive(Deserialize)]
struct MalwareEnvelope {
    malware: XfeMalware,
}

impl XfeClient {
    pub fn new() -> Result<Self, DbotError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DbotError::Oracle {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            base_url: API_BASE_URL.to_string(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self.retry_delay = Duration::from_millis(10);
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        creds: &XfeCredentials,
        path: &str,
        subject: &str,
    ) -> Result<T, DbotError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            path,
            urlencoding::encode(subject)
        );
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, path, "retrying XFE request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }
            let response = self
                .http
                .get(&url)
                .basic_auth(&creds.key, Some(&creds.password))
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| DbotError::Oracle {
                    message: format!("XFE request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;
            let status = response.status();
            debug!(status = %status, path, "XFE response received");
            if status == StatusCode::NOT_FOUND {
                return Err(DbotError::not_found("xfe record", subject));
            }
            if is_transient(status) && attempt < self.max_retries {
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DbotError::Oracle {
                    message: format!("XFE returned {status}: {body}"),
                    source: None,
                });
            }
            return response.json::<T>().await.map_err(|e| DbotError::Oracle {
                message: format!("failed to parse XFE response: {e}"),
                source: Some(Box::new(e)),
            });
        }
        Err(DbotError::Oracle {
            message: "XFE request failed after retries".into(),
            source: None,
        })
    }
}

pub(crate) fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::SERVICE_UNAVAILABLE
    )
}

#[async_trait]
impl PluginAdapter for XfeClient {
    fn name(&self) -> &str {
        "xfe"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Oracle
    }

    async fn health_check(&self) -> Result<HealthStatus, DbotError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DbotError> {
        Ok(())
    }
}

#[async_trait]
impl XfeOracle for XfeClient {
    async fn url(&self, creds: &XfeCredentials, url: &str) -> Result<XfeUrlDetails, DbotError> {
        let envelope: UrlEnvelope = self.get(creds, "url", url).await?;
        Ok(envelope.result)
    }

    async fn resolve(&self, creds: &XfeCredentials, url: &str) -> Result<XfeResolve, DbotError> {
        self.get(creds, "resolve", url).await
    }

    async fn url_malware(
        &self,
        creds: &XfeCredentials,
        url: &str,
    ) -> Result<XfeUrlMalware, DbotError> {
        self.get(creds, "url/malware", url).await
    }

    async fn ip_reputation(
        &self,
        creds: &XfeCredentials,
        ip: &str,
    ) -> Result<XfeIpReputation, DbotError> {
        self.get(creds, "ipr", ip).await
    }

    async fn ip_history(
        &self,
        creds: &XfeCredentials,
        ip: &str,
    ) -> Result<XfeIpHistory, DbotError> {
        self.get(creds, "ipr/history", ip).await
    }

    async fn malware(&self, creds: &XfeCredentials, hash: &str) -> Result<XfeMalware, DbotError> {
        let envelope: MalwareEnvelope = self.get(creds, "malware", hash).await?;
        Ok(envelope.malware)
    }
}
