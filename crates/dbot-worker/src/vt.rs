// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VirusTotal public API (v2) client.
//!
//! The API key travels as a query parameter on each call. VirusTotal answers
//! an exhausted quota with `204 No Content`; that and the usual transient
//! statuses are retried once.

use std::time::Duration;

use async_trait::async_trait;
use dbot_core::oracle::{VtFileReport, VtIpReport, VtUrlReport};
use dbot_core::{AdapterType, DbotError, HealthStatus, PluginAdapter, VtOracle};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::xfe::is_transient;

const API_BASE_URL: &str = "https://www.virustotal.com/vtapi/v2";

/// VirusTotal REST client.
#[derive(Debug, Clone)]
pub struct VtClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl VtClient {
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
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DbotError> {
        let endpoint = format!("{}/{}", self.base_url.trim_end_matches('/'), method);
        let url = url::Url::parse_with_params(&endpoint, params).map_err(|e| DbotError::Oracle {
            message: format!("invalid VT request URL: {e}"),
            source: Some(Box::new(e)),
        })?;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, method, "retrying VT request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }
            let response = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| DbotError::Oracle {
                    message: format!("VT request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;
            let status = response.status();
            debug!(status = %status, method, "VT response received");
            let quota = status == StatusCode::NO_CONTENT;
            if (quota || is_transient(status)) && attempt < self.max_retries {
                continue;
            }
            if quota {
                return Err(DbotError::Oracle {
                    message: "VT request quota exceeded".into(),
                    source: None,
                });
            }
            if status == StatusCode::NOT_FOUND {
                return Err(DbotError::not_found("vt report", method));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DbotError::Oracle {
                    message: format!("VT returned {status}: {body}"),
                    source: None,
                });
            }
            return response.json::<T>().await.map_err(|e| DbotError::Oracle {
                message: format!("failed to parse VT response: {e}"),
                source: Some(Box::new(e)),
            });
        }
        Err(DbotError::Oracle {
            message: "VT request failed after retries".into(),
            source: None,
        })
    }
}

#[async_trait]
impl PluginAdapter for VtClient {
    fn name(&self) -> &str {
        "vt"
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
impl VtOracle for VtClient {
    async fn url_report(&self, api_key: &str, url: &str) -> Result<VtUrlReport, DbotError> {
        self.get("url/report", &[("apikey", api_key), ("resource", url)])
            .await
    }

    async fn ip_report(&self, api_key: &str, ip: &str) -> Result<VtIpReport, DbotError> {
        self.get("ip-address/report", &[("apikey", api_key), ("ip", ip)])
            .await
    }

    async fn file_report(&self, api_key: &str, hash: &str) -> Result<VtFileReport, DbotError> {
        self.get("file/report", &[("apikey", api_key), ("resource", hash)])
            .await
    }
}
