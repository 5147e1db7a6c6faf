// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted reputation services and scanner.
//!
//! Anything not scripted answers not-found, the same as a real service that
//! has never seen the indicator. Every call is counted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dbot_core::oracle::{
    VtFileReport, VtIpReport, VtUrlReport, XfeIpHistory, XfeIpReputation, XfeMalware,
    XfeResolve, XfeUrlDetails, XfeUrlMalware,
};
use dbot_core::{DbotError, MalwareScanner, VtOracle, XfeCredentials, XfeOracle};

fn scripted<T: Clone>(
    map: &Mutex<HashMap<String, T>>,
    kind: &str,
    key: &str,
) -> Result<T, DbotError> {
    map.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(key)
        .cloned()
        .ok_or_else(|| DbotError::not_found(kind, key))
}

fn script<T>(map: &Mutex<HashMap<String, T>>, key: &str, value: T) {
    map.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(key.to_string(), value);
}

/// Scripted X-Force Exchange.
#[derive(Default)]
pub struct MockXfe {
    urls: Mutex<HashMap<String, XfeUrlDetails>>,
    ips: Mutex<HashMap<String, XfeIpReputation>>,
    malware: Mutex<HashMap<String, XfeMalware>>,
    calls: AtomicUsize,
}

impl MockXfe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: &str, details: XfeUrlDetails) {
        script(&self.urls, url, details);
    }

    pub fn set_ip(&self, ip: &str, reputation: XfeIpReputation) {
        script(&self.ips, ip, reputation);
    }

    pub fn set_malware(&self, hash: &str, malware: XfeMalware) {
        script(&self.malware, &hash.to_lowercase(), malware);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl XfeOracle for MockXfe {
    async fn url(&self, _creds: &XfeCredentials, url: &str) -> Result<XfeUrlDetails, DbotError> {
        self.hit();
        scripted(&self.urls, "url", url)
    }

    async fn resolve(&self, _creds: &XfeCredentials, _url: &str) -> Result<XfeResolve, DbotError> {
        self.hit();
        Ok(XfeResolve::default())
    }

    async fn url_malware(
        &self,
        _creds: &XfeCredentials,
        url: &str,
    ) -> Result<XfeUrlMalware, DbotError> {
        self.hit();
        Err(DbotError::not_found("url malware", url))
    }

    async fn ip_reputation(
        &self,
        _creds: &XfeCredentials,
        ip: &str,
    ) -> Result<XfeIpReputation, DbotError> {
        self.hit();
        scripted(&self.ips, "ip", ip)
    }

    async fn ip_history(
        &self,
        _creds: &XfeCredentials,
        ip: &str,
    ) -> Result<XfeIpHistory, DbotError> {
        self.hit();
        Err(DbotError::not_found("ip history", ip))
    }

    async fn malware(&self, _creds: &XfeCredentials, hash: &str) -> Result<XfeMalware, DbotError> {
        self.hit();
        scripted(&self.malware, "malware", &hash.to_lowercase())
    }
}

/// Scripted VirusTotal.
#[derive(Default)]
pub struct MockVt {
    urls: Mutex<HashMap<String, VtUrlReport>>,
    ips: Mutex<HashMap<String, VtIpReport>>,
    files: Mutex<HashMap<String, VtFileReport>>,
    calls: AtomicUsize,
}

impl MockVt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: &str, report: VtUrlReport) {
        script(&self.urls, url, report);
    }

    pub fn set_ip(&self, ip: &str, report: VtIpReport) {
        script(&self.ips, ip, report);
    }

    pub fn set_file(&self, hash: &str, report: VtFileReport) {
        script(&self.files, &hash.to_lowercase(), report);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VtOracle for MockVt {
    async fn url_report(&self, _api_key: &str, url: &str) -> Result<VtUrlReport, DbotError> {
        self.hit();
        scripted(&self.urls, "url", url)
    }

    async fn ip_report(&self, _api_key: &str, ip: &str) -> Result<VtIpReport, DbotError> {
        self.hit();
        scripted(&self.ips, "ip", ip)
    }

    async fn file_report(&self, _api_key: &str, hash: &str) -> Result<VtFileReport, DbotError> {
        self.hit();
        scripted(&self.files, "file", &hash.to_lowercase())
    }
}

/// Scanner that flags content containing a marker.
pub struct MockScanner {
    marker: Vec<u8>,
    signature: String,
    calls: AtomicUsize,
}

impl MockScanner {
    pub fn new(marker: &[u8], signature: &str) -> Self {
        Self {
            marker: marker.to_vec(),
            signature: signature.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MalwareScanner for MockScanner {
    async fn scan(&self, _name: &str, content: &[u8]) -> Result<Option<String>, DbotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let infected = !self.marker.is_empty()
            && content
                .windows(self.marker.len())
                .any(|w| w == self.marker.as_slice());
        Ok(infected.then(|| self.signature.clone()))
    }
}
