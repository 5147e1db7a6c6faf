// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session and XSRF cookie values, both sealed with the session key.

use axum_extra::extract::cookie::Cookie;
use chrono::{DateTime, Duration, Utc};
use dbot_core::DbotError;
use dbot_vault::Vault;
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "SES";
pub const XSRF_COOKIE: &str = "XSRF";
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";
const XSRF_PREFIX: &str = "No XSRF Allowed";

/// Contents of the `SES` cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub when: DateTime<Utc>,
}

impl Session {
    pub fn new(user: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            user_id: user_id.into(),
            when: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout_minutes: u64) -> bool {
        let timeout = Duration::minutes(i64::try_from(timeout_minutes).unwrap_or(i64::MAX / 60_000));
        now - self.when > timeout
    }
}

/// Seals and opens cookie values.
#[derive(Clone)]
pub struct CookieSealer {
    vault: Vault,
    secure: bool,
}

impl CookieSealer {
    pub fn new(session_key: &str, secure: bool) -> Result<Self, DbotError> {
        Ok(Self {
            vault: Vault::new(session_key)?,
            secure,
        })
    }

    pub fn seal_session(&self, session: &Session) -> Result<Cookie<'static>, DbotError> {
        let value = self.vault.encrypt_json(session)?;
        Ok(Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .build())
    }

    pub fn open_session(&self, value: &str) -> Result<Session, DbotError> {
        self.vault.decrypt_json(value)
    }

    /// Cookie that, once added to a jar, clears the session.
    pub fn cleared_session(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .build()
    }

    /// A fresh double-submit token; readable by scripts so they can echo it.
    pub fn xsrf(&self) -> Result<Cookie<'static>, DbotError> {
        let value = self
            .vault
            .encrypt(&format!("{XSRF_PREFIX}{}", Utc::now().to_rfc3339()))?;
        Ok(Cookie::build((XSRF_COOKIE, value))
            .path("/")
            .http_only(false)
            .secure(self.secure)
            .build())
    }

    /// The header must equal the cookie and open to the expected prefix.
    pub fn xsrf_matches(&self, cookie: Option<&str>, header: Option<&str>) -> bool {
        match (cookie, header) {
            (Some(c), Some(h)) if !c.is_empty() && c == h => self
                .vault
                .decrypt(h)
                .is_ok_and(|plain| plain.starts_with(XSRF_PREFIX)),
            _ => false,
        }
    }
}
