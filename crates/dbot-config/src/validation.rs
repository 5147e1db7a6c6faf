// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::{DbotConfig, PLACEHOLDER_SECRET};

const AES_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &DbotConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !matches!(config.env.as_str(), "DEV" | "TEST" | "PROD") {
        fail(format!(
            "Env must be one of DEV, TEST, PROD, got `{}`",
            config.env
        ));
    }

    let db_key = config.security.db_key.len();
    if db_key > 0 && !AES_KEY_LENGTHS.contains(&db_key) {
        fail(format!(
            "Security.DBKey must be 16, 24 or 32 bytes long, got {db_key}"
        ));
    }

    if config.web {
        let session_key = config.security.session_key.len();
        if !AES_KEY_LENGTHS.contains(&session_key) {
            fail(format!(
                "Security.SessionKey must be 16, 24 or 32 bytes long, got {session_key}"
            ));
        }
        if config.slack.client_id.trim().is_empty() {
            fail("Slack.ClientID is required when Web is enabled".to_string());
        }
        if config.slack.client_secret.trim().is_empty() {
            fail("Slack.ClientSecret is required when Web is enabled".to_string());
        }
        if config.bot && config.slack.signing_secret.trim().is_empty() {
            fail("Slack.SigningSecret is required when Web and Bot are enabled".to_string());
        }
    }

    if config.is_prod() {
        if config.security.db_key == PLACEHOLDER_SECRET {
            fail("Security.DBKey must be changed from the default in PROD".to_string());
        }
        if config.web && config.security.session_key == PLACEHOLDER_SECRET {
            fail("Security.SessionKey must be changed from the default in PROD".to_string());
        }
    }

    if config.queue_poll < 1 {
        fail("QueuePoll must be at least 1 second".to_string());
    }

    if config.file_size_limit == 0 {
        fail("FileSizeLimit must be greater than 0".to_string());
    }

    if config.roles().is_empty() {
        fail("at least one of Web, Bot, Dedup, Worker must be enabled".to_string());
    }

    match url::Url::parse(&config.external_address) {
        Ok(parsed) if parsed.has_host() => {}
        _ => fail(format!(
            "ExternalAddress `{}` is not an absolute URL",
            config.external_address
        )),
    }

    if config.db.connect_string.trim().is_empty() {
        fail("DB.ConnectString must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
