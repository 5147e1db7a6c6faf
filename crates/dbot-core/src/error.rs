// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the DBot pipeline.

use thiserror::Error;

/// The primary error type shared by every DBot crate and trait.
#[derive(Debug, Error)]
pub enum DbotError {
    /// Configuration errors (invalid values, missing required keys).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat platform errors (HTTP failure, `ok: false` responses, rate limiting).
    #[error("chat error: {message}")]
    Chat {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reputation service errors (HTTP failure, non-2xx status, bad body).
    #[error("oracle error: {message}")]
    Oracle {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Queue backend errors other than close and timeout.
    #[error("queue error: {message}")]
    Queue {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The queue was closed; consumer loops terminate on this.
    #[error("queue closed")]
    Closed,

    /// A blocking pop waited `duration` without receiving a message.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A record or remote resource does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Encryption or decryption failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A wire payload could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DbotError {
    /// Shorthand for a [`DbotError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when the error means "nothing there" rather than "something broke".
    ///
    /// Oracle clients map HTTP 404 to [`DbotError::NotFound`], but errors that
    /// only carry the status in their message are recognised too.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Oracle { message, .. } | Self::Chat { message, .. } => message.contains("404"),
            _ => false,
        }
    }

    /// True for [`DbotError::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// True for [`DbotError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
