// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for DBot.
//!
//! Holds the error type, domain records, event decoding, indicator
//! extraction and the trait seams every other crate implements or consumes.

pub mod chat;
pub mod domain;
pub mod error;
pub mod event;
pub mod indicators;
pub mod oracle;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DbotError;
pub use types::{AdapterType, HealthStatus, ReplyType, Role, Verdict};

pub use traits::{
    ChatClient, ChatConnector, MalwareScanner, PluginAdapter, Queue, Repo, VtOracle,
    XfeCredentials, XfeOracle,
};
