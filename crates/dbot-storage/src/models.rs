// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types that exist only at the storage boundary.
//!
//! Domain records live in `dbot-core`; this module re-exports them next to
//! the storage-only rows.

pub use dbot_core::domain::{
    Configuration, MaliciousContent, OAuthState, Statistics, Team, User, UserStatus,
};

/// One row of the database queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub id: i64,
    /// Reply queue name for `workr` rows, empty otherwise.
    pub name: String,
    pub message_type: String,
    /// JSON payload.
    pub message: String,
    pub ts: String,
}
