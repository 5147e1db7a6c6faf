// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channels the bot has already announced itself in.

use chrono::Utc;
use dbot_core::DbotError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};

/// Record the first post on `(team, channel)`.
///
/// Returns `true` only when this call inserted the row; concurrent callers
/// racing on the same pair see exactly one `true`.
pub async fn mark_sent(db: &Database, team: &str, channel: &str) -> Result<bool, DbotError> {
    let team = team.to_string();
    let channel = channel.to_string();
    let ts = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO bot_channels (team, channel, ts) VALUES (?1, ?2, ?3)",
                params![team, channel, ts],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn was_sent(db: &Database, team: &str, channel: &str) -> Result<bool, DbotError> {
    let team = team.to_string();
    let channel = channel.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM bot_channels WHERE team = ?1 AND channel = ?2)",
                params![team, channel],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}
