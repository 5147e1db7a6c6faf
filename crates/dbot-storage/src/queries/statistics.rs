// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Statistics rows, one per team per flush.

use chrono::Utc;
use dbot_core::DbotError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Statistics;

pub async fn insert(db: &Database, stats: &Statistics) -> Result<(), DbotError> {
    let s = stats.clone();
    let ts = s.ts.unwrap_or_else(Utc::now).to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO statistics (team, ts, messages,
                    files_clean, files_dirty, files_unknown,
                    urls_clean, urls_dirty, urls_unknown,
                    hashes_clean, hashes_dirty, hashes_unknown,
                    ips_clean, ips_dirty, ips_unknown)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    s.team,
                    ts,
                    s.messages as i64,
                    s.files.clean as i64,
                    s.files.dirty as i64,
                    s.files.unknown as i64,
                    s.urls.clean as i64,
                    s.urls.dirty as i64,
                    s.urls.unknown as i64,
                    s.hashes.clean as i64,
                    s.hashes.dirty as i64,
                    s.hashes.unknown as i64,
                    s.ips.clean as i64,
                    s.ips.dirty as i64,
                    s.ips.unknown as i64,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Sum of `messages` across every flush of every team.
pub async fn total_messages(db: &Database) -> Result<u64, DbotError> {
    let total: i64 = db
        .connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(messages), 0) FROM statistics",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(total.max(0) as u64)
}
