// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Convicted indicators.

use chrono::Utc;
use dbot_core::DbotError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::MaliciousContent;

pub async fn insert(db: &Database, content: &MaliciousContent) -> Result<i64, DbotError> {
    let c = content.clone();
    let ts = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO malicious_content
                    (team, channel, message_id, content_type, content, file_name, vt, xfe, clamav, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    c.team,
                    c.channel,
                    c.message_id,
                    c.content_type,
                    c.content,
                    c.file_name,
                    c.vt,
                    c.xfe,
                    c.clamav,
                    ts,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Convicted content recorded for `team`, oldest first.
pub async fn list_for_team(db: &Database, team: &str) -> Result<Vec<MaliciousContent>, DbotError> {
    let team = team.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT team, channel, message_id, content_type, content, file_name, vt, xfe, clamav
                 FROM malicious_content WHERE team = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![team], |row| {
                Ok(MaliciousContent {
                    team: row.get(0)?,
                    channel: row.get(1)?,
                    message_id: row.get(2)?,
                    content_type: row.get(3)?,
                    content: row.get(4)?,
                    file_name: row.get(5)?,
                    vt: row.get(6)?,
                    xfe: row.get(7)?,
                    clamav: row.get(8)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
