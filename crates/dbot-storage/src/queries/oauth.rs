// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending OAuth states.

use chrono::{DateTime, Utc};
use dbot_core::DbotError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::OAuthState;

pub async fn set_state(db: &Database, state: &OAuthState) -> Result<(), DbotError> {
    let state = state.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO oauth_state (state, ts) VALUES (?1, ?2)",
                params![state.state, state.ts.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_state(db: &Database, state: &str) -> Result<Option<OAuthState>, DbotError> {
    let state = state.to_string();
    let row = db
        .connection()
        .call(move |conn| {
            match conn.query_row(
                "SELECT state, ts FROM oauth_state WHERE state = ?1",
                params![state],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            ) {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    row.map(|(state, ts)| {
        let ts = DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| DbotError::Storage {
                source: Box::new(e),
            })?
            .with_timezone(&Utc);
        Ok(OAuthState { state, ts })
    })
    .transpose()
}

pub async fn delete_state(db: &Database, state: &str) -> Result<(), DbotError> {
    let state = state.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM oauth_state WHERE state = ?1", params![state])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete states created before `before`. Returns the number removed.
pub async fn purge_before(db: &Database, before: DateTime<Utc>) -> Result<usize, DbotError> {
    let before = before.to_rfc3339();
    db.connection()
        .call(move |conn| conn.execute("DELETE FROM oauth_state WHERE ts < ?1", params![before]))
        .await
        .map_err(map_tr_err)
}
