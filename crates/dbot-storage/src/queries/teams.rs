// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Team (workspace) CRUD operations.

use dbot_core::DbotError;
use rusqlite::{Connection, Row, params};

use crate::database::{Database, map_tr_err, ts_from_sql, ts_to_sql};
use crate::models::{Team, UserStatus};

const COLUMNS: &str = "id, name, email_domain, domain, plan, external_id, created, \
                       bot_user_id, bot_token, vt_key, xfe_key, xfe_pass, status";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    let status: String = row.get(12)?;
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        email_domain: row.get(2)?,
        domain: row.get(3)?,
        plan: row.get(4)?,
        external_id: row.get(5)?,
        created: ts_from_sql(row.get(6)?),
        bot_user_id: row.get(7)?,
        bot_token: row.get(8)?,
        vt_key: row.get(9)?,
        xfe_key: row.get(10)?,
        xfe_pass: row.get(11)?,
        status: status.parse().unwrap_or(UserStatus::Active),
    })
}

/// Insert or replace a team, keyed by its internal id.
pub(crate) fn upsert(conn: &Connection, team: &Team) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO teams (id, name, email_domain, domain, plan, external_id, created,
                            bot_user_id, bot_token, vt_key, xfe_key, xfe_pass, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name, email_domain = excluded.email_domain,
            domain = excluded.domain, plan = excluded.plan,
            external_id = excluded.external_id, created = excluded.created,
            bot_user_id = excluded.bot_user_id, bot_token = excluded.bot_token,
            vt_key = excluded.vt_key, xfe_key = excluded.xfe_key,
            xfe_pass = excluded.xfe_pass, status = excluded.status",
        params![
            team.id,
            team.name,
            team.email_domain,
            team.domain,
            team.plan,
            team.external_id,
            ts_to_sql(team.created),
            team.bot_user_id,
            team.bot_token,
            team.vt_key,
            team.xfe_key,
            team.xfe_pass,
            team.status.to_string(),
        ],
    )?;
    Ok(())
}

pub async fn set_team(db: &Database, team: &Team) -> Result<(), DbotError> {
    let team = team.clone();
    db.connection()
        .call(move |conn| upsert(conn, &team))
        .await
        .map_err(map_tr_err)
}

async fn get_one(db: &Database, column: &'static str, value: &str) -> Result<Option<Team>, DbotError> {
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM teams WHERE {column} = ?1");
            match conn.query_row(&sql, params![value], from_row) {
                Ok(team) => Ok(Some(team)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_team(db: &Database, id: &str) -> Result<Option<Team>, DbotError> {
    get_one(db, "id", id).await
}

pub async fn get_team_by_external_id(
    db: &Database,
    external_id: &str,
) -> Result<Option<Team>, DbotError> {
    get_one(db, "external_id", external_id).await
}

/// All active teams.
pub async fn list_teams(db: &Database) -> Result<Vec<Team>, DbotError> {
    db.connection()
        .call(|conn| {
            let sql = format!("SELECT {COLUMNS} FROM teams WHERE status = 'active' ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
