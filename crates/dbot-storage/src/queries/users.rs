// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User CRUD operations.

use dbot_core::DbotError;
use rusqlite::{Connection, Row, params};

use crate::database::{Database, map_tr_err, ts_from_sql, ts_to_sql};
use crate::models::{Team, User, UserStatus};

const COLUMNS: &str = "id, team, name, type, status, real_name, email, is_bot, is_admin, \
                       is_owner, is_primary_owner, is_restricted, is_ultra_restricted, \
                       external_id, token, created";

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let status: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        team: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        status: status.parse().unwrap_or(UserStatus::Active),
        real_name: row.get(5)?,
        email: row.get(6)?,
        is_bot: row.get(7)?,
        is_admin: row.get(8)?,
        is_owner: row.get(9)?,
        is_primary_owner: row.get(10)?,
        is_restricted: row.get(11)?,
        is_ultra_restricted: row.get(12)?,
        external_id: row.get(13)?,
        token: row.get(14)?,
        created: ts_from_sql(row.get(15)?),
    })
}

pub(crate) fn upsert(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, team, name, type, status, real_name, email, is_bot, is_admin,
                            is_owner, is_primary_owner, is_restricted, is_ultra_restricted,
                            external_id, token, created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(id) DO UPDATE SET
            team = excluded.team, name = excluded.name, type = excluded.type,
            status = excluded.status, real_name = excluded.real_name, email = excluded.email,
            is_bot = excluded.is_bot, is_admin = excluded.is_admin,
            is_owner = excluded.is_owner, is_primary_owner = excluded.is_primary_owner,
            is_restricted = excluded.is_restricted,
            is_ultra_restricted = excluded.is_ultra_restricted,
            external_id = excluded.external_id, token = excluded.token,
            created = excluded.created",
        params![
            user.id,
            user.team,
            user.name,
            user.kind,
            user.status.to_string(),
            user.real_name,
            user.email,
            user.is_bot,
            user.is_admin,
            user.is_owner,
            user.is_primary_owner,
            user.is_restricted,
            user.is_ultra_restricted,
            user.external_id,
            user.token,
            ts_to_sql(user.created),
        ],
    )?;
    Ok(())
}

pub async fn set_user(db: &Database, user: &User) -> Result<(), DbotError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| upsert(conn, &user))
        .await
        .map_err(map_tr_err)
}

/// Upsert a team and a user in one transaction.
pub async fn set_team_and_user(db: &Database, team: &Team, user: &User) -> Result<(), DbotError> {
    let team = team.clone();
    let user = user.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            crate::queries::teams::upsert(&tx, &team)?;
            upsert(&tx, &user)?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

async fn get_one(db: &Database, column: &'static str, value: &str) -> Result<Option<User>, DbotError> {
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM users WHERE {column} = ?1");
            match conn.query_row(&sql, params![value], from_row) {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_user(db: &Database, id: &str) -> Result<Option<User>, DbotError> {
    get_one(db, "id", id).await
}

pub async fn get_user_by_external_id(
    db: &Database,
    external_id: &str,
) -> Result<Option<User>, DbotError> {
    get_one(db, "external_id", external_id).await
}

/// Members of a team, oldest first.
pub async fn team_members(db: &Database, team: &str) -> Result<Vec<User>, DbotError> {
    let team = team.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM users WHERE team = ?1 ORDER BY created, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![team], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
