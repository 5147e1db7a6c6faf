// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rows of the database-backed message queue.
//!
//! Competing consumers use [`claim`], which reads and marks rows consumed in
//! one transaction. Fan-out consumers use [`after`] with their own high-water
//! mark and never mark rows consumed.

use chrono::{DateTime, Utc};
use dbot_core::DbotError;
use rusqlite::{Row, params};

use crate::database::{Database, map_tr_err};
use crate::models::QueueRow;

fn from_row(row: &Row<'_>) -> rusqlite::Result<QueueRow> {
    Ok(QueueRow {
        id: row.get(0)?,
        name: row.get(1)?,
        message_type: row.get(2)?,
        message: row.get(3)?,
        ts: row.get(4)?,
    })
}

/// Append a message. Returns the new row id.
pub async fn enqueue(
    db: &Database,
    message_type: &str,
    name: &str,
    message: &str,
) -> Result<i64, DbotError> {
    let message_type = message_type.to_string();
    let name = name.to_string();
    let message = message.to_string();
    let ts = Utc::now().to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue (name, message_type, message, ts) VALUES (?1, ?2, ?3, ?4)",
                params![name, message_type, message, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Take up to `limit` unconsumed rows of `message_type` addressed to `name`
/// and mark them consumed.
pub async fn claim(
    db: &Database,
    message_type: &str,
    name: &str,
    limit: usize,
) -> Result<Vec<QueueRow>, DbotError> {
    let message_type = message_type.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(
                    "SELECT id, name, message_type, message, ts FROM queue
                     WHERE message_type = ?1 AND name = ?2 AND consumed = 0
                     ORDER BY id ASC LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![message_type, name, limit as i64], from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            {
                let mut mark = tx.prepare("UPDATE queue SET consumed = 1 WHERE id = ?1")?;
                for row in &rows {
                    mark.execute(params![row.id])?;
                }
            }
            tx.commit()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Rows of `message_type` with an id above `after_id`, oldest first.
pub async fn after(
    db: &Database,
    message_type: &str,
    after_id: i64,
) -> Result<Vec<QueueRow>, DbotError> {
    let message_type = message_type.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, message_type, message, ts FROM queue
                 WHERE message_type = ?1 AND id > ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![message_type, after_id], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Highest row id of `message_type`, or 0 for none.
pub async fn high_water_mark(db: &Database, message_type: &str) -> Result<i64, DbotError> {
    let message_type = message_type.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(id), 0) FROM queue WHERE message_type = ?1",
                params![message_type],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete consumed rows, and any row older than `before`.
pub async fn purge(db: &Database, before: DateTime<Utc>) -> Result<usize, DbotError> {
    let before = before.to_rfc3339();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM queue WHERE consumed = 1 OR ts < ?1",
                params![before],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn claim_marks_rows_consumed() {
        let (db, _dir) = test_db().await;
        enqueue(&db, "work", "", "{\"a\":1}").await.unwrap();
        enqueue(&db, "work", "", "{\"a\":2}").await.unwrap();

        let first = claim(&db, "work", "", 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message, "{\"a\":1}");

        let rest = claim(&db, "work", "", 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].message, "{\"a\":2}");
        assert!(claim(&db, "work", "", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_respects_name() {
        let (db, _dir) = test_db().await;
        enqueue(&db, "workr", "bot-a", "a").await.unwrap();
        enqueue(&db, "workr", "bot-b", "b").await.unwrap();
        let rows = claim(&db, "workr", "bot-b", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "b");
    }

    #[tokio::test]
    async fn fan_out_reads_do_not_consume() {
        let (db, _dir) = test_db().await;
        let start = high_water_mark(&db, "conf").await.unwrap();
        assert_eq!(start, 0);
        enqueue(&db, "conf", "", "c1").await.unwrap();
        let seen = after(&db, "conf", start).await.unwrap();
        assert_eq!(seen.len(), 1);
        // Another reader still sees it.
        assert_eq!(after(&db, "conf", start).await.unwrap().len(), 1);
        assert!(after(&db, "conf", seen[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_removes_consumed_rows() {
        let (db, _dir) = test_db().await;
        enqueue(&db, "work", "", "x").await.unwrap();
        claim(&db, "work", "", 1).await.unwrap();
        let removed = purge(&db, Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(removed, 1);
    }
}
