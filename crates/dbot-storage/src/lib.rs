// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for DBot.
//!
//! WAL-mode SQLite with embedded migrations, a single-writer concurrency
//! model via `tokio-rusqlite`, typed queries per table, and [`SqliteRepo`],
//! the [`Repo`](dbot_core::Repo) implementation that encrypts credentials
//! at rest.

pub mod database;
pub mod gc;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod repo;

pub use database::Database;
pub use gc::{OAUTH_GC_INTERVAL, spawn_oauth_gc};
pub use models::QueueRow;
pub use repo::SqliteRepo;
