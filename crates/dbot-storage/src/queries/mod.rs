// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.
//!
//! Queries see secrets exactly as stored; encryption happens in
//! [`SqliteRepo`](crate::repo::SqliteRepo).

pub mod channels;
pub mod configurations;
pub mod malicious;
pub mod oauth;
pub mod queue;
pub mod statistics;
pub mod teams;
pub mod users;
