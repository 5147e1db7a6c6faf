// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the pipeline and its collaborators.
//!
//! Async traits use `#[async_trait]` so they can be held as `Arc<dyn _>`.

pub mod adapter;
pub mod chat;
pub mod oracle;
pub mod queue;
pub mod repo;

pub use adapter::PluginAdapter;
pub use chat::{ChatClient, ChatConnector};
pub use oracle::{MalwareScanner, VtOracle, XfeCredentials, XfeOracle};
pub use queue::Queue;
pub use repo::Repo;
