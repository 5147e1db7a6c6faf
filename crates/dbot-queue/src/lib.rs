// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue backings connecting the bot, dedup and worker roles.
//!
//! Every backing implements [`dbot_core::Queue`] with the same semantics;
//! [`build_queue`] picks one from configuration.

mod codec;
pub mod db;
pub mod factory;
mod local;
pub mod memory;
pub mod pubsub;
pub mod sqs;

pub use db::{DbQueue, DbQueueOptions};
pub use factory::{build_queue, instance_name};
pub use memory::MemoryQueue;
pub use pubsub::{PubSubAuth, PubSubQueue, PubSubSettings};
pub use sqs::{SqsNames, SqsQueue};
