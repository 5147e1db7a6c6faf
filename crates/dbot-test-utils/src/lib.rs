// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for DBot integration tests.
//!
//! Provides mock collaborators and an in-process harness for fast,
//! deterministic tests without Slack, the reputation services or clamd.
//!
//! # Components
//!
//! - [`MockChat`] - Chat platform that records every outbound call
//! - [`MockXfe`], [`MockVt`], [`MockScanner`] - Scripted oracles
//! - [`TestHarness`] - Bot, dedup and worker wired over the memory queue

pub mod harness;
pub mod mock_chat;
pub mod mock_oracles;

pub use harness::TestHarness;
pub use mock_chat::{ChatCall, MockChat};
pub use mock_oracles::{MockScanner, MockVt, MockXfe};
