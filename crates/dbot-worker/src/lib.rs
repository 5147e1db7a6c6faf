// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indicator enrichment for DBot.
//!
//! The [`Worker`] pops [`WorkRequest`](dbot_core::domain::WorkRequest)s,
//! consults X-Force Exchange, VirusTotal and clamd, scores each indicator
//! and pushes a single reply to the requesting bot.

pub mod clamd;
pub mod ip;
pub mod scorer;
pub mod vt;
pub mod worker;
pub mod xfe;

pub use clamd::ClamdScanner;
pub use vt::VtClient;
pub use worker::{Worker, WorkerOptions};
pub use xfe::XfeClient;
