// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack Web API adapter for DBot.
//!
//! Implements [`dbot_core::ChatConnector`] and [`dbot_core::ChatClient`]
//! over plain HTTPS. Events arrive through the gateway's `/events` endpoint,
//! so no socket connection is held here.

pub mod client;
pub mod oauth;

pub use client::{SlackApi, SlackClient};
pub use oauth::{SCOPES, authorize_url};
