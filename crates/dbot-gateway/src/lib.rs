// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web tier for DBot.
//!
//! Installs the app through OAuth, keeps an encrypted rolling session,
//! exposes the subscription API used by the configuration page, accepts
//! Events API callbacks for the bot in this process and answers on-demand
//! scans for the details page.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod session;
pub mod signature;

pub use error::ApiError;
pub use server::{GatewayState, router, start_server};
