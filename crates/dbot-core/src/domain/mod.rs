// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records shared by every role.

pub mod configuration;
pub mod stats;
pub mod team;
pub mod work;

pub use configuration::Configuration;
pub use stats::{MaliciousContent, Statistics, VerdictCounts};
pub use team::{OAuthState, Team, User, UserStatus};
pub use work::{
    Context, FileRef, FileReply, HashReply, IpReply, RequestKind, UrlReply, VtHashResult,
    VtIpResult, VtUrlResult, WorkReply, WorkRequest, XfeHashResult, XfeIpResult, XfeUrlResult,
};
