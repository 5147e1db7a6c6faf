// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OAuth "Add to Slack" authorisation URL.

/// Page users are sent to in order to install the bot.
pub const AUTHORIZE_URL: &str = "https://slack.com/oauth/authorize";

/// Scopes requested at install time.
pub const SCOPES: &str = "bot,files:read,channels:write,team:read,users:read";

/// Authorisation URL carrying `state`, with `redirect_uri` when set.
pub fn authorize_url(client_id: &str, state: &str, redirect_uri: &str) -> String {
    let mut params = vec![
        ("client_id", client_id),
        ("scope", SCOPES),
        ("state", state),
    ];
    if !redirect_uri.is_empty() {
        params.push(("redirect_uri", redirect_uri));
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{AUTHORIZE_URL}?{query}")
}
