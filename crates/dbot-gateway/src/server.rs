// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web tier server built on axum.
//!
//! Routes fall into four groups that differ only in the guards in front of
//! them: static pages (XSRF cookie issue), JSON endpoints (plus `Accept`
//! negotiation), authenticated JSON endpoints (plus the session) and the
//! Events API callback (Slack request signature instead of XSRF, which the
//! platform cannot echo).

use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use dbot_bot::InboundEvent;
use dbot_config::DbotConfig;
use dbot_core::{ChatConnector, DbotError, Queue, Repo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{accept_json, csrf, recovered, require_session, slack_signature};
use crate::session::CookieSealer;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<DbotConfig>,
    pub repo: Arc<dyn Repo>,
    pub queue: Arc<dyn Queue>,
    pub connector: Arc<dyn ChatConnector>,
    pub cookies: CookieSealer,
    /// Feeds the bot running in this process, if any.
    pub events: Option<mpsc::Sender<InboundEvent>>,
    /// Prefix of the per-request reply queues used by `/work`.
    pub reply_name: String,
}

impl GatewayState {
    pub fn new(
        config: Arc<DbotConfig>,
        repo: Arc<dyn Repo>,
        queue: Arc<dyn Queue>,
        connector: Arc<dyn ChatConnector>,
        events: Option<mpsc::Sender<InboundEvent>>,
        reply_name: impl Into<String>,
    ) -> Result<Self, DbotError> {
        let cookies = CookieSealer::new(&config.security.session_key, config.is_prod())?;
        Ok(Self {
            config,
            repo,
            queue,
            connector,
            cookies,
            events,
            reply_name: reply_name.into(),
        })
    }
}

/// Build the full router.
pub fn router(state: GatewayState) -> Router {
    let pages = Router::new()
        .route("/", get(handlers::index_page))
        .route("/conf", get(handlers::conf_page))
        .route("/details", get(handlers::details_page))
        .route("/oauth", get(handlers::initiate_oauth))
        .route("/auth", get(handlers::login_oauth))
        .route("/logout", get(handlers::logout));

    let json = Router::new()
        .route("/work", get(handlers::work))
        .route("/messages", get(handlers::total_messages));

    let authenticated = Router::new()
        .route("/user", get(handlers::current_user))
        .route("/info", get(handlers::info))
        .route("/match", post(handlers::regexp_match))
        .route("/save", post(handlers::save))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let guarded = Router::new()
        .merge(json)
        .merge(authenticated)
        .route_layer(from_fn(accept_json))
        .merge(pages)
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state.clone(), csrf));

    let callbacks = Router::new()
        .route("/events", post(handlers::events))
        .route_layer(from_fn_with_state(state.clone(), slack_signature));

    Router::new()
        .merge(callbacks)
        .merge(guarded)
        .layer(CatchPanicLayer::custom(recovered))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a `:7070` style address into one a socket can bind.
pub fn bind_address(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    }
}

/// Serve until `cancel` fires, then finish in-flight requests.
pub async fn start_server(
    address: &str,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), DbotError> {
    let addr = bind_address(address);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DbotError::Internal(format!("failed to bind web tier to {addr}: {e}")))?;
    tracing::info!(address = %addr, "web tier listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| DbotError::Internal(format!("web tier error: {e}")))?;
    tracing::info!("web tier stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_address_expands_bare_port() {
        assert_eq!(bind_address(":7070"), "0.0.0.0:7070");
        assert_eq!(bind_address("127.0.0.1:80"), "127.0.0.1:80");
    }
}
