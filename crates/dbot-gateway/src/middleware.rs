// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request guards: XSRF double-submit, session authentication, Slack request
//! signatures, `Accept` negotiation, JSON bodies and panic recovery.

use std::any::Any;

use axum::body::{Body, to_bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use dbot_core::domain::User;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::session::{SESSION_COOKIE, XSRF_COOKIE, XSRF_HEADER};
use crate::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Largest Events API body read for signature verification.
const MAX_EVENT_BODY: usize = 1024 * 1024;

/// The user behind a valid session, placed in request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Issue an XSRF cookie on safe methods; require it on every other method.
pub async fn csrf(
    State(state): State<GatewayState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let cookie = jar.get(XSRF_COOKIE).map(|c| c.value().to_string());
    if matches!(*request.method(), Method::GET | Method::HEAD) {
        if cookie.is_some() {
            return next.run(request).await;
        }
        return match state.cookies.xsrf() {
            Ok(fresh) => (jar.add(fresh), next.run(request).await).into_response(),
            Err(e) => {
                error!(error = %e, "unable to generate XSRF token");
                next.run(request).await
            }
        };
    }
    let header = request
        .headers()
        .get(XSRF_HEADER)
        .and_then(|v| v.to_str().ok());
    if state.cookies.xsrf_matches(cookie.as_deref(), header) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "XSRF check failed");
        ApiError::csrf().into_response()
    }
}

/// Load the session user and roll the session forward.
pub async fn require_session(
    State(state): State<GatewayState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(value) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        info!("access to authenticated service without session");
        return ApiError::unauthorized().into_response();
    };
    let mut session = match state.cookies.open_session(&value) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "unable to open session cookie");
            return ApiError::unauthorized().into_response();
        }
    };
    if session.is_expired(Utc::now(), state.config.security.timeout) {
        debug!(user = %session.user, "session timeout");
        return ApiError::unauthorized().into_response();
    }
    let user = match state.repo.user(&session.user_id).await {
        Ok(u) => u,
        Err(e) if e.is_not_found() => return ApiError::unauthorized().into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };
    request.extensions_mut().insert(AuthUser(user));

    session.when = Utc::now();
    let response = next.run(request).await;
    match state.cookies.seal_session(&session) {
        Ok(cookie) => (jar.add(cookie), response).into_response(),
        Err(e) => {
            warn!(error = %e, "unable to refresh session");
            response
        }
    }
}

/// Accept only callbacks signed with the app's signing secret.
///
/// Fails closed: with no secret configured every callback is refused.
pub async fn slack_signature(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let secret = state.config.slack.signing_secret.as_str();
    if secret.is_empty() {
        error!("Slack.SigningSecret is not configured, refusing event callback");
        return ApiError::unauthorized().into_response();
    }
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_EVENT_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "unable to read event callback body");
            return ApiError::bad_request().into_response();
        }
    };
    let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok());
    if let Err(reason) = signature::verify(
        secret,
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
        &body,
        Utc::now().timestamp(),
    ) {
        warn!(%reason, "event callback refused");
        return ApiError::unauthorized().into_response();
    }
    next.run(Request::from_parts(parts, Body::from(body))).await
}

/// Reject requests whose `Accept` header rules out JSON.
pub async fn accept_json(request: Request, next: Next) -> Response {
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if accepts_json(accept) {
        next.run(request).await
    } else {
        warn!(accept = %accept, "request does not accept JSON");
        ApiError::not_acceptable().into_response()
    }
}

fn accepts_json(accept: &str) -> bool {
    accept.is_empty()
        || accept.split(',').any(|part| {
            let media = part.split(';').next().unwrap_or("").trim();
            matches!(media, "application/json" | "application/*" | "*/*")
        })
}

/// A JSON body whose rejections use the error envelope.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => Err(ApiError::unsupported_media_type()),
            Err(e) => {
                warn!(error = %e, "unable to decode request body");
                Err(ApiError::bad_request())
            }
        }
    }
}

/// Response for a handler that panicked.
pub fn recovered(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown");
    warn!(error = %detail, "recovered from panic");
    ApiError::internal().into_response()
}
