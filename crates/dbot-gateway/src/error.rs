// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON error envelope returned by every endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// One entry of the `{errors:[...]}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub id: &'static str,
    pub status: u16,
    pub title: &'static str,
    pub detail: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    errors: [&'a ApiError; 1],
}

impl ApiError {
    const fn fixed(id: &'static str, status: u16, title: &'static str) -> Self {
        Self {
            id,
            status,
            title,
            detail: String::new(),
        }
    }

    fn with(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn bad_request() -> Self {
        Self::fixed("bad_request", 400, "Bad request")
            .with("Request body is not well-formed. It must be JSON.")
    }

    pub fn bad_content() -> Self {
        Self::fixed("bad_content", 400, "Bad content").with("Request contains bad content")
    }

    pub fn bad_regexp(err: impl std::fmt::Display) -> Self {
        Self::fixed("bad_request", 400, "Bad Request").with(format!("Error parsing regexp - {err}"))
    }

    pub fn unauthorized() -> Self {
        Self::fixed("unauthorized", 401, "Unauthorized").with("The request requires authorization")
    }

    pub fn oauth(detail: impl Into<String>) -> Self {
        Self::fixed("oauth_err", 401, "Slack OAuth Error").with(detail)
    }

    pub fn csrf() -> Self {
        Self::fixed("forbidden", 403, "Forbidden").with("Issue with CSRF code")
    }

    pub fn not_found() -> Self {
        Self::fixed("not_found", 404, "Not found").with("The page you requested is not found")
    }

    pub fn not_acceptable() -> Self {
        Self::fixed("not_acceptable", 406, "Not Acceptable")
            .with("Accept header must be set to 'application/json'.")
    }

    pub fn unsupported_media_type() -> Self {
        Self::fixed("unsupported_media_type", 415, "Unsupported Media Type")
            .with("Content-Type header must be set to: 'application/json'.")
    }

    pub fn internal() -> Self {
        Self::fixed("internal_server_error", 500, "Internal Server Error")
            .with("Something went wrong.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(Envelope { errors: [&self] })).into_response()
    }
}

impl From<dbot_core::DbotError> for ApiError {
    fn from(e: dbot_core::DbotError) -> Self {
        if e.is_not_found() {
            return Self::not_found();
        }
        tracing::error!(error = %e, "request failed");
        Self::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let err = ApiError::csrf();
        let body = serde_json::to_value(Envelope { errors: [&err] }).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"errors": [{
                "id": "forbidden",
                "status": 403,
                "title": "Forbidden",
                "detail": "Issue with CSRF code"
            }]})
        );
    }

    #[test]
    fn repository_not_found_maps_to_404() {
        let err: ApiError = dbot_core::DbotError::not_found("team", "T1").into();
        assert_eq!(err.status, 404);
        let err: ApiError = dbot_core::DbotError::Internal("boom".into()).into();
        assert_eq!(err.status, 500);
    }
}
