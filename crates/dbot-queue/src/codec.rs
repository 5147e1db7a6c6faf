// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire encoding shared by the backings: JSON bodies, base64 for Pub/Sub.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dbot_core::DbotError;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, DbotError> {
    serde_json::to_string(value).map_err(|e| DbotError::Queue {
        message: format!("failed to encode queue message: {e}"),
        source: Some(Box::new(e)),
    })
}

pub(crate) fn from_json<T: DeserializeOwned>(body: &str) -> Result<T, DbotError> {
    serde_json::from_str(body).map_err(|e| DbotError::Decode {
        message: format!("malformed queue message: {e}"),
        source: Some(Box::new(e)),
    })
}

pub(crate) fn to_base64_json<T: Serialize>(value: &T) -> Result<String, DbotError> {
    Ok(STANDARD.encode(to_json(value)?))
}

pub(crate) fn from_base64_json<T: DeserializeOwned>(data: &str) -> Result<T, DbotError> {
    let bytes = STANDARD.decode(data).map_err(|e| DbotError::Decode {
        message: format!("queue message is not base64: {e}"),
        source: Some(Box::new(e)),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| DbotError::Decode {
        message: format!("malformed queue message: {e}"),
        source: Some(Box::new(e)),
    })
}
