// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slack request signing for Events API callbacks.
//!
//! The platform sends `X-Slack-Signature: v0=<hex>` where the hex is
//! HMAC-SHA256 over `v0:{X-Slack-Request-Timestamp}:{raw body}` keyed with
//! the app's signing secret.

use ring::hmac;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Largest accepted distance between the request timestamp and now.
pub const MAX_SKEW_SECS: i64 = 300;

const VERSION: &str = "v0";

/// Why a callback was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    MissingHeaders,
    BadTimestamp,
    Stale,
    Mismatch,
}

fn base_string(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut base = format!("{VERSION}:{timestamp}:").into_bytes();
    base.extend_from_slice(body);
    base
}

/// The `X-Slack-Signature` value for `body` sent at `timestamp`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, &base_string(timestamp, body));
    format!("{VERSION}={}", hex::encode(tag.as_ref()))
}

/// Check a callback's signature headers against `secret` at unix time `now`.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), Rejection> {
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return Err(Rejection::MissingHeaders);
    };
    let sent: i64 = timestamp.parse().map_err(|_| Rejection::BadTimestamp)?;
    if (now - sent).abs() > MAX_SKEW_SECS {
        return Err(Rejection::Stale);
    }
    let tag = signature
        .strip_prefix("v0=")
        .and_then(|h| hex::decode(h).ok())
        .ok_or(Rejection::Mismatch)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, &base_string(timestamp, body), &tag).map_err(|_| Rejection::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&command=%2Fweather";

    #[test]
    fn own_signature_verifies() {
        let signature = sign(SECRET, "1531420618", BODY);
        assert!(signature.starts_with("v0="));
        assert_eq!(signature.len(), 3 + 64);
        assert_eq!(verify(SECRET, Some("1531420618"), Some(&signature), BODY, 1531420700), Ok(()));
    }

    #[test]
    fn tampered_body_or_secret_is_refused() {
        let signature = sign(SECRET, "1531420618", BODY);
        assert_eq!(
            verify(SECRET, Some("1531420618"), Some(&signature), b"other", 1531420618),
            Err(Rejection::Mismatch)
        );
        assert_eq!(
            verify("wrong", Some("1531420618"), Some(&signature), BODY, 1531420618),
            Err(Rejection::Mismatch)
        );
        assert_eq!(
            verify(SECRET, Some("1531420618"), Some("v1=abcd"), BODY, 1531420618),
            Err(Rejection::Mismatch)
        );
    }

    #[test]
    fn timestamps_outside_the_window_are_refused() {
        let signature = sign(SECRET, "1531420618", BODY);
        let late = 1531420618 + MAX_SKEW_SECS + 1;
        assert_eq!(
            verify(SECRET, Some("1531420618"), Some(&signature), BODY, late),
            Err(Rejection::Stale)
        );
        assert_eq!(
            verify(SECRET, Some("soon"), Some(&signature), BODY, 1531420618),
            Err(Rejection::BadTimestamp)
        );
        assert_eq!(verify(SECRET, None, Some(&signature), BODY, 0), Err(Rejection::MissingHeaders));
    }
}
