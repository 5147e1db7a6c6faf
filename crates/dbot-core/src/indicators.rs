// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indicator-of-compromise extraction from message text.
//!
//! Chat platforms wrap links as `<http://example.com>` or
//! `<http://example.com|example.com>`; only the wrapped form is recognised.

use std::sync::LazyLock;

use regex::Regex;

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\b").unwrap());
static MD5: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{32}\b").unwrap());
static SHA1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{40}\b").unwrap());
static SHA256: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-fA-F0-9]{64}\b").unwrap());

const URL_MARKER: &str = "<http";

/// Digest family of a hash indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Md5,
    Sha1,
    Sha256,
}

/// Everything found in one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indicators {
    pub urls: Vec<String>,
    pub ips: Vec<String>,
    pub hashes: Vec<String>,
}

impl Indicators {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.ips.is_empty() && self.hashes.is_empty()
    }
}

/// Cheap check used by the bot before building a work request.
pub fn has_indicator(text: &str) -> bool {
    text.contains(URL_MARKER)
        || IPV4.is_match(text)
        || MD5.is_match(text)
        || SHA1.is_match(text)
        || SHA256.is_match(text)
}

/// The first wrapped URL, cut at `|` when a label follows.
///
/// A `<http` with no closing `>` yields nothing.
pub fn first_url(text: &str) -> Option<String> {
    let start = text.find(URL_MARKER)?;
    let rest = &text[start + 1..];
    let end = rest.find('>')?;
    let token = &rest[..end];
    let url = token.split('|').next().unwrap_or(token).trim();
    (!url.is_empty()).then(|| url.to_string())
}

/// Every IPv4 dotted quad, in order of appearance, without duplicates.
pub fn ipv4s(text: &str) -> Vec<String> {
    unique(IPV4.find_iter(text).map(|m| m.as_str().to_string()))
}

/// Every MD5, SHA1 and SHA256 hash, without duplicates.
pub fn hashes(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = [&*MD5, &*SHA1, &*SHA256]
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    unique(found.into_iter().map(|(_, h)| h))
}

/// Classify a hash by its length.
pub fn hash_kind(hash: &str) -> Option<HashKind> {
    if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match hash.len() {
        32 => Some(HashKind::Md5),
        40 => Some(HashKind::Sha1),
        64 => Some(HashKind::Sha256),
        _ => None,
    }
}

/// Extract the first URL, all IPs and all hashes.
pub fn extract(text: &str) -> Indicators {
    Indicators {
        urls: first_url(text).into_iter().collect(),
        ips: ipv4s(text),
        hashes: hashes(text),
    }
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_url_is_extracted() {
        assert_eq!(
            first_url("check <http://example.com>").as_deref(),
            Some("http://example.com")
        );
    }

    #[test]
    fn labelled_url_is_cut_at_pipe() {
        assert_eq!(
            first_url("see <https://evil.io/x|evil.io> now").as_deref(),
            Some("https://evil.io/x")
        );
    }

    #[test]
    fn unterminated_url_yields_nothing() {
        assert_eq!(first_url("broken <http://example.com"), None);
        assert!(extract("broken <http://example.com").urls.is_empty());
    }

    #[test]
    fn only_first_url_is_taken() {
        let found = extract("<http://a.com> and <http://b.com>");
        assert_eq!(found.urls, vec!["http://a.com".to_string()]);
    }

    #[test]
    fn ips_are_found_in_order() {
        assert_eq!(
            ipv4s("telnet 10.0.0.1 then 8.8.8.8 and 10.0.0.1"),
            vec!["10.0.0.1".to_string(), "8.8.8.8".to_string()]
        );
    }

    #[test]
    fn hash_lengths_are_classified() {
        let md5 = "d41d8cd98f00b204e9800998ecf8427e";
        let sha1 = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
        let sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(hash_kind(md5), Some(HashKind::Md5));
        assert_eq!(hash_kind(sha1), Some(HashKind::Sha1));
        assert_eq!(hash_kind(sha256), Some(HashKind::Sha256));
        assert_eq!(hashes(&format!("{md5} {sha1} {sha256}")).len(), 3);
    }

    #[test]
    fn other_hex_lengths_match_nothing() {
        let thirty_three = "d41d8cd98f00b204e9800998ecf8427ea";
        assert!(hashes(thirty_three).is_empty());
        assert_eq!(hash_kind(thirty_three), None);
        assert!(!has_indicator(thirty_three));
    }

    #[test]
    fn long_hash_does_not_also_match_shorter_pattern() {
        let sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(hashes(sha256), vec![sha256.to_string()]);
    }

    #[test]
    fn plain_text_has_no_indicator() {
        assert!(!has_indicator("hello there"));
        assert!(has_indicator("go to <http://x.com>"));
        assert!(has_indicator("ping 1.2.3.4"));
    }
}
