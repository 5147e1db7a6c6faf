// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verdict scoring: raw oracle answers in, `clean`/`dirty`/`unknown` out.
//!
//! A VirusTotal report counts as an answer only with `response_code == 1`.
//! Errors and not-found results carry no signal.

use chrono::{DateTime, NaiveDateTime, Utc};
use dbot_core::Verdict;
use dbot_core::domain::{
    HashReply, VtHashResult, VtIpResult, VtUrlResult, XfeHashResult, XfeIpResult, XfeUrlResult,
};
use dbot_core::oracle::VtIpReport;

/// XFE URL/IP risk score at which an indicator is convicted.
pub const XFE_SCORE_TO_CONVICT: f64 = 5.0;
/// VirusTotal engine detections at which a URL or hash is convicted.
pub const VT_POSITIVES_TO_CONVICT: u32 = 5;
/// Summed recent detected-URL positives at which an IP is convicted.
pub const VT_IP_POSITIVES_TO_CONVICT: u32 = 10;
/// XFE malware detection coverage above which a hash is convicted.
pub const XFE_COVERAGE_TO_CONVICT: u32 = 5;
/// IP signals at or above these keep the verdict at `unknown`.
pub const XFE_IP_SCORE_WARNING: f64 = 3.0;
pub const VT_IP_POSITIVES_WARNING: u32 = 5;

/// Detected URLs older than this do not count against an IP.
const IP_DETECTION_WINDOW_DAYS: i64 = 365;
const VT_SCAN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn score_url(xfe: &XfeUrlResult, vt: &VtUrlResult) -> Verdict {
    let xfe_score = xfe.url_details.as_ref().map(|d| d.score);
    let vt_report = vt.url_report.as_ref().filter(|r| r.response_code == 1);
    let positives = vt_report.map(|r| r.positives);

    if xfe_score.is_some_and(|s| s >= XFE_SCORE_TO_CONVICT)
        || positives.is_some_and(|p| p >= VT_POSITIVES_TO_CONVICT)
    {
        return Verdict::Dirty;
    }
    let answered = xfe_score.is_some() || positives.is_some();
    if answered && xfe_score.unwrap_or(0.0) < 1.0 && positives.unwrap_or(0) < 1 {
        return Verdict::Clean;
    }
    Verdict::Unknown
}

/// Sum of detected-URL positives scanned within the last year.
pub fn recent_ip_positives(report: &VtIpReport, now: DateTime<Utc>) -> u32 {
    let cutoff = now - chrono::Duration::days(IP_DETECTION_WINDOW_DAYS);
    report
        .detected_urls
        .iter()
        .filter(|d| {
            NaiveDateTime::parse_from_str(&d.scan_date, VT_SCAN_DATE_FORMAT)
                .map(|t| t.and_utc() > cutoff)
                .unwrap_or(false)
        })
        .map(|d| d.positives)
        .sum()
}

pub fn score_ip(xfe: &XfeIpResult, vt: &VtIpResult, now: DateTime<Utc>) -> Verdict {
    let xfe_score = xfe.ip_reputation.as_ref().map(|r| r.score);
    let positives = vt
        .ip_report
        .as_ref()
        .filter(|r| r.response_code == 1)
        .map(|r| recent_ip_positives(r, now));

    if xfe_score.is_some_and(|s| s >= XFE_SCORE_TO_CONVICT)
        || positives.is_some_and(|p| p >= VT_IP_POSITIVES_TO_CONVICT)
    {
        return Verdict::Dirty;
    }
    let answered = xfe_score.is_some() || positives.is_some();
    if answered
        && xfe_score.unwrap_or(0.0) < XFE_IP_SCORE_WARNING
        && positives.unwrap_or(0) < VT_IP_POSITIVES_WARNING
    {
        return Verdict::Clean;
    }
    Verdict::Unknown
}

pub fn score_hash(xfe: &XfeHashResult, vt: &VtHashResult) -> Verdict {
    let malware = xfe.malware.as_ref();
    let vt_report = vt.file_report.as_ref().filter(|r| r.response_code == 1);

    if malware.is_some_and(|m| {
        m.has_family() || m.origins.external.detection_coverage > XFE_COVERAGE_TO_CONVICT
    }) || vt_report.is_some_and(|r| r.positives >= VT_POSITIVES_TO_CONVICT)
    {
        return Verdict::Dirty;
    }
    let xfe_clean = malware.is_some_and(|m| m.origins.external.detection_coverage == 0);
    let vt_clean = vt_report.is_some_and(|r| r.positives == 0);
    let xfe_quiet = malware.is_none_or(|m| m.origins.external.detection_coverage == 0);
    let vt_quiet = vt_report.is_none_or(|r| r.positives == 0);
    if (xfe_clean || vt_clean) && xfe_quiet && vt_quiet {
        return Verdict::Clean;
    }
    Verdict::Unknown
}

/// A file is judged by its MD5 reply plus the local scanner.
///
/// `scanned` is true when the scanner ran and answered without error.
pub fn score_file(hash: Option<&HashReply>, virus: &str, scanned: bool) -> Verdict {
    if !virus.is_empty() || hash.is_some_and(|h| h.result == Verdict::Dirty) {
        return Verdict::Dirty;
    }
    if scanned || hash.is_some_and(|h| h.result == Verdict::Clean) {
        return Verdict::Clean;
    }
    Verdict::Unknown
}
