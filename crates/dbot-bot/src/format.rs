// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning work replies into chat attachments and file comments.
//!
//! Each indicator gets one attachment colored by its verdict. Verbose
//! channels (and direct messages) also get one attachment per oracle that
//! answered. Outside verbose channels clean indicators are left out.

use chrono::Utc;
use dbot_core::chat::{Attachment, AttachmentField};
use dbot_core::domain::{Context, FileReply, HashReply, IpReply, UrlReply, WorkReply};
use dbot_core::Verdict;
use dbot_worker::scorer::{
    VT_IP_POSITIVES_TO_CONVICT, VT_POSITIVES_TO_CONVICT, XFE_SCORE_TO_CONVICT, recent_ip_positives,
};

const XFE_TITLE: &str = "IBM X-Force Exchange";
const VT_TITLE: &str = "VirusTotal";
const CLAMAV_TITLE: &str = "ClamAV";
const XFE_EXCHANGE: &str = "https://exchange.xforce.ibmcloud.com";
/// Detected URLs listed in a verbose IP attachment.
const MAX_LISTED_URLS: usize = 20;

pub fn main_text(external_address: &str) -> String {
    format!(
        "Security check by DBot - Demisto Bot. Click <{external_address}|here> for configuration and details."
    )
}

fn verdict_word(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Clean => "clean",
        Verdict::Dirty => "malicious",
        Verdict::Unknown => "unknown",
    }
}

fn good_or_danger(convicted: bool) -> &'static str {
    if convicted { "danger" } else { "good" }
}

fn field(title: &str, value: impl Into<String>) -> AttachmentField {
    AttachmentField {
        title: title.to_string(),
        value: value.into(),
        short: true,
    }
}

/// Make a URL unclickable: `http://a.b` becomes `http[://]a[.]b`.
pub fn defang(url: &str) -> String {
    url.replacen("https://", "https[://]", 1)
        .replacen("http://", "http[://]", 1)
        .replace('.', "[.]")
}

/// Builds links back to the details page for one reply.
#[derive(Debug, Clone)]
pub struct Links<'a> {
    pub external_address: &'a str,
    pub context: &'a Context,
    pub message_id: &'a str,
}

impl Links<'_> {
    fn message(&self, text: &str) -> String {
        format!(
            "<{}/details?c={}&m={}&t={}&text={}|Details>",
            self.external_address,
            urlencoding::encode(&self.context.channel),
            urlencoding::encode(self.message_id),
            urlencoding::encode(&self.context.team),
            urlencoding::encode(text),
        )
    }

    fn file(&self, file_id: &str, md5: &str) -> String {
        format!(
            "<{}/details?f={}&t={}&text={}|Details>",
            self.external_address,
            urlencoding::encode(file_id),
            urlencoding::encode(&self.context.team),
            urlencoding::encode(md5),
        )
    }
}

/// Attachments for a URL/IP/hash reply.
pub fn message_attachments(reply: &WorkReply, links: &Links<'_>, verbose: bool) -> Vec<Attachment> {
    let mut out = Vec::new();
    for url in &reply.urls {
        let text = format!(
            "URL reputation for {}: {}. {}",
            url.details,
            verdict_word(url.result),
            links.message(&format!("<{}>", url.details))
        );
        push_indicator(&mut out, text, url.result.color(), verbose);
        if verbose {
            out.extend(url_oracles(url));
        }
    }
    for ip in &reply.ips {
        let text = if ip.private {
            format!(
                "IP reputation for {0}: {0} is a private (internal) IP address. {1}",
                ip.details,
                links.message(&ip.details)
            )
        } else {
            format!(
                "IP reputation for {}: {}. {}",
                ip.details,
                verdict_word(ip.result),
                links.message(&ip.details)
            )
        };
        push_indicator(&mut out, text, ip.result.color(), verbose);
        if verbose {
            out.extend(ip_oracles(ip));
        }
    }
    for hash in &reply.hashes {
        let text = format!(
            "Hash reputation for {}: {}. {}",
            hash.details,
            verdict_word(hash.result),
            links.message(&hash.details)
        );
        push_indicator(&mut out, text, hash.result.color(), verbose);
        if verbose {
            out.extend(hash_oracles(hash));
        }
    }
    out
}

fn push_indicator(out: &mut Vec<Attachment>, text: String, color: &str, verbose: bool) {
    if verbose || color != "good" {
        out.push(Attachment::text(text, color));
    }
}

/// Whether a message reply is worth posting at all.
pub fn should_post(attachments: &[Attachment], verbose: bool) -> bool {
    if attachments.is_empty() {
        return false;
    }
    verbose || attachments.iter().any(|a| a.color != "good")
}

fn url_oracles(url: &UrlReply) -> Vec<Attachment> {
    let mut out = Vec::new();
    if let Some(details) = url.xfe.url_details.as_ref().filter(|_| url.xfe.error.is_empty()) {
        let resolve = url.xfe.resolve.clone().unwrap_or_default();
        let cats = details
            .cats
            .iter()
            .filter(|(_, on)| **on)
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let a_records = resolve.a.join(",");
        let mut fields = vec![
            field("Score", details.score.to_string()),
            field("A Records", a_records.clone()),
            field("Categories", cats.clone()),
        ];
        if !resolve.aaaa.is_empty() {
            fields.push(field("AAAA Records", resolve.aaaa.join(",")));
        }
        out.push(Attachment {
            fallback: format!(
                "Score: {}, A Records: {a_records}, Categories: {cats}",
                details.score
            ),
            color: good_or_danger(details.score >= XFE_SCORE_TO_CONVICT).into(),
            title: XFE_TITLE.into(),
            title_link: format!("{XFE_EXCHANGE}/url/{}", url.details),
            fields,
            ..Attachment::default()
        });
    }
    if let Some(report) = url.vt.url_report.as_ref().filter(|r| r.response_code == 1) {
        out.push(Attachment {
            fallback: format!(
                "Scan Date: {}, Positives: {}, Total: {}",
                report.scan_date, report.positives, report.total
            ),
            color: good_or_danger(report.positives >= VT_POSITIVES_TO_CONVICT).into(),
            title: VT_TITLE.into(),
            title_link: report.permalink.clone(),
            fields: vec![
                field("Scan Date", report.scan_date.clone()),
                field("Positives", report.positives.to_string()),
                field("Total", report.total.to_string()),
            ],
            ..Attachment::default()
        });
    }
    out
}

fn ip_oracles(ip: &IpReply) -> Vec<Attachment> {
    let mut out = Vec::new();
    if let Some(rep) = ip.xfe.ip_reputation.as_ref().filter(|_| ip.xfe.error.is_empty()) {
        let cats = rep
            .cats
            .iter()
            .map(|(k, v)| format!("{k} ({v})"))
            .collect::<Vec<_>>()
            .join(",");
        let geo = rep.country().unwrap_or("Unknown").to_string();
        out.push(Attachment {
            fallback: format!("Score: {}, Categories: {cats}, Geo: {geo}", rep.score),
            color: good_or_danger(rep.score >= XFE_SCORE_TO_CONVICT).into(),
            title: XFE_TITLE.into(),
            title_link: format!("{XFE_EXCHANGE}/ip/{}", ip.details),
            fields: vec![
                field("Score", rep.score.to_string()),
                field("Categories", cats),
                field("Geo", geo),
            ],
            ..Attachment::default()
        });
    }
    if let Some(report) = ip.vt.ip_report.as_ref().filter(|r| r.response_code == 1) {
        let mut detected = report.detected_urls.clone();
        detected.sort_by(|a, b| b.scan_date.cmp(&a.scan_date));
        let listing: String = detected
            .iter()
            .take(MAX_LISTED_URLS)
            .map(|d| {
                format!(
                    "URL: {}, Positives: {}, Total: {}, Date: {}\n",
                    defang(&d.url),
                    d.positives,
                    d.total,
                    d.scan_date
                )
            })
            .collect();
        let positives = recent_ip_positives(report, Utc::now());
        out.push(Attachment {
            fallback: listing.clone(),
            text: listing,
            color: good_or_danger(positives >= VT_IP_POSITIVES_TO_CONVICT).into(),
            title: VT_TITLE.into(),
            title_link: format!("https://www.virustotal.com/en/search?query={}", ip.details),
            ..Attachment::default()
        });
    }
    out
}

fn hash_oracles(hash: &HashReply) -> Vec<Attachment> {
    let mut out = Vec::new();
    if let Some(malware) = hash.xfe.malware.as_ref().filter(|_| hash.xfe.error.is_empty()) {
        let family = malware.family.join(",");
        out.push(Attachment {
            fallback: format!("Mime Type: {}, Family: {family}", malware.mime_type),
            color: good_or_danger(malware.has_family()).into(),
            title: XFE_TITLE.into(),
            title_link: format!("{XFE_EXCHANGE}/malware/{}", hash.details),
            fields: vec![
                field("Family", family),
                field("MIME Type", malware.mime_type.clone()),
                field("Created", malware.created.clone()),
            ],
            ..Attachment::default()
        });
    }
    if let Some(report) = hash.vt.file_report.as_ref().filter(|r| r.response_code == 1) {
        out.push(Attachment {
            fallback: format!(
                "Scan Date: {}, Positives: {}, Total: {}",
                report.scan_date, report.positives, report.total
            ),
            color: good_or_danger(report.positives >= VT_POSITIVES_TO_CONVICT).into(),
            title: VT_TITLE.into(),
            title_link: report.permalink.clone(),
            fields: vec![
                field("Scan Date", report.scan_date.clone()),
                field("Positives", report.positives.to_string()),
                field("Total", report.total.to_string()),
            ],
            ..Attachment::default()
        });
    }
    out
}

/// What to do for a file reply.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNotice {
    pub attachments: Vec<Attachment>,
    /// Whether the attachments go to the channel.
    pub post: bool,
    pub comment: String,
    pub reaction: Option<&'static str>,
}

/// Attachments, comment and reaction for a file reply.
pub fn file_notice(
    file: &FileReply,
    md5: Option<&HashReply>,
    links: &Links<'_>,
    verbose: bool,
) -> FileNotice {
    let name = &file.details.name;
    let link = links.file(&file.details.id, md5.map(|h| h.details.as_str()).unwrap_or(""));
    let (comment, color, reaction) = if file.file_too_large {
        (
            format!("File ({name}) is too large to scan. {link}"),
            "warning",
            Some("warning"),
        )
    } else {
        let comment = match file.result {
            Verdict::Clean => format!("File ({name}) is clean. {link}"),
            Verdict::Dirty => format!("Warning: File ({name}) is malicious. {link}"),
            Verdict::Unknown => format!("Unable to find details regarding this file ({name}). {link}"),
        };
        (comment, file.result.color(), None)
    };
    let mut attachments = vec![Attachment::text(comment.clone(), color)];
    if verbose && !file.file_too_large {
        if let Some(md5) = md5 {
            attachments.extend(hash_oracles(md5));
        }
        if !file.virus.is_empty() {
            let text = format!("Virus name: {}", file.virus);
            attachments.push(Attachment {
                author_name: CLAMAV_TITLE.into(),
                title: CLAMAV_TITLE.into(),
                ..Attachment::text(text, "danger")
            });
        }
    }
    FileNotice {
        post: file.file_too_large || verbose || file.result != Verdict::Clean,
        attachments,
        comment,
        reaction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbot_core::domain::{FileRef, IpReply, VtUrlResult, XfeUrlResult};
    use dbot_core::oracle::{VtUrlReport, XfeUrlDetails};
    use dbot_core::ReplyType;

    fn ctx() -> Context {
        Context {
            team: "T1".into(),
            user: "U1".into(),
            original_user: "U1".into(),
            channel: "C123".into(),
            event_type: "message".into(),
        }
    }

    fn clean_url() -> UrlReply {
        UrlReply {
            details: "http://example.com".into(),
            result: Verdict::Clean,
            xfe: XfeUrlResult {
                url_details: Some(XfeUrlDetails {
                    url: "example.com".into(),
                    score: 0.0,
                    ..XfeUrlDetails::default()
                }),
                ..XfeUrlResult::default()
            },
            vt: VtUrlResult {
                url_report: Some(VtUrlReport {
                    response_code: 1,
                    positives: 0,
                    total: 60,
                    ..VtUrlReport::default()
                }),
                ..VtUrlResult::default()
            },
        }
    }

    #[test]
    fn verbose_url_reply_lists_every_oracle() {
        let context = ctx();
        let links = Links {
            external_address: "https://dbot.example",
            context: &context,
            message_id: "1.2",
        };
        let mut reply = WorkReply::default();
        reply.kind.insert(ReplyType::URL);
        reply.urls.push(clean_url());
        let out = message_attachments(&reply, &links, true);
        assert_eq!(out.len(), 3);
        assert!(out[0].text.starts_with("URL reputation for http://example.com: clean."));
        assert!(out[0].text.contains("https://dbot.example/details?c=C123&m=1.2&t=T1&text=%3Chttp"));
        assert_eq!(out[0].color, "good");
        assert_eq!(out[1].title, XFE_TITLE);
        assert_eq!(out[2].title, VT_TITLE);
        assert!(should_post(&out, true));
    }

    #[test]
    fn quiet_channel_skips_clean_indicators() {
        let context = ctx();
        let links = Links {
            external_address: "x",
            context: &context,
            message_id: "1.2",
        };
        let mut reply = WorkReply::default();
        reply.urls.push(clean_url());
        let out = message_attachments(&reply, &links, false);
        assert!(out.is_empty());
        assert!(!should_post(&out, false));

        reply.ips.push(IpReply {
            details: "10.0.0.1".into(),
            private: true,
            ..IpReply::default()
        });
        let out = message_attachments(&reply, &links, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, "warning");
        assert!(out[0].text.contains("is a private (internal) IP address"));
    }

    #[test]
    fn too_large_file_warns_and_reacts() {
        let context = ctx();
        let links = Links {
            external_address: "x",
            context: &context,
            message_id: "F1",
        };
        let file = FileReply {
            details: FileRef {
                id: "F1".into(),
                name: "big.iso".into(),
                ..FileRef::default()
            },
            file_too_large: true,
            ..FileReply::default()
        };
        let notice = file_notice(&file, None, &links, false);
        assert!(notice.post);
        assert_eq!(notice.reaction, Some("warning"));
        assert!(notice.comment.starts_with("File (big.iso) is too large to scan."));
        assert_eq!(notice.attachments.len(), 1);
        assert_eq!(notice.attachments[0].color, "warning");
    }

    #[test]
    fn clean_file_stays_quiet_outside_verbose_channels() {
        let context = ctx();
        let links = Links {
            external_address: "x",
            context: &context,
            message_id: "F1",
        };
        let file = FileReply {
            result: Verdict::Clean,
            ..FileReply::default()
        };
        assert!(!file_notice(&file, None, &links, false).post);
        assert!(file_notice(&file, None, &links, true).post);
    }

    #[test]
    fn defang_breaks_links() {
        assert_eq!(defang("http://evil.example.com/a"), "http[://]evil[.]example[.]com/a");
    }
}
