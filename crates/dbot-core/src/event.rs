// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema-first decoding of chat platform events.
//!
//! Every event shape the bot acts on has its own record; anything else
//! decodes to [`Event::Ignored`].

use serde::Deserialize;

use crate::domain::FileRef;
use crate::error::DbotError;

/// An Events API callback body.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Callback {
    /// Endpoint ownership check; answer with the challenge.
    UrlVerification { challenge: String },
    /// A workspace event.
    EventCallback {
        team_id: String,
        #[serde(default)]
        event_id: String,
        event: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

/// A plain, edited or commented message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: String,
}

/// A file shared, mentioned or created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEvent {
    pub channel: String,
    pub user: String,
    pub ts: String,
    pub file: FileRef,
}

/// A decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message(MessageEvent),
    MessageChanged(MessageEvent),
    FileComment(MessageEvent),
    FileShare(FileEvent),
    FileMention(FileEvent),
    FileCreated(FileEvent),
    Ignored,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    Message(RawMessage),
    FileCreated(RawFileCreated),
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    subtype: String,
    channel: String,
    user: String,
    text: String,
    ts: String,
    message: Option<RawInner>,
    files: Vec<RawFile>,
    file: Option<RawFile>,
    comment: Option<RawComment>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawInner {
    ts: String,
    text: String,
    user: String,
}

#[derive(Deserialize, Default, Clone)]
#[serde(default)]
struct RawFile {
    id: String,
    name: String,
    size: u64,
    url_private: String,
    user: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawComment {
    comment: String,
    user: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawFileCreated {
    file_id: String,
    user_id: String,
    file: Option<RawFile>,
}

impl From<RawFile> for FileRef {
    fn from(f: RawFile) -> Self {
        FileRef {
            id: f.id,
            url: f.url_private,
            name: f.name,
            size: f.size,
            token: String::new(),
        }
    }
}

impl Event {
    /// Decode the `event` object of a callback.
    pub fn decode(value: serde_json::Value) -> Result<Event, DbotError> {
        let raw: RawEvent = serde_json::from_value(value).map_err(|e| DbotError::Decode {
            message: format!("malformed event: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(match raw {
            RawEvent::Message(m) => Self::from_message(m),
            RawEvent::FileCreated(f) => {
                let mut file: FileRef = f.file.unwrap_or_default().into();
                if file.id.is_empty() {
                    file.id = f.file_id;
                }
                if file.id.is_empty() {
                    Event::Ignored
                } else {
                    Event::FileCreated(FileEvent {
                        channel: String::new(),
                        user: f.user_id,
                        ts: String::new(),
                        file,
                    })
                }
            }
            RawEvent::Other => Event::Ignored,
        })
    }

    fn from_message(m: RawMessage) -> Event {
        match m.subtype.as_str() {
            "" => Event::Message(MessageEvent {
                channel: m.channel,
                user: m.user,
                text: m.text,
                ts: m.ts,
            }),
            "message_changed" => match m.message {
                Some(inner) => Event::MessageChanged(MessageEvent {
                    channel: m.channel,
                    user: inner.user,
                    text: inner.text,
                    ts: inner.ts,
                }),
                None => Event::Ignored,
            },
            "file_comment" => match m.comment {
                Some(c) => Event::FileComment(MessageEvent {
                    channel: m.channel,
                    user: c.user,
                    text: c.comment,
                    ts: m.ts,
                }),
                None => Event::Ignored,
            },
            sub @ ("file_share" | "file_mention") => {
                let Some(file) = m.files.into_iter().next().or(m.file) else {
                    return Event::Ignored;
                };
                let user = if m.user.is_empty() {
                    file.user.clone()
                } else {
                    m.user
                };
                let event = FileEvent {
                    channel: m.channel,
                    user,
                    ts: m.ts,
                    file: file.into(),
                };
                if sub == "file_share" {
                    Event::FileShare(event)
                } else {
                    Event::FileMention(event)
                }
            }
            _ => Event::Ignored,
        }
    }

    /// The wire name of this event kind, carried in the work context.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Message(_) => "message",
            Event::MessageChanged(_) => "message_changed",
            Event::FileComment(_) => "file_comment",
            Event::FileShare(_) => "file_share",
            Event::FileMention(_) => "file_mention",
            Event::FileCreated(_) => "file_created",
            Event::Ignored => "ignored",
        }
    }

    /// The user who produced the event, if any.
    pub fn user(&self) -> Option<&str> {
        match self {
            Event::Message(m) | Event::MessageChanged(m) | Event::FileComment(m) => Some(&m.user),
            Event::FileShare(f) | Event::FileMention(f) | Event::FileCreated(f) => Some(&f.user),
            Event::Ignored => None,
        }
    }

    /// The channel the event happened in; empty for `file_created`.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Event::Message(m) | Event::MessageChanged(m) | Event::FileComment(m) => {
                Some(&m.channel)
            }
            Event::FileShare(f) | Event::FileMention(f) | Event::FileCreated(f) => Some(&f.channel),
            Event::Ignored => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_message() {
        let e = Event::decode(json!({
            "type": "message", "channel": "C1", "user": "U1", "text": "hi", "ts": "1.1"
        }))
        .unwrap();
        assert_eq!(
            e,
            Event::Message(MessageEvent {
                channel: "C1".into(),
                user: "U1".into(),
                text: "hi".into(),
                ts: "1.1".into()
            })
        );
        assert_eq!(e.event_type(), "message");
    }

    #[test]
    fn edited_message_reads_nested_fields() {
        let e = Event::decode(json!({
            "type": "message", "subtype": "message_changed", "channel": "C1",
            "message": {"user": "U2", "text": "new", "ts": "2.2"}
        }))
        .unwrap();
        match e {
            Event::MessageChanged(m) => {
                assert_eq!(m.text, "new");
                assert_eq!(m.user, "U2");
                assert_eq!(m.ts, "2.2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_share_takes_first_file() {
        let e = Event::decode(json!({
            "type": "message", "subtype": "file_share", "channel": "C1", "user": "U1", "ts": "3.3",
            "files": [{"id": "F1", "name": "a.exe", "size": 10, "url_private": "https://files/a"}]
        }))
        .unwrap();
        match e {
            Event::FileShare(f) => {
                assert_eq!(f.file.id, "F1");
                assert_eq!(f.file.url, "https://files/a");
                assert_eq!(f.file.size, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_created_uses_file_id_fallback() {
        let e = Event::decode(json!({"type": "file_created", "file_id": "F9", "user_id": "U1"}))
            .unwrap();
        match e {
            Event::FileCreated(f) => assert_eq!(f.file.id, "F9"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bot_messages_and_unknown_types_are_ignored() {
        let bot = Event::decode(json!({"type": "message", "subtype": "bot_message", "text": "x"}))
            .unwrap();
        assert_eq!(bot, Event::Ignored);
        let other = Event::decode(json!({"type": "reaction_added"})).unwrap();
        assert_eq!(other, Event::Ignored);
    }

    #[test]
    fn callback_variants() {
        let v: Callback =
            serde_json::from_value(json!({"type": "url_verification", "challenge": "abc"})).unwrap();
        assert!(matches!(v, Callback::UrlVerification { challenge } if challenge == "abc"));
        let v: Callback = serde_json::from_value(json!({"type": "app_rate_limited"})).unwrap();
        assert!(matches!(v, Callback::Unsupported));
    }
}
