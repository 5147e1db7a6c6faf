// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route behaviour through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use chrono::Utc;
use dbot_bot::{InboundEvent, event_channel};
use dbot_config::DbotConfig;
use dbot_core::chat::{
    AuthTest, Conversation, FileInfo, HistoryMessage, OAuthAccess, OAuthBot, PostMessage,
    TeamInfo, UserInfo,
};
use dbot_core::domain::{OAuthState, Team, User, WorkReply};
use dbot_core::event::Event;
use dbot_core::{ChatClient, ChatConnector, DbotError, Queue, ReplyType, Repo};
use dbot_gateway::session::{CookieSealer, Session};
use dbot_gateway::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use dbot_gateway::{GatewayState, router};
use dbot_queue::MemoryQueue;
use dbot_storage::SqliteRepo;
use dbot_vault::Vault;
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc;
use tower::ServiceExt;

const DB_KEY: &str = "0123456789abcdef0123456789abcdef";
const SESSION_KEY: &str = "fedcba9876543210";
const SIGNING_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

struct FakeClient;

#[async_trait]
impl ChatClient for FakeClient {
    async fn post_message(&self, _message: &PostMessage) -> Result<String, DbotError> {
        Ok("1.0".into())
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo, DbotError> {
        Ok(FileInfo {
            id: file_id.into(),
            name: "report.pdf".into(),
            size: 10,
            url_private: "https://files.example/report.pdf".into(),
            ..FileInfo::default()
        })
    }

    async fn file_add_comment(&self, _file_id: &str, _comment: &str) -> Result<(), DbotError> {
        Ok(())
    }

    async fn reactions_add(&self, _name: &str, _file_id: &str) -> Result<(), DbotError> {
        Ok(())
    }

    async fn history(&self, _channel: &str, ts: &str) -> Result<Vec<HistoryMessage>, DbotError> {
        Ok(vec![HistoryMessage {
            ts: ts.into(),
            text: "ping 8.8.8.8".into(),
            ..HistoryMessage::default()
        }])
    }

    async fn auth_test(&self) -> Result<AuthTest, DbotError> {
        Ok(AuthTest {
            user_id: "U1".into(),
            team_id: "T123".into(),
            ..AuthTest::default()
        })
    }

    async fn team_info(&self) -> Result<TeamInfo, DbotError> {
        Ok(TeamInfo {
            id: "T123".into(),
            name: "Acme".into(),
            ..TeamInfo::default()
        })
    }

    async fn user_info(&self, user: &str) -> Result<UserInfo, DbotError> {
        Ok(UserInfo {
            id: user.into(),
            name: "alice".into(),
            ..UserInfo::default()
        })
    }

    async fn list_conversations(&self, _types: &str) -> Result<Vec<Conversation>, DbotError> {
        Ok(vec![
            Conversation {
                id: "C1".into(),
                name: "general".into(),
                is_channel: true,
                is_member: true,
                ..Conversation::default()
            },
            Conversation {
                id: "C2".into(),
                name: "sec-alerts".into(),
                is_channel: true,
                is_member: false,
                ..Conversation::default()
            },
            Conversation {
                id: "G1".into(),
                name: "sec-team".into(),
                is_group: true,
                is_private: true,
                ..Conversation::default()
            },
        ])
    }

    async fn conversations_invite(&self, _channel: &str, _users: &str) -> Result<(), DbotError> {
        Ok(())
    }
}

struct FakeConnector;

#[async_trait]
impl ChatConnector for FakeConnector {
    fn client(&self, _token: &str) -> Arc<dyn ChatClient> {
        Arc::new(FakeClient)
    }

    async fn oauth_access(
        &self,
        _client_id: &str,
        _client_secret: &str,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<OAuthAccess, DbotError> {
        if code != "good-code" {
            return Err(DbotError::Chat {
                message: "invalid_code".into(),
                source: None,
            });
        }
        Ok(OAuthAccess {
            access_token: "xoxp-alice".into(),
            team_id: "T123".into(),
            bot: Some(OAuthBot {
                bot_user_id: "UBOT".into(),
                bot_access_token: "xoxb-bot".into(),
            }),
            ..OAuthAccess::default()
        })
    }
}

struct Fixture {
    app: Router,
    repo: Arc<dyn Repo>,
    queue: Arc<MemoryQueue>,
    events: mpsc::Receiver<InboundEvent>,
    sealer: CookieSealer,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    fixture_with_secret(SIGNING_SECRET).await
}

async fn fixture_with_secret(signing_secret: &str) -> Fixture {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dbot.db");
    let repo: Arc<dyn Repo> = Arc::new(
        SqliteRepo::open(path.to_str().unwrap(), Vault::new(DB_KEY).unwrap())
            .await
            .unwrap(),
    );
    let mut config = DbotConfig::default();
    config.security.session_key = SESSION_KEY.into();
    config.slack.client_id = "client-1".into();
    config.slack.signing_secret = signing_secret.into();
    let queue = Arc::new(MemoryQueue::new());
    let (tx, rx) = event_channel();
    let state = GatewayState::new(
        Arc::new(config),
        repo.clone(),
        queue.clone(),
        Arc::new(FakeConnector),
        Some(tx),
        "web-test",
    )
    .unwrap();
    Fixture {
        app: router(state),
        repo,
        queue,
        events: rx,
        sealer: CookieSealer::new(SESSION_KEY, false).unwrap(),
        _dir: dir,
    }
}

async fn seed_user(repo: &dyn Repo) -> User {
    let team = Team {
        id: "t-1".into(),
        name: "Acme".into(),
        external_id: "T123".into(),
        bot_user_id: "UBOT".into(),
        bot_token: "xoxb-bot".into(),
        ..Team::default()
    };
    let user = User {
        id: "u-1".into(),
        team: "t-1".into(),
        name: "alice".into(),
        external_id: "U1".into(),
        token: "xoxp-alice".into(),
        ..User::default()
    };
    repo.set_team_and_user(&team, &user).await.unwrap();
    user
}

impl Fixture {
    /// Cookie header carrying a valid session and XSRF token, plus the token.
    fn credentials(&self, user: &User) -> (String, String) {
        let session = self
            .sealer
            .seal_session(&Session::new(&user.name, &user.id))
            .unwrap();
        let xsrf = self.sealer.xsrf().unwrap();
        (
            format!("SES={}; XSRF={}", session.value(), xsrf.value()),
            xsrf.value().to_string(),
        )
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

async fn json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// An Events API POST signed `at` the given unix time.
fn signed_event(body: &str, at: i64) -> Request<Body> {
    let timestamp = at.to_string();
    Request::post("/events")
        .header(header::CONTENT_TYPE, "application/json")
        .header(TIMESTAMP_HEADER, &timestamp)
        .header(
            SIGNATURE_HEADER,
            signature::sign(SIGNING_SECRET, &timestamp, body.as_bytes()),
        )
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn messages_count_and_xsrf_issue() {
    let f = fixture().await;
    let response = f
        .send(Request::get("/messages").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().any(|c| c.starts_with("XSRF=")));
    assert_eq!(json(response).await, serde_json::json!({"count": 0}));
}

#[tokio::test]
async fn json_endpoints_honour_accept() {
    let f = fixture().await;
    let response = f
        .send(
            Request::get("/messages")
                .header(header::ACCEPT, "text/html")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(json(response).await["errors"][0]["id"], "not_acceptable");
}

#[tokio::test]
async fn user_requires_session() {
    let f = fixture().await;
    let response = f.send(Request::get("/user").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["errors"][0]["title"], "Unauthorized");
}

#[tokio::test]
async fn user_returns_profile_and_rolls_session() {
    let f = fixture().await;
    let user = seed_user(f.repo.as_ref()).await;
    let (cookies, _) = f.credentials(&user);
    let response = f
        .send(
            Request::get("/user")
                .header(header::COOKIE, cookies)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().any(|c| c.starts_with("SES=")));
    let body = json(response).await;
    assert_eq!(body["name"], "alice");
    assert_eq!(body["team_name"], "Acme");
}

#[tokio::test]
async fn save_without_xsrf_is_forbidden() {
    let f = fixture().await;
    let user = seed_user(f.repo.as_ref()).await;
    let (cookies, _) = f.credentials(&user);
    let response = f
        .send(
            Request::post("/save")
                .header(header::COOKIE, cookies)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"channels":["C1"]}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(response).await["errors"][0]["detail"], "Issue with CSRF code");
}

#[tokio::test]
async fn save_persists_and_broadcasts() {
    let f = fixture().await;
    let user = seed_user(f.repo.as_ref()).await;
    let (cookies, token) = f.credentials(&user);
    let response = f
        .send(
            Request::post("/save")
                .header(header::COOKIE, cookies)
                .header("X-XSRF-TOKEN", token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"channels":["C1"],"im":true}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let saved = f.repo.channels_and_groups("t-1").await.unwrap();
    assert_eq!(saved.channels, vec!["C1".to_string()]);
    assert!(saved.im);
    let pushed = f.queue.pop_conf(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(pushed.team, "t-1");
}

#[tokio::test]
async fn save_rejects_bad_regexp_and_wrong_media_type() {
    let f = fixture().await;
    let user = seed_user(f.repo.as_ref()).await;
    let (cookies, token) = f.credentials(&user);

    let response = f
        .send(
            Request::post("/save")
                .header(header::COOKIE, cookies.clone())
                .header("X-XSRF-TOKEN", token.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"regexp":"sec-("}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert!(body["errors"][0]["detail"]
        .as_str()
        .unwrap()
        .starts_with("Error parsing regexp"));

    let response = f
        .send(
            Request::post("/save")
                .header(header::COOKIE, cookies)
                .header("X-XSRF-TOKEN", token)
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("channels=C1"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn info_and_match_list_conversations() {
    let f = fixture().await;
    let user = seed_user(f.repo.as_ref()).await;
    let (cookies, token) = f.credentials(&user);

    let response = f
        .send(
            Request::get("/info")
                .header(header::COOKIE, cookies.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let info = json(response).await;
    assert_eq!(info["channels"].as_array().unwrap().len(), 1);
    assert_eq!(info["channels"][0]["id"], "C1");
    assert_eq!(info["groups"][0]["name"], "sec-team");

    let response = f
        .send(
            Request::post("/match")
                .header(header::COOKIE, cookies)
                .header("X-XSRF-TOKEN", token)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"regexp":"^sec-"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(json(response).await, serde_json::json!(["sec-team"]));
}

#[tokio::test]
async fn events_answer_challenge_and_forward() {
    let mut f = fixture().await;
    let now = Utc::now().timestamp();
    let response = f
        .send(signed_event(r#"{"type":"url_verification","challenge":"abc123"}"#, now))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"abc123");

    let callback = serde_json::json!({
        "type": "event_callback",
        "team_id": "T123",
        "event_id": "Ev1",
        "event": {"type": "message", "channel": "C1", "user": "U1", "text": "hi", "ts": "1.1"}
    });
    let response = f.send(signed_event(&callback.to_string(), now)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let inbound = f.events.recv().await.unwrap();
    assert_eq!(inbound.team_id, "T123");
    assert!(matches!(inbound.event, Event::Message(ref m) if m.text == "hi"));
}

fn forged_dm() -> String {
    serde_json::json!({
        "type": "event_callback",
        "team_id": "T123",
        "event_id": "Ev9",
        "event": {"type": "message", "channel": "D1", "user": "U1",
                  "text": "vt attacker-controlled-key", "ts": "9.9"}
    })
    .to_string()
}

async fn assert_refused(f: &mut Fixture, request: Request<Body>) {
    let response = f.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(json(response).await["errors"].is_array());
    assert!(f.events.try_recv().is_err(), "nothing reaches the bot");
}

#[tokio::test]
async fn unsigned_event_is_refused() {
    let mut f = fixture().await;
    let request = Request::post("/events")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(forged_dm()))
        .unwrap();
    assert_refused(&mut f, request).await;
}

#[tokio::test]
async fn event_with_wrong_signature_is_refused() {
    let mut f = fixture().await;
    let now = Utc::now().timestamp().to_string();
    let body = forged_dm();
    let request = Request::post("/events")
        .header(header::CONTENT_TYPE, "application/json")
        .header(TIMESTAMP_HEADER, &now)
        .header(SIGNATURE_HEADER, signature::sign("guessed", &now, body.as_bytes()))
        .body(Body::from(body))
        .unwrap();
    assert_refused(&mut f, request).await;

    let signed = signed_event(&forged_dm(), Utc::now().timestamp());
    let (parts, _) = signed.into_parts();
    let tampered = Request::from_parts(parts, Body::from(forged_dm().replace("D1", "D2")));
    assert_refused(&mut f, tampered).await;
}

#[tokio::test]
async fn replayed_event_is_refused() {
    let mut f = fixture().await;
    let stale = Utc::now().timestamp() - signature::MAX_SKEW_SECS - 60;
    assert_refused(&mut f, signed_event(&forged_dm(), stale)).await;
}

#[tokio::test]
async fn events_are_refused_without_a_signing_secret() {
    let mut f = fixture_with_secret("").await;
    assert_refused(&mut f, signed_event(&forged_dm(), Utc::now().timestamp())).await;
}

#[tokio::test]
async fn oauth_redirects_with_stored_state() {
    let f = fixture().await;
    let response = f.send(Request::get("/oauth").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://slack.com/oauth/authorize?client_id=client-1"));
    let state = location
        .split('&')
        .find_map(|p| p.strip_prefix("state="))
        .unwrap();
    assert!(f.repo.oauth_state(state).await.is_ok());
}

#[tokio::test]
async fn auth_callback_registers_team_and_user() {
    let f = fixture().await;
    f.repo
        .set_oauth_state(&OAuthState {
            state: "st-1".into(),
            ts: Utc::now(),
        })
        .await
        .unwrap();
    let response = f
        .send(
            Request::get("/auth?state=st-1&code=good-code")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/conf");
    assert!(set_cookies(&response).iter().any(|c| c.starts_with("SES=")));

    let team = f.repo.team_by_external_id("T123").await.unwrap();
    assert_eq!(team.bot_token, "xoxb-bot");
    let user = f.repo.user_by_external_id("U1").await.unwrap();
    assert_eq!(user.team, team.id);
    assert_eq!(user.token, "xoxp-alice");
    assert!(f.repo.channels_and_groups(&team.id).await.unwrap().all);
    assert!(f.repo.oauth_state("st-1").await.is_err());
}

#[tokio::test]
async fn auth_callback_rejects_unknown_state_and_bad_code() {
    let f = fixture().await;
    let response = f
        .send(Request::get("/auth?state=nope&code=x").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    f.repo
        .set_oauth_state(&OAuthState {
            state: "st-2".into(),
            ts: Utc::now(),
        })
        .await
        .unwrap();
    let response = f
        .send(Request::get("/auth?state=st-2&code=bad").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["errors"][0]["id"], "oauth_err");
}

#[tokio::test]
async fn logout_clears_session() {
    let f = fixture().await;
    let response = f.send(Request::get("/logout").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(set_cookies(&response).iter().any(|c| c.starts_with("SES=;")));
}

#[tokio::test]
async fn work_validates_parameters() {
    let f = fixture().await;
    let response = f
        .send(Request::get("/work?t=T123&c=C1").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn work_waits_for_the_reply() {
    let f = fixture().await;
    seed_user(f.repo.as_ref()).await;

    let queue = f.queue.clone();
    let worker = tokio::spawn(async move {
        let request = queue.pop_work(Some(Duration::from_secs(5))).await.unwrap();
        assert!(request.online);
        assert_eq!(request.text, "ping 8.8.8.8");
        let mut reply = WorkReply::for_request(&request);
        reply.kind.insert(ReplyType::IP);
        queue
            .push_work_reply(&request.reply_queue, &reply)
            .await
            .unwrap();
    });

    let response = f
        .send(Request::get("/work?t=T123&c=C1&m=1.1").body(Body::empty()).unwrap())
        .await;
    worker.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = json(response).await;
    assert_eq!(reply["message_id"], "1.1");
    assert_eq!(reply["context"]["team"], "T123");
}

#[tokio::test]
async fn unknown_paths_use_the_envelope() {
    let f = fixture().await;
    let response = f
        .send(Request::get("/no/such/page").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["errors"][0]["id"], "not_found");
}
