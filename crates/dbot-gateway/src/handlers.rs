// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.

use std::time::Duration;

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use dbot_bot::InboundEvent;
use dbot_core::chat::{Conversation, OAuthAccess, PostMessage, TeamInfo, UserInfo};
use dbot_core::domain::{
    Configuration, Context, FileRef, OAuthState, RequestKind, Team, User, UserStatus, WorkReply,
    WorkRequest,
};
use dbot_core::event::{Callback, Event};
use dbot_core::{ChatClient, DbotError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::middleware::{AuthUser, JsonBody};
use crate::server::GatewayState;
use crate::session::Session;

/// How long `/work` waits for the worker's answer.
pub const WORK_TIMEOUT: Duration = Duration::from_secs(30);

const CONVERSATION_TYPES: &str = "public_channel,private_channel";

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn no_content() -> Response {
    (StatusCode::NO_CONTENT, "\n").into_response()
}

/// GET /oauth
pub async fn initiate_oauth(State(state): State<GatewayState>) -> Result<Response, ApiError> {
    let oauth = OAuthState {
        state: uuid::Uuid::new_v4().to_string(),
        ts: Utc::now(),
    };
    state.repo.set_oauth_state(&oauth).await?;
    let url = dbot_slack::authorize_url(&state.config.slack.client_id, &oauth.state, "");
    debug!(url = %url, "redirecting to OAuth");
    Ok(found(&url))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthParams {
    pub state: String,
    pub code: String,
    pub error: String,
}

/// GET /auth: the OAuth callback.
pub async fn login_oauth(
    State(state): State<GatewayState>,
    jar: CookieJar,
    Query(params): Query<AuthParams>,
) -> Result<Response, ApiError> {
    if !params.error.is_empty() {
        warn!(error = %params.error, "OAuth error from the platform");
        return Err(ApiError::oauth(params.error));
    }
    if params.state.is_empty() || params.code.is_empty() {
        return Err(ApiError::bad_content());
    }
    let saved = state
        .repo
        .oauth_state(&params.state)
        .await
        .map_err(|_| ApiError::bad_content())?;
    if let Err(e) = state.repo.del_oauth_state(&saved.state).await {
        warn!(error = %e, "unable to delete OAuth state");
    }
    if saved.is_expired(Utc::now()) {
        return Err(ApiError::bad_request());
    }

    let slack = &state.config.slack;
    let access = state
        .connector
        .oauth_access(&slack.client_id, &slack.client_secret, &params.code, "")
        .await
        .map_err(|e| {
            warn!(error = %e, "unable to exchange OAuth code");
            ApiError::oauth(e.to_string())
        })?;
    let client = state.connector.client(&access.access_token);
    let me = client.auth_test().await?;
    let team_info = client.team_info().await?;
    let user_info = client.user_info(&me.user_id).await?;

    let team = upsert_team(&state, &team_info, &access).await?;
    let (user, new_user) = upsert_user(&state, &team, &user_info, &access).await?;
    state.repo.set_team_and_user(&team, &user).await?;
    info!(user = %user.name, team = %team.name, "user logged in");

    if new_user {
        let conf = Configuration {
            team: team.id.clone(),
            all: true,
            ..Configuration::default()
        };
        if let Err(e) = state.repo.set_channels_and_groups(&conf).await {
            warn!(user = %user.id, error = %e, "unable to store initial configuration");
        } else if let Err(e) = state.queue.push_conf(&conf).await {
            warn!(team = %team.id, error = %e, "unable to broadcast initial configuration");
        }
    }
    send_thanks(state.connector.client(&team.bot_token).as_ref(), &user).await;

    let cookie = state.cookies.seal_session(&Session::new(&user.name, &user.id))?;
    Ok((jar.add(cookie), found("/conf")).into_response())
}

async fn upsert_team(
    state: &GatewayState,
    info: &TeamInfo,
    access: &OAuthAccess,
) -> Result<Team, DbotError> {
    let bot = access.bot.clone().unwrap_or_default();
    let team = match state.repo.team_by_external_id(&info.id).await {
        Ok(existing) => {
            debug!(team = %info.name, "existing team");
            existing
        }
        Err(e) if e.is_not_found() => {
            info!(team = %info.name, "new team registered");
            Team {
                id: format!("T{}", uuid::Uuid::new_v4()),
                external_id: info.id.clone(),
                created: Some(Utc::now()),
                ..Team::default()
            }
        }
        Err(e) => return Err(e),
    };
    Ok(Team {
        name: info.name.clone(),
        email_domain: info.email_domain.clone(),
        domain: info.domain.clone(),
        plan: info.plan.clone(),
        bot_user_id: bot.bot_user_id,
        bot_token: bot.bot_access_token,
        ..team
    })
}

async fn upsert_user(
    state: &GatewayState,
    team: &Team,
    info: &UserInfo,
    access: &OAuthAccess,
) -> Result<(User, bool), DbotError> {
    let (user, new_user) = match state.repo.user_by_external_id(&info.id).await {
        Ok(existing) => (existing, false),
        Err(e) if e.is_not_found() => {
            info!(user = %info.name, "new user registered");
            let user = User {
                id: format!("U{}", uuid::Uuid::new_v4()),
                team: team.id.clone(),
                kind: "slack".into(),
                is_bot: info.is_bot,
                is_admin: info.is_admin,
                is_owner: info.is_owner,
                is_primary_owner: info.is_primary_owner,
                is_restricted: info.is_restricted,
                is_ultra_restricted: info.is_ultra_restricted,
                external_id: info.id.clone(),
                created: Some(Utc::now()),
                ..User::default()
            };
            (user, true)
        }
        Err(e) => return Err(e),
    };
    let user = User {
        name: info.name.clone(),
        real_name: info.real_name.clone(),
        email: info.profile.email.clone(),
        token: access.access_token.clone(),
        status: UserStatus::Active,
        ..user
    };
    Ok((user, new_user))
}

async fn send_thanks(bot: &dyn ChatClient, user: &User) {
    let ims = match bot.list_conversations("im").await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "unable to list direct messages for welcome");
            return;
        }
    };
    let Some(im) = ims.iter().find(|c| c.user == user.external_id) else {
        warn!(user = %user.external_id, "no direct message channel for welcome");
        return;
    };
    let text = format!(
        "Hi {}, thanks for inviting me to this team.
If you want me to monitor conversations, please add me to the relevant channels and groups.
Here are the commands I understand:
config: list the current channels I'm listening on
join all/#channel1,#channel2...: I will join all/specified public channels and start monitoring them.
verbose on/off #channel1,#channel2... - turn on verbose mode on the specified channels
verbose mode is usually used by security professionals. When in verbose mode, dbot will display reputation details about any URL, IP or file including clean ones.",
        user.name
    );
    if let Err(e) = bot.post_message(&PostMessage::text(&im.id, text)).await {
        warn!(error = %e, "unable to post welcome message");
    }
}

/// GET /logout
pub async fn logout(State(state): State<GatewayState>, jar: CookieJar) -> Response {
    (jar.remove(state.cookies.cleared_session()), no_content()).into_response()
}

#[derive(Debug, Serialize)]
pub struct SimpleUser {
    pub name: String,
    pub email: String,
    pub real_name: String,
    pub team_name: String,
}

/// GET /user
pub async fn current_user(
    State(state): State<GatewayState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<SimpleUser>, ApiError> {
    let team = state.repo.team(&user.team).await?;
    Ok(Json(SimpleUser {
        name: user.name,
        email: user.email,
        real_name: user.real_name,
        team_name: team.name,
    }))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct IdName {
    pub id: String,
    pub name: String,
    pub selected: bool,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub channels: Vec<IdName>,
    pub groups: Vec<IdName>,
    pub im: bool,
    pub regexp: String,
    pub all: bool,
}

fn is_public(c: &Conversation) -> bool {
    c.is_channel && !c.is_private
}

/// GET /info: the user's channels and groups, flagged by the saved subscription.
pub async fn info(
    State(state): State<GatewayState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<InfoResponse>, ApiError> {
    let saved = state.repo.channels_and_groups(&user.team).await?;
    let conversations = state
        .connector
        .client(&user.token)
        .list_conversations(CONVERSATION_TYPES)
        .await?;
    let mut channels = Vec::new();
    let mut groups = Vec::new();
    for c in conversations {
        if is_public(&c) {
            if c.is_member {
                let selected = saved.channels.contains(&c.id);
                channels.push(IdName {
                    id: c.id,
                    name: c.name,
                    selected,
                });
            }
        } else if c.is_group || c.is_private {
            let selected = saved.groups.contains(&c.id);
            groups.push(IdName {
                id: c.id,
                name: c.name,
                selected,
            });
        }
    }
    Ok(Json(InfoResponse {
        channels,
        groups,
        im: saved.im,
        regexp: saved.regexp,
        all: saved.all,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RegexpMatch {
    #[serde(default)]
    pub regexp: String,
}

/// POST /match: channel and group names the regexp would select.
pub async fn regexp_match(
    State(state): State<GatewayState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    JsonBody(body): JsonBody<RegexpMatch>,
) -> Result<Json<Vec<String>>, ApiError> {
    if body.regexp.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let re = Regex::new(&body.regexp).map_err(ApiError::bad_regexp)?;
    let conversations = state
        .connector
        .client(&user.token)
        .list_conversations(CONVERSATION_TYPES)
        .await?;
    let names = conversations
        .into_iter()
        .filter(|c| !is_public(c) || c.is_member)
        .filter(|c| re.is_match(&c.name))
        .map(|c| c.name)
        .collect();
    Ok(Json(names))
}

/// POST /save: replace the subscription and tell every bot.
pub async fn save(
    State(state): State<GatewayState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    JsonBody(mut conf): JsonBody<Configuration>,
) -> Result<Response, ApiError> {
    if !conf.regexp.is_empty() {
        Regex::new(&conf.regexp).map_err(ApiError::bad_regexp)?;
    }
    conf.team = user.team.clone();
    // Verbose lists are edited from chat; keep them unless the body sets them.
    if conf.verbose_channels.is_empty() && conf.verbose_groups.is_empty() {
        let saved = state.repo.channels_and_groups(&conf.team).await?;
        conf.verbose_channels = saved.verbose_channels;
        conf.verbose_groups = saved.verbose_groups;
    }
    state.repo.set_channels_and_groups(&conf).await?;
    if let Err(e) = state.queue.push_conf(&conf).await {
        warn!(team = %conf.team, error = %e, "unable to broadcast configuration");
    }
    info!(team = %conf.team, user = %user.name, "configuration saved");
    Ok(no_content())
}

#[derive(Debug, Serialize)]
pub struct MessageCount {
    pub count: u64,
}

/// GET /messages
pub async fn total_messages(
    State(state): State<GatewayState>,
) -> Result<Json<MessageCount>, ApiError> {
    let count = state.repo.total_messages().await?;
    Ok(Json(MessageCount { count }))
}

/// POST /events: signed Events API callbacks, handed to the local bot.
pub async fn events(
    State(state): State<GatewayState>,
    JsonBody(callback): JsonBody<Callback>,
) -> Result<Response, ApiError> {
    match callback {
        Callback::UrlVerification { challenge } => Ok(challenge.into_response()),
        Callback::EventCallback {
            team_id,
            event_id,
            event,
        } => {
            let Some(events) = &state.events else {
                debug!(event_id = %event_id, "no bot in this process");
                return Err(ApiError::not_found());
            };
            let event = Event::decode(event).map_err(|e| {
                warn!(event_id = %event_id, error = %e, "undecodable event");
                ApiError::bad_request()
            })?;
            if event != Event::Ignored
                && let Err(e) = events.try_send(InboundEvent { team_id, event })
            {
                warn!(event_id = %event_id, error = %e, "event dropped");
            }
            Ok("\n".into_response())
        }
        Callback::Unsupported => Ok("\n".into_response()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkParams {
    /// External team id.
    pub t: String,
    /// File id.
    pub f: String,
    /// Message timestamp.
    pub m: String,
    /// Channel id.
    pub c: String,
    pub text: String,
}

/// GET /work: an on-demand, online scan whose reply is returned inline.
pub async fn work(
    State(state): State<GatewayState>,
    Query(params): Query<WorkParams>,
) -> Result<Json<WorkReply>, ApiError> {
    if params.t.is_empty() || (params.f.is_empty() && (params.c.is_empty() || params.m.is_empty()))
    {
        return Err(ApiError::bad_request());
    }
    debug!(team = %params.t, file = %params.f, channel = %params.c, message = %params.m, "on-demand work");
    let team = state.repo.team_by_external_id(&params.t).await?;
    let tokens = candidate_tokens(&state, &team).await;

    let reply_queue = format!("{}-{}", state.reply_name, uuid::Uuid::new_v4().simple());
    let mut request = WorkRequest {
        reply_queue: reply_queue.clone(),
        online: true,
        vt_key: team.vt_key.clone(),
        xfe_key: team.xfe_key.clone(),
        xfe_pass: team.xfe_pass.clone(),
        context: Context {
            team: team.external_id.clone(),
            channel: params.c.clone(),
            ..Context::default()
        },
        ..WorkRequest::default()
    };

    if params.f.is_empty() {
        let text = if params.text.is_empty() {
            history_text(&state, &tokens, &params.c, &params.m)
                .await
                .ok_or_else(ApiError::not_found)?
        } else {
            params.text.clone()
        };
        request.kind = RequestKind::Message;
        request.message_id = params.m.clone();
        request.text = text;
    } else if let Some(file) = file_ref(&state, &tokens, &params.f, &team.bot_token).await {
        request.kind = RequestKind::File;
        request.message_id = params.f.clone();
        request.file = Some(file);
    } else if !params.text.is_empty() {
        // No token can see the file any more; look the hash up instead.
        request.kind = RequestKind::Message;
        request.message_id = "file-message".into();
        request.text = params.text.clone();
    } else {
        return Err(ApiError::not_found());
    }

    state.queue.push_work(&request).await?;
    match state
        .queue
        .pop_work_reply(&reply_queue, Some(WORK_TIMEOUT))
        .await
    {
        Ok(reply) => Ok(Json(reply)),
        Err(e) if e.is_timeout() => {
            warn!(reply_queue = %reply_queue, "timed out waiting for on-demand work");
            Err(ApiError::internal())
        }
        Err(e) => Err(e.into()),
    }
}

/// Bot token first, then every active member's token.
async fn candidate_tokens(state: &GatewayState, team: &Team) -> Vec<String> {
    let mut tokens = vec![team.bot_token.clone()];
    match state.repo.team_members(&team.id).await {
        Ok(members) => tokens.extend(members.into_iter().filter(User::can_post).map(|u| u.token)),
        Err(e) => warn!(team = %team.id, error = %e, "unable to load team members"),
    }
    tokens.retain(|t| !t.is_empty());
    tokens
}

async fn history_text(
    state: &GatewayState,
    tokens: &[String],
    channel: &str,
    ts: &str,
) -> Option<String> {
    for token in tokens {
        match state.connector.client(token).history(channel, ts).await {
            Ok(messages) => {
                if let Some(m) = messages.into_iter().find(|m| m.ts == ts) {
                    return Some(m.text);
                }
            }
            Err(e) => debug!(error = %e, "history lookup failed with candidate token"),
        }
    }
    None
}

async fn file_ref(
    state: &GatewayState,
    tokens: &[String],
    file_id: &str,
    bot_token: &str,
) -> Option<FileRef> {
    for token in tokens {
        match state.connector.client(token).file_info(file_id).await {
            Ok(info) => {
                return Some(FileRef {
                    id: file_id.to_string(),
                    url: info.url_private,
                    name: info.name,
                    size: info.size,
                    token: bot_token.to_string(),
                });
            }
            Err(e) => debug!(error = %e, "file info failed with candidate token"),
        }
    }
    None
}

/// Static pages.
pub async fn index_page() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

pub async fn conf_page() -> Html<&'static str> {
    Html(include_str!("../static/conf.html"))
}

pub async fn details_page() -> Html<&'static str> {
    Html(include_str!("../static/details.html"))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
