// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for DBot.
//!
//! Key names are PascalCase (`HTTPAddress`, `Security.DBKey`) so existing
//! JSON configuration files load unchanged. All structs use
//! `#[serde(deny_unknown_fields)]` to reject unrecognized keys at startup.

use dbot_core::Role;
use serde::{Deserialize, Serialize};

/// Placeholder secret shipped in the compiled defaults. Refused in `PROD`.
pub const PLACEHOLDER_SECRET: &str = "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

/// Top-level DBot configuration.
///
/// Immutable after load; share it as `Arc<DbotConfig>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DbotConfig {
    /// Deployment environment: `DEV`, `TEST` or `PROD`.
    #[serde(rename = "Env", default = "default_env")]
    pub env: String,

    /// Address the web tier listens on.
    #[serde(rename = "Address", default = "default_address")]
    pub address: String,

    /// Plain HTTP address used for redirects when `Address` serves TLS.
    #[serde(rename = "HTTPAddress", default = "default_http_address")]
    pub http_address: String,

    /// Public base URL of the web tier, used in links posted to chat.
    #[serde(rename = "ExternalAddress", default = "default_external_address")]
    pub external_address: String,

    #[serde(rename = "Security", default)]
    pub security: SecurityConfig,

    #[serde(rename = "SSL", default)]
    pub ssl: SslConfig,

    #[serde(rename = "Slack", default)]
    pub slack: SlackConfig,

    /// Default VirusTotal API key.
    #[serde(rename = "VT", default)]
    pub vt: String,

    /// Default IBM X-Force Exchange credentials.
    #[serde(rename = "XFE", default)]
    pub xfe: XfeConfig,

    #[serde(rename = "DB", default)]
    pub db: DbConfig,

    #[serde(rename = "AWS", default)]
    pub aws: AwsConfig,

    /// Google Cloud Pub/Sub settings.
    #[serde(rename = "G", default)]
    pub g: GoogleConfig,

    #[serde(rename = "Web", default = "default_true")]
    pub web: bool,

    #[serde(rename = "Bot", default = "default_true")]
    pub bot: bool,

    #[serde(rename = "Dedup", default = "default_true")]
    pub dedup: bool,

    #[serde(rename = "Worker", default = "default_true")]
    pub worker: bool,

    /// Path of the clamd control socket.
    #[serde(rename = "ClamCtl", default = "default_clam_ctl")]
    pub clam_ctl: String,

    /// Poll interval of the database-backed queue, in seconds.
    #[serde(rename = "QueuePoll", default = "default_queue_poll")]
    pub queue_poll: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(rename = "LogLevel", default = "default_log_level")]
    pub log_level: String,

    /// Number of worker tasks; 0 means one per logical CPU.
    #[serde(rename = "Workers", default)]
    pub workers: usize,

    /// Largest file the worker downloads and scans, in bytes.
    #[serde(rename = "FileSizeLimit", default = "default_file_size_limit")]
    pub file_size_limit: u64,

    #[serde(rename = "QueueBackend", default)]
    pub queue_backend: QueueBackend,
}

impl Default for DbotConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            address: default_address(),
            http_address: default_http_address(),
            external_address: default_external_address(),
            security: SecurityConfig::default(),
            ssl: SslConfig::default(),
            slack: SlackConfig::default(),
            vt: String::new(),
            xfe: XfeConfig::default(),
            db: DbConfig::default(),
            aws: AwsConfig::default(),
            g: GoogleConfig::default(),
            web: true,
            bot: true,
            dedup: true,
            worker: true,
            clam_ctl: default_clam_ctl(),
            queue_poll: default_queue_poll(),
            log_level: default_log_level(),
            workers: 0,
            file_size_limit: default_file_size_limit(),
            queue_backend: QueueBackend::default(),
        }
    }
}

impl DbotConfig {
    pub fn is_dev(&self) -> bool {
        self.env == "DEV"
    }

    pub fn is_prod(&self) -> bool {
        self.env == "PROD"
    }

    /// Roles enabled in this process.
    pub fn roles(&self) -> Vec<Role> {
        [
            (self.web, Role::Web),
            (self.bot, Role::Bot),
            (self.dedup, Role::Dedup),
            (self.worker, Role::Worker),
        ]
        .into_iter()
        .filter_map(|(on, role)| on.then_some(role))
        .collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles().contains(&role)
    }

    /// Worker task count with `0` resolved to the number of logical CPUs.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// The queue backing to use once `auto` is resolved.
    ///
    /// `auto` picks Pub/Sub when a Google project is set, SQS when AWS
    /// credentials are set, the in-process queue when every role runs here,
    /// and the database queue otherwise.
    pub fn resolved_queue_backend(&self) -> QueueBackend {
        match self.queue_backend {
            QueueBackend::Auto => {
                if !self.g.project.is_empty() {
                    QueueBackend::Pubsub
                } else if !self.aws.id.is_empty() {
                    QueueBackend::Sqs
                } else if self.roles().len() == 4 {
                    QueueBackend::Memory
                } else {
                    QueueBackend::Db
                }
            }
            other => other,
        }
    }
}

fn default_env() -> String {
    "DEV".to_string()
}

fn default_address() -> String {
    ":7070".to_string()
}

fn default_http_address() -> String {
    ":80".to_string()
}

fn default_external_address() -> String {
    "http://localhost:7070".to_string()
}

fn default_true() -> bool {
    true
}

fn default_clam_ctl() -> String {
    "/var/run/clamav/clamd.ctl".to_string()
}

fn default_queue_poll() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_size_limit() -> u64 {
    30 * 1024 * 1024
}

/// Which queue backing connects the roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Auto,
    Memory,
    Db,
    Sqs,
    Pubsub,
}

/// Session and at-rest encryption settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// AES key for session and XSRF cookies (16, 24 or 32 bytes).
    #[serde(rename = "SessionKey", default = "default_secret")]
    pub session_key: String,

    /// Rolling session timeout in minutes.
    #[serde(rename = "Timeout", default = "default_session_timeout")]
    pub timeout: u64,

    #[serde(rename = "Recaptcha", default)]
    pub recaptcha: String,

    /// AES key for credentials stored in the database (16, 24 or 32 bytes).
    #[serde(rename = "DBKey", default = "default_secret")]
    pub db_key: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_key: default_secret(),
            timeout: default_session_timeout(),
            recaptcha: String::new(),
            db_key: default_secret(),
        }
    }
}

fn default_secret() -> String {
    PLACEHOLDER_SECRET.to_string()
}

fn default_session_timeout() -> u64 {
    525_600
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SslConfig {
    #[serde(rename = "Cert", default)]
    pub cert: String,
    #[serde(rename = "Key", default)]
    pub key: String,
}

/// Slack application credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    #[serde(rename = "ClientID", default)]
    pub client_id: String,
    #[serde(rename = "ClientSecret", default)]
    pub client_secret: String,
    /// Key of the `X-Slack-Signature` HMAC on Events API callbacks.
    #[serde(rename = "SigningSecret", default)]
    pub signing_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct XfeConfig {
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Password", default)]
    pub password: String,
}

/// Database connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    /// Path of the SQLite database file.
    #[serde(rename = "ConnectString", default = "default_connect_string")]
    pub connect_string: String,
    #[serde(rename = "Username", default)]
    pub username: String,
    #[serde(rename = "Password", default)]
    pub password: String,
    #[serde(rename = "ServerCA", default)]
    pub server_ca: String,
    #[serde(rename = "ClientCert", default)]
    pub client_cert: String,
    #[serde(rename = "ClientKey", default)]
    pub client_key: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            connect_string: default_connect_string(),
            username: String::new(),
            password: String::new(),
            server_ca: String::new(),
            client_cert: String::new(),
            client_key: String::new(),
        }
    }
}

fn default_connect_string() -> String {
    "dbot.db".to_string()
}

/// Amazon SQS settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Secret", default)]
    pub secret: String,
    #[serde(rename = "ConfQueueName", default)]
    pub conf_queue_name: String,
    #[serde(rename = "MessageQueueName", default)]
    pub message_queue_name: String,
    #[serde(rename = "WorkQueueName", default)]
    pub work_queue_name: String,
}

/// Google Cloud Pub/Sub settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    #[serde(rename = "Project", default)]
    pub project: String,
    #[serde(rename = "ConfName", default)]
    pub conf_name: String,
    #[serde(rename = "MessageName", default)]
    pub message_name: String,
    #[serde(rename = "WorkName", default)]
    pub work_name: String,
    #[serde(rename = "Credentials", default)]
    pub credentials: GoogleCredentials,
}

/// Service-account key, in the field names of the downloaded JSON key file.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleCredentials {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub auth_provider_x509_cert_url: String,
    #[serde(default)]
    pub client_x509_cert_url: String,
    #[serde(default)]
    pub universe_domain: String,
}

impl Default for GoogleCredentials {
    fn default() -> Self {
        Self {
            kind: String::new(),
            project_id: String::new(),
            private_key_id: String::new(),
            private_key: String::new(),
            client_email: String::new(),
            client_id: String::new(),
            auth_uri: String::new(),
            token_uri: default_token_uri(),
            auth_provider_x509_cert_url: String::new(),
            client_x509_cert_url: String::new(),
            universe_domain: String::new(),
        }
    }
}

impl std::fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("type", &self.kind)
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
