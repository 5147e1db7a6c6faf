// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Looks for `dbot.json` and `dbot.toml` in `/etc/dbot`, the user config
//! directory and the working directory, with environment variable overrides
//! via the `DBOT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};

use crate::model::DbotConfig;

/// Every leaf key that can be overridden from the environment.
///
/// `DBOT_` + the path with dots replaced by `_`, upper-cased, selects the key:
/// `DBOT_SECURITY_DBKEY` sets `Security.DBKey`.
const ENV_KEYS: &[&str] = &[
    "Env",
    "Address",
    "HTTPAddress",
    "ExternalAddress",
    "Security.SessionKey",
    "Security.Timeout",
    "Security.Recaptcha",
    "Security.DBKey",
    "SSL.Cert",
    "SSL.Key",
    "Slack.ClientID",
    "Slack.ClientSecret",
    "Slack.SigningSecret",
    "VT",
    "XFE.Key",
    "XFE.Password",
    "DB.ConnectString",
    "DB.Username",
    "DB.Password",
    "DB.ServerCA",
    "DB.ClientCert",
    "DB.ClientKey",
    "AWS.ID",
    "AWS.Secret",
    "AWS.ConfQueueName",
    "AWS.MessageQueueName",
    "AWS.WorkQueueName",
    "G.Project",
    "G.ConfName",
    "G.MessageName",
    "G.WorkName",
    "Web",
    "Bot",
    "Dedup",
    "Worker",
    "ClamCtl",
    "QueuePoll",
    "LogLevel",
    "Workers",
    "FileSizeLimit",
    "QueueBackend",
];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/dbot/dbot.{json,toml}` (system-wide)
/// 3. `~/.config/dbot/dbot.{json,toml}` (user config)
/// 4. `./dbot.{json,toml}` (local directory)
/// 5. `DBOT_*` environment variables
pub fn load_config() -> Result<DbotConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a specific file with env var overrides.
///
/// The format follows the extension: `.toml` is TOML, anything else JSON.
pub fn load_config_from_path(path: &Path) -> Result<DbotConfig, figment::Error> {
    let figment = Figment::new().merge(Serialized::defaults(DbotConfig::default()));
    let figment = if is_toml(path) {
        figment.merge(Toml::file(path))
    } else {
        figment.merge(Json::file(path))
    };
    figment.merge(env_provider()).extract()
}

/// Load configuration from a JSON string only (no file lookup, no env).
pub fn load_config_from_str(json: &str) -> Result<DbotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DbotConfig::default()))
        .merge(Json::string(json))
        .extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_toml_str(toml_content: &str) -> Result<DbotConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DbotConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Build the Figment used for hierarchy loading, before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(DbotConfig::default()));
    for dir in search_dirs() {
        figment = figment
            .merge(Json::file(dir.join("dbot.json")))
            .merge(Toml::file(dir.join("dbot.toml")));
    }
    figment.merge(env_provider())
}

/// Directories searched for `dbot.json` / `dbot.toml`, lowest precedence first.
pub(crate) fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/etc/dbot")];
    if let Some(config_dir) = dirs::config_dir() {
        dirs.push(config_dir.join("dbot"));
    }
    dirs.push(PathBuf::new());
    dirs
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Map a prefix-stripped environment variable name to its config key path.
pub fn env_key(name: &str) -> Option<String> {
    ENV_KEYS
        .iter()
        .find(|key| key.replace('.', "_").eq_ignore_ascii_case(name))
        .map(|key| key.to_string())
}

/// Create the environment variable provider.
///
/// Uses an explicit key table rather than `Env::split("_")`: keys keep their
/// PascalCase spelling and variables naming no known key are ignored.
fn env_provider() -> Env {
    Env::prefixed("DBOT_")
        .lowercase(false)
        .filter_map(|key| env_key(key.as_str()).map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_names_map_to_pascal_case_paths() {
        assert_eq!(env_key("SECURITY_DBKEY").as_deref(), Some("Security.DBKey"));
        assert_eq!(env_key("HTTPADDRESS").as_deref(), Some("HTTPAddress"));
        assert_eq!(env_key("aws_work_queue_name"), None);
        assert_eq!(
            env_key("AWS_WORKQUEUENAME").as_deref(),
            Some("AWS.WorkQueueName")
        );
        assert_eq!(env_key("UNKNOWN"), None);
    }

    #[test]
    fn toml_is_chosen_by_extension() {
        assert!(is_toml(Path::new("/tmp/dbot.toml")));
        assert!(!is_toml(Path::new("/tmp/dbot.json")));
        assert!(!is_toml(Path::new("dbot")));
    }
}
