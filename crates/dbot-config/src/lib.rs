// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for DBot.
//!
//! JSON (or TOML) configuration with strict key checking
//! (`deny_unknown_fields`), a file hierarchy lookup, `DBOT_` environment
//! overrides and miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use dbot_config::load_and_validate;
//!
//! let config = load_and_validate(None).expect("config errors");
//! println!("listening on {}", config.address);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{DbotConfig, QueueBackend};

/// Load configuration and validate it.
///
/// With `path` set only that file (plus env overrides) is read; otherwise the
/// standard hierarchy is searched. Figment errors become diagnostics with
/// typo suggestions.
pub fn load_and_validate(path: Option<&Path>) -> Result<DbotConfig, Vec<ConfigError>> {
    load_and_validate_with(path, |_| {})
}

/// Like [`load_and_validate`], applying `adjust` (command-line overrides)
/// before validation.
pub fn load_and_validate_with(
    path: Option<&Path>,
    adjust: impl FnOnce(&mut DbotConfig),
) -> Result<DbotConfig, Vec<ConfigError>> {
    let loaded = match path {
        Some(path) => loader::load_config_from_path(path),
        None => loader::load_config(),
    };
    match loaded {
        Ok(mut config) => {
            adjust(&mut config);
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_sources(path),
        )),
    }
}

/// Load configuration from a JSON string and validate it.
pub fn load_and_validate_str(json: &str) -> Result<DbotConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(json) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), json.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Read every config file that could have contributed, for error spans.
fn collect_sources(path: Option<&Path>) -> Vec<(String, String)> {
    let candidates: Vec<std::path::PathBuf> = match path {
        Some(path) => vec![path.to_path_buf()],
        None => loader::search_dirs()
            .into_iter()
            .flat_map(|dir| [dir.join("dbot.json"), dir.join("dbot.toml")])
            .collect(),
    };

    candidates
        .into_iter()
        .filter_map(|candidate| {
            let content = std::fs::read_to_string(&candidate).ok()?;
            let display = if candidate.is_relative() {
                std::env::current_dir()
                    .map(|d| d.join(&candidate).display().to_string())
                    .unwrap_or_else(|_| candidate.display().to_string())
            } else {
                candidate.display().to_string()
            };
            Some((display, content))
        })
        .collect()
}
