// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! DBot - reputation checks for links, addresses, hashes and files shared
//! in Slack.
//!
//! This is the binary entry point.

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dbot_config::DbotConfig;

/// DBot - reputation checks for links, addresses, hashes and files shared in Slack.
#[derive(Parser, Debug)]
#[command(name = "dbot", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    roles: RoleArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Role toggles; each overrides the matching config key.
#[derive(Args, Debug, Default, Clone, Copy)]
struct RoleArgs {
    /// Run the web tier (`--web=false` to disable).
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    web: Option<bool>,
    /// Run the bot.
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    bot: Option<bool>,
    /// Run the dedup stage.
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    dedup: Option<bool>,
    /// Run the enrichment worker.
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    worker: Option<bool>,
}

impl RoleArgs {
    fn apply(self, config: &mut DbotConfig) {
        if let Some(on) = self.web {
            config.web = on;
        }
        if let Some(on) = self.bot {
            config.bot = on;
        }
        if let Some(on) = self.dedup {
            config.dedup = on;
        }
        if let Some(on) = self.worker {
            config.worker = on;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the enabled roles (default).
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let roles = cli.roles;
    let config = match dbot_config::load_and_validate_with(cli.config.as_deref(), |c| {
        roles.apply(c)
    }) {
        Ok(config) => config,
        Err(errors) => {
            dbot_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            let roles: Vec<String> = config.roles().iter().map(ToString::to_string).collect();
            println!(
                "dbot: config OK (env={}, roles={}, queue={:?})",
                config.env,
                roles.join(","),
                config.resolved_queue_backend()
            );
        }
        Commands::Serve => {
            init_tracing(&config.log_level);
            if let Err(e) = serve::run_serve(config).await {
                tracing::error!(error = %e, "dbot failed");
                std::process::exit(1);
            }
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dbot={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
