// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dbot serve`: wire the enabled roles together and run them until
//! shutdown.

use std::sync::Arc;

use dbot_bot::{Bot, event_channel};
use dbot_config::DbotConfig;
use dbot_core::{ChatConnector, DbotError, Queue, Repo};
use dbot_gateway::{GatewayState, start_server};
use dbot_queue::{build_queue, instance_name};
use dbot_slack::SlackApi;
use dbot_storage::{OAUTH_GC_INTERVAL, SqliteRepo, spawn_oauth_gc};
use dbot_vault::Vault;
use dbot_worker::Worker;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::shutdown;

/// Start every enabled role and block until they have all stopped.
pub async fn run_serve(config: DbotConfig) -> Result<(), DbotError> {
    let config = Arc::new(config);
    let roles: Vec<String> = config.roles().iter().map(ToString::to_string).collect();
    info!(env = %config.env, roles = %roles.join(","), "starting dbot");

    let vault = Vault::new(config.security.db_key.clone())?;
    let sqlite = SqliteRepo::open(&config.db.connect_string, vault).await?;
    let database = sqlite.database().clone();
    let repo: Arc<dyn Repo> = Arc::new(sqlite);

    let reply_name = instance_name();
    let queue = build_queue(&config, Some(&database), &reply_name).await?;
    let connector: Arc<dyn ChatConnector> = Arc::new(SlackApi::new()?);

    let cancel = shutdown::install_signal_handler();
    let handles = spawn_roles(&config, repo, queue.clone(), connector, &reply_name, &cancel).await?;

    cancel.cancelled().await;
    info!("draining roles");
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "role task ended abnormally");
        }
    }
    if let Err(e) = queue.close().await {
        warn!(error = %e, "failed to close queue");
    }
    if let Err(e) = database.close().await {
        warn!(error = %e, "failed to close database");
    }
    info!("dbot stopped");
    Ok(())
}

async fn spawn_roles(
    config: &Arc<DbotConfig>,
    repo: Arc<dyn Repo>,
    queue: Arc<dyn Queue>,
    connector: Arc<dyn ChatConnector>,
    reply_name: &str,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, DbotError> {
    let mut handles = vec![spawn_oauth_gc(repo.clone(), OAUTH_GC_INTERVAL, cancel.clone())];

    if config.worker {
        let worker = Arc::new(Worker::from_config(config, queue.clone())?);
        handles.push(tokio::spawn(worker.run(cancel.clone())));
    }

    if config.dedup {
        handles.push(tokio::spawn(dbot_dedup::run(queue.clone(), cancel.clone())));
    }

    let mut events = None;
    if config.bot {
        let bot = Bot::new(
            config.clone(),
            repo.clone(),
            queue.clone(),
            connector.clone(),
            reply_name,
        )
        .await?;
        if !config.web {
            warn!("bot runs without the web tier; it will only see replies and configuration");
        }
        let (sender, receiver) = event_channel();
        events = Some(sender);
        handles.push(tokio::spawn(bot.run(receiver, cancel.clone())));
    }

    if config.web {
        let state = GatewayState::new(
            config.clone(),
            repo,
            queue,
            connector,
            events,
            reply_name,
        )?;
        let address = config.address.clone();
        let web_cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = start_server(&address, state, web_cancel.clone()).await {
                error!(error = %e, "web tier failed");
                web_cancel.cancel();
            }
        }));
    }

    Ok(handles)
}
