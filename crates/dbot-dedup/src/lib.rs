// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dedup role: pops the `message` topic, forwards new requests to
//! `work` and drops repeats seen within the last five minutes.

pub mod deduper;

use std::sync::Arc;
use std::time::Duration;

use dbot_core::Queue;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use deduper::Deduper;

/// Consume the `message` topic until the queue closes or `cancel` fires.
pub async fn run(queue: Arc<dyn Queue>, cancel: CancellationToken) {
    let mut deduper = Deduper::new();
    info!("dedup started");
    loop {
        let popped = tokio::select! {
            _ = cancel.cancelled() => break,
            r = queue.pop_message(None) => r,
        };
        let request = match popped {
            Ok(request) => request,
            Err(e) if e.is_closed() => break,
            Err(e) => {
                warn!(error = %e, "unable to pop message");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        if !deduper.admit(&request, Instant::now()) {
            debug!(message_id = %request.message_id, team = %request.context.team, "duplicate dropped");
            continue;
        }
        debug!(message_id = %request.message_id, "forwarding to work");
        if let Err(e) = queue.push_work(&request).await {
            if e.is_closed() {
                break;
            }
            warn!(message_id = %request.message_id, error = %e, "unable to push work");
        }
    }
    info!("dedup stopped");
}
