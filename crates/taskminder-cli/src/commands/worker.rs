/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Implementation of the `worker` command.
//!
//! Opens the task store, connects to the broker and runs until Ctrl-C,
//! SIGTERM, or one of the worker roles stopping on its own.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use taskminder::config::TaskminderConfig;
use taskminder::{Database, ReminderWorker, WorkerHandle, DAL};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often to check whether a role has stopped by itself.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(config: &TaskminderConfig) -> Result<()> {
    let database = Database::connect(&config.database.url, config.database.pool_size)
        .await
        .with_context(|| format!("Failed to open task database {}", config.database.url))?;
    let store = Arc::new(DAL::new(database));

    let shutdown = CancellationToken::new();
    let handle = ReminderWorker::connect(config, store, shutdown.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to start reminder worker against {}:{}",
                config.broker.host, config.broker.port
            )
        })?;
    info!(
        "Worker running at {}, publishing to '{}'",
        chrono::Utc::now().to_rfc3339(),
        config.broker.queue_name
    );

    wait_for_stop(&handle).await;

    let report = handle
        .shutdown()
        .await
        .context("Reminder worker did not shut down cleanly")?;
    info!(
        "Worker stopped: {} cycles, {} reminders published, {} acknowledged, {} dead-lettered",
        report.polling.cycles,
        report.polling.published,
        report.consumer.acknowledged,
        report.consumer.dead_lettered
    );
    Ok(())
}

async fn wait_for_stop(handle: &WorkerHandle) {
    let mut health = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = &mut signal => {
                info!("Shutdown signal received");
                return;
            }
            _ = health.tick() => {
                if handle.is_finished() {
                    warn!("A worker role stopped unexpectedly, shutting down");
                    return;
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
