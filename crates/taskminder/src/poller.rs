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

//! Polling Loop
//!
//! Drives periodic overdue-task detection. Each cycle asks the task store for
//! tasks due before now (UTC) and hands them to the [`ReminderPublisher`].
//! A failed cycle is logged and retried after the shorter retry interval;
//! only the shutdown signal ends the loop.
//!
//! ```text
//! loop {
//!     cycle() -> Ok  => wait(interval)
//!             -> Err => wait(retry_interval)
//!     shutdown observed before or during the wait => stop
//! }
//! ```

use crate::error::StoreError;
use crate::reminder::{PublishReport, ReminderPublisher};
use crate::store::TaskStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Timing for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    /// Wait between successful cycles.
    pub interval: Duration,
    /// Wait after a failed cycle.
    pub retry_interval: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retry_interval: Duration::from_secs(30),
        }
    }
}

/// Result of one scan-and-publish cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Overdue tasks returned by the store, including already-reminded ones.
    pub overdue: usize,
    pub publish: PublishReport,
}

/// Totals for a finished [`PollingLoop::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollingStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub published: u64,
}

/// Periodically scans the task store and publishes reminders.
pub struct PollingLoop {
    store: Arc<dyn TaskStore>,
    publisher: ReminderPublisher,
    settings: PollingSettings,
}

impl PollingLoop {
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: ReminderPublisher,
        settings: PollingSettings,
    ) -> Self {
        Self {
            store,
            publisher,
            settings,
        }
    }

    pub fn publisher(&self) -> &ReminderPublisher {
        &self.publisher
    }

    /// Runs a single scan-and-publish cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, StoreError> {
        let now = Utc::now();
        info!("Checking for overdue tasks at: {}", now.to_rfc3339());

        let overdue = self.store.find_overdue(now).await?;
        let fresh = overdue
            .iter()
            .filter(|task| !self.publisher.reminded().contains(task.id))
            .count();
        info!(
            "Found {} overdue tasks at {}",
            fresh,
            now.format("%Y-%m-%d %H:%M:%S")
        );

        let publish = self.publisher.publish_overdue(&overdue, now).await;
        Ok(CycleReport {
            overdue: overdue.len(),
            publish,
        })
    }

    /// Runs cycles until `shutdown` is cancelled.
    ///
    /// Returns the publisher so the caller can inspect what was reminded.
    pub async fn run(mut self, shutdown: CancellationToken) -> (ReminderPublisher, PollingStats) {
        let mut stats = PollingStats::default();
        info!(
            "Polling for overdue tasks every {:?} (retry after {:?})",
            self.settings.interval, self.settings.retry_interval
        );

        while !shutdown.is_cancelled() {
            stats.cycles += 1;
            let wait = match self.run_cycle().await {
                Ok(report) => {
                    stats.published += report.publish.published.len() as u64;
                    self.settings.interval
                }
                Err(e) => {
                    stats.failed_cycles += 1;
                    error!("Error occurred while checking overdue tasks: {}", e);
                    self.settings.retry_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Polling loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(
            "Polling loop stopped after {} cycles ({} failed, {} reminders published)",
            stats.cycles, stats.failed_cycles, stats.published
        );
        (self.publisher, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::models::task::{NewTask, Priority, Task};
    use crate::store::MemoryTaskStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    const QUEUE: &str = "task-reminders";

    /// Store that fails its first query and records when each query ran.
    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl TaskStore for RecordingStore {
        async fn find_overdue(&self, _before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            if calls.len() == 1 {
                Err(StoreError::Unavailable("database restarting".into()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn publisher(broker: &InMemoryBroker) -> ReminderPublisher {
        broker.declare_queue(QUEUE);
        ReminderPublisher::new(Arc::new(broker.clone()), QUEUE)
    }

    #[tokio::test]
    async fn test_cycle_publishes_each_overdue_task_once() {
        let store = MemoryTaskStore::new();
        let due = Utc::now() - ChronoDuration::hours(1);
        store.insert(NewTask::new("a", due, Priority::High).with_tag("Urgent"));
        store.insert(NewTask::new("b", due, Priority::Low).with_tag("Home"));

        let broker = InMemoryBroker::new();
        let mut poller = PollingLoop::new(
            Arc::new(store),
            publisher(&broker),
            PollingSettings::default(),
        );

        let first = poller.run_cycle().await.unwrap();
        let second = poller.run_cycle().await.unwrap();

        assert_eq!(first.publish.published.len(), 2);
        assert_eq!(second.overdue, 2);
        assert!(second.publish.published.is_empty());
        assert_eq!(broker.published(QUEUE).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_retries_after_short_interval() {
        let store = Arc::new(RecordingStore::default());
        let broker = InMemoryBroker::new();
        let poller = PollingLoop::new(store.clone(), publisher(&broker), PollingSettings::default());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(poller.run(shutdown.clone()));
        while store.calls.lock().len() < 3 {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
        shutdown.cancel();
        let (_, stats) = handle.await.unwrap();

        let calls = store.calls.lock().clone();
        assert_eq!((calls[1] - calls[0]).as_secs(), 30);
        assert_eq!((calls[2] - calls[1]).as_secs(), 60);
        assert_eq!(stats.failed_cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let broker = InMemoryBroker::new();
        let store = MemoryTaskStore::new();
        let poller = PollingLoop::new(
            Arc::new(store.clone()),
            publisher(&broker),
            PollingSettings::default(),
        );
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(poller.run(shutdown.clone()));
        while store.query_count() < 1 {
            tokio::task::yield_now().await;
        }
        let started = Instant::now();
        shutdown.cancel();
        let (_, stats) = handle.await.unwrap();

        assert_eq!(stats.cycles, 1);
        assert!(started.elapsed() < std::time::Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_no_cycle() {
        let broker = InMemoryBroker::new();
        let store = MemoryTaskStore::new();
        let poller = PollingLoop::new(
            Arc::new(store.clone()),
            publisher(&broker),
            PollingSettings::default(),
        );
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let (_, stats) = poller.run(shutdown).await;
        assert_eq!(stats.cycles, 0);
        assert_eq!(store.query_count(), 0);
    }
}
