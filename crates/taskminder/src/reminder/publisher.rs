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

//! Reminder Publisher
//!
//! Converts overdue tasks into persistent queue messages, once per task per
//! process lifetime. A task only enters the dedup set after its reminder was
//! accepted by the broker, so a failed publish is retried on the next scan.

use crate::broker::{MessagePublisher, OutgoingMessage};
use crate::dedup::DedupSet;
use crate::error::PublishError;
use crate::models::reminder::ReminderMessage;
use crate::models::task::Task;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Header naming the task a reminder belongs to.
pub const TASK_ID_HEADER: &str = "x-reminder-task-id";

/// Outcome of one publish batch.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Task ids whose reminder was published in this batch.
    pub published: Vec<i32>,
    /// Tasks skipped because they were reminded in an earlier batch.
    pub skipped: usize,
    pub failed: Vec<(i32, PublishError)>,
}

impl PublishReport {
    pub fn failed_ids(&self) -> Vec<i32> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }
}

/// Publishes reminder messages for overdue tasks.
pub struct ReminderPublisher {
    publisher: Arc<dyn MessagePublisher>,
    queue: String,
    reminded: DedupSet,
}

impl ReminderPublisher {
    pub fn new(publisher: Arc<dyn MessagePublisher>, queue: impl Into<String>) -> Self {
        Self {
            publisher,
            queue: queue.into(),
            reminded: DedupSet::new(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Tasks reminded so far.
    pub fn reminded(&self) -> &DedupSet {
        &self.reminded
    }

    /// Publishes a reminder for every task in `tasks` not yet reminded.
    ///
    /// A failure for one task is logged and recorded in the report; the
    /// remaining tasks are still published.
    pub async fn publish_overdue(&mut self, tasks: &[Task], now: DateTime<Utc>) -> PublishReport {
        let mut report = PublishReport::default();

        for task in tasks {
            if self.reminded.contains(task.id) {
                report.skipped += 1;
                continue;
            }

            match self.publish_reminder(task, now).await {
                Ok(()) => {
                    self.reminded.insert(task.id);
                    info!("Published reminder for task {}: {}", task.id, task.title);
                    report.published.push(task.id);
                }
                Err(e) => {
                    error!("Error publishing reminder for task {}: {}", task.id, e);
                    report.failed.push((task.id, e));
                }
            }
        }

        if report.skipped > 0 {
            debug!("Skipped {} already-reminded tasks", report.skipped);
        }
        report
    }

    /// Serializes and publishes a reminder for a single task without
    /// touching the dedup set.
    pub async fn publish_reminder(&self, task: &Task, now: DateTime<Utc>) -> Result<(), PublishError> {
        let message = ReminderMessage::from_task(task, now);
        let body = message.to_bytes()?;

        let outgoing = OutgoingMessage::json(body)
            .with_message_id(Uuid::new_v4().to_string())
            .with_header(TASK_ID_HEADER, task.id.to_string());

        self.publisher.publish(&self.queue, outgoing).await?;
        Ok(())
    }
}
