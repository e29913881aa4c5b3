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

//! Notification side effect performed for each consumed reminder.

use crate::error::NotifyError;
use crate::models::reminder::ReminderMessage;
use async_trait::async_trait;
use tracing::info;

/// Delivers a reminder to its recipient.
///
/// An error makes the consumer requeue the message.
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn notify(&self, reminder: &ReminderMessage) -> Result<(), NotifyError>;
}

/// Notifier that writes the reminder to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    /// The reminder line written for `reminder`.
    pub fn render(reminder: &ReminderMessage) -> String {
        format!(
            "REMINDER: Hi, your Task is due - Task ID: {}, Title: '{}', Assigned to: {}, Due Date: {}, Priority: {}, Tags: {}",
            reminder.task_id,
            reminder.title,
            reminder.full_name,
            reminder.due_date.format("%Y-%m-%d %H:%M"),
            reminder.priority.name(),
            reminder.tags.join(", ")
        )
    }
}

#[async_trait]
impl ReminderNotifier for LogNotifier {
    async fn notify(&self, reminder: &ReminderMessage) -> Result<(), NotifyError> {
        info!("{}", Self::render(reminder));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::Priority;
    use chrono::{TimeZone, Utc};
    use tracing_test::traced_test;

    fn reminder() -> ReminderMessage {
        let due = Utc.with_ymd_and_hms(2026, 10, 1, 14, 5, 0).unwrap();
        ReminderMessage {
            task_id: 12,
            title: "File taxes".into(),
            description: None,
            due_date: due,
            full_name: "Jo Park".into(),
            email: String::new(),
            telephone: String::new(),
            priority: Priority::High,
            tags: vec!["Finance".into(), "Urgent".into()],
            published_at: due,
        }
    }

    #[test]
    fn test_render() {
        assert_eq!(
            LogNotifier::render(&reminder()),
            "REMINDER: Hi, your Task is due - Task ID: 12, Title: 'File taxes', Assigned to: Jo Park, \
             Due Date: 2026-10-01 14:05, Priority: High, Tags: Finance, Urgent"
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_notify_logs_reminder_line() {
        LogNotifier.notify(&reminder()).await.unwrap();
        assert!(logs_contain("REMINDER: Hi, your Task is due - Task ID: 12"));
    }
}
