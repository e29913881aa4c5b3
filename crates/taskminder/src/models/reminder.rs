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

//! Reminder Message
//!
//! The wire schema carried on the reminder queue. A message is built from a
//! task at publish time and never changes afterwards: the tag list is a
//! snapshot, not a live reference into the store.

use super::task::{Priority, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type of every reminder body.
pub const CONTENT_TYPE: &str = "application/json";

/// Reminder for one overdue task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReminderMessage {
    pub task_id: i32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub telephone: String,
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
}

impl ReminderMessage {
    /// Builds a reminder from a task, snapshotting its tag names.
    pub fn from_task(task: &Task, published_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            full_name: task.full_name.clone(),
            email: task.email.clone(),
            telephone: task.telephone.clone(),
            priority: task.priority,
            tags: task.tags.clone(),
            published_at,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_task() -> Task {
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        Task {
            id: 42,
            title: "Renew passport".into(),
            description: Some("Bring photos".into()),
            due_date: due,
            priority: Priority::High,
            full_name: "Sam Doe".into(),
            telephone: "+15550100".into(),
            email: "sam@example.com".into(),
            created_at: due,
            updated_at: due,
            tags: vec!["Urgent".into()],
        }
    }

    #[test]
    fn test_wire_keys_are_pascal_case() {
        let published = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let message = ReminderMessage::from_task(&sample_task(), published);
        let value: serde_json::Value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["TaskId"], 42);
        assert_eq!(value["Title"], "Renew passport");
        assert_eq!(value["Priority"], 3);
        assert_eq!(value["Tags"], serde_json::json!(["Urgent"]));
        assert_eq!(value["FullName"], "Sam Doe");
        assert!(value.get("PublishedAt").is_some());
    }

    #[test]
    fn test_tags_are_a_snapshot() {
        let mut task = sample_task();
        let message = ReminderMessage::from_task(&task, Utc::now());
        task.tags.push("Later".into());
        assert_eq!(message.tags, vec!["Urgent".to_string()]);
    }

    #[test]
    fn test_accepts_message_without_optional_fields() {
        let body = br#"{"TaskId":7,"Title":"x","DueDate":"2026-01-01T00:00:00Z","Priority":1,"PublishedAt":"2026-01-01T00:05:00Z"}"#;
        let message = ReminderMessage::from_bytes(body).unwrap();
        assert_eq!(message.task_id, 7);
        assert!(message.tags.is_empty());
        assert_eq!(message.description, None);
    }

    #[test]
    fn test_rejects_null_body() {
        assert!(ReminderMessage::from_bytes(b"null").is_err());
    }
}
