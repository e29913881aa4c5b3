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

//! SQLite row types.
//!
//! Timestamps are stored as TEXT and priorities as INTEGER; both are
//! converted to domain types at the DAL boundary.

use crate::database::schema::*;
use crate::error::StoreError;
use crate::models::task::{Priority, Task};
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteTask {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub due_date: String,
    pub priority: i32,
    pub full_name: String,
    pub telephone: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewSqliteTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: String,
    pub priority: i32,
    pub full_name: String,
    pub telephone: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tags)]
pub struct NewSqliteTag<'a> {
    pub name: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_tags)]
pub struct NewSqliteTaskTag {
    pub task_id: i32,
    pub tag_id: i32,
}

/// Formats a timestamp so that string order matches time order.
pub fn timestamp_to_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            field,
            value: value.to_string(),
        })
}

impl SqliteTask {
    pub fn into_task(self, tags: Vec<String>) -> Result<Task, StoreError> {
        let priority = Priority::try_from(self.priority).map_err(|_| StoreError::Corrupt {
            field: "priority",
            value: self.priority.to_string(),
        })?;

        Ok(Task {
            id: self.id,
            title: self.title,
            description: self.description,
            due_date: parse_timestamp("due_date", &self.due_date)?,
            priority,
            full_name: self.full_name,
            telephone: self.telephone,
            email: self.email,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_strings_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2025, 6, 1, 9, 5, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);

        let (a, b) = (timestamp_to_string(&early), timestamp_to_string(&late));
        assert_eq!(a, "2025-06-01T09:05:00.000000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp("due_date", &b).unwrap(), late);
    }

    #[test]
    fn test_unknown_priority_is_corrupt() {
        let row = SqliteTask {
            id: 1,
            title: "t".into(),
            description: None,
            due_date: "2025-06-01T09:05:00.000000Z".into(),
            priority: 7,
            full_name: String::new(),
            telephone: String::new(),
            email: String::new(),
            created_at: "2025-06-01T09:05:00.000000Z".into(),
            updated_at: "2025-06-01T09:05:00.000000Z".into(),
        };
        assert!(matches!(
            row.into_task(Vec::new()),
            Err(StoreError::Corrupt { field: "priority", .. })
        ));
    }
}
