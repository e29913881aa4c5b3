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

//! Integration tests for the SQLite task DAL.

use crate::fixtures::{overdue_task, TestDatabase};
use chrono::{Duration, Utc};
use taskminder::{NewTask, Priority, StoreError, TaskStore};
use tokio::time::timeout;

#[tokio::test]
async fn test_create_and_get_resolves_tags() {
    let db = TestDatabase::new().await;

    let created = db
        .dal
        .task()
        .create(
            overdue_task("Renew passport", &["Urgent", " Home ", "Urgent"])
                .with_description("Bring two photos"),
        )
        .await
        .unwrap();

    let fetched = db.dal.task().get(created.id).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.tags, vec!["Home".to_string(), "Urgent".to_string()]);
    assert_eq!(fetched.description.as_deref(), Some("Bring two photos"));
    assert_eq!(fetched.priority, Priority::High);
    assert_eq!(fetched.full_name, "Ada Lovelace");
}

#[tokio::test]
async fn test_writes_complete_on_single_connection_pool() {
    let db = TestDatabase::new().await;
    assert_eq!(db.dal.database.pool().status().max_size, 1);
    let limit = std::time::Duration::from_secs(5);

    let created = timeout(limit, db.dal.task().create(overdue_task("Water plants", &["Home"])))
        .await
        .expect("create stalled waiting for a pooled connection")
        .unwrap();
    let retagged = timeout(
        limit,
        db.dal.task().replace_tags(created.id, &["Garden".to_string()]),
    )
    .await
    .expect("replace_tags stalled waiting for a pooled connection")
    .unwrap();

    assert_eq!(retagged.tags, vec!["Garden".to_string()]);
}

#[tokio::test]
async fn test_get_missing_task() {
    let db = TestDatabase::new().await;
    let result = db.dal.task().get(404).await;
    assert!(matches!(result, Err(StoreError::NotFound(404))));
}

#[tokio::test]
async fn test_find_overdue_is_strict_and_ordered() {
    let db = TestDatabase::new().await;
    let tasks = db.dal.task();
    let cutoff = Utc::now();

    let later = tasks
        .create(NewTask::new("later", cutoff - Duration::minutes(5), Priority::Low).with_tag("a"))
        .await
        .unwrap();
    let earlier = tasks
        .create(NewTask::new("earlier", cutoff - Duration::hours(2), Priority::Medium).with_tag("b"))
        .await
        .unwrap();
    tasks
        .create(NewTask::new("exactly due", cutoff, Priority::High).with_tag("c"))
        .await
        .unwrap();
    tasks
        .create(NewTask::new("future", cutoff + Duration::days(1), Priority::High).with_tag("d"))
        .await
        .unwrap();

    let overdue = db.dal.find_overdue(cutoff).await.unwrap();
    let ids: Vec<i32> = overdue.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![earlier.id, later.id]);
    assert_eq!(overdue[0].tags, vec!["b".to_string()]);
}

#[tokio::test]
async fn test_replace_tags() {
    let db = TestDatabase::new().await;
    let task = db
        .dal
        .task()
        .create(overdue_task("Pay rent", &["Urgent"]))
        .await
        .unwrap();

    let updated = db
        .dal
        .task()
        .replace_tags(task.id, &["Finance".to_string(), "Monthly".to_string()])
        .await
        .unwrap();
    assert_eq!(updated.tags, vec!["Finance".to_string(), "Monthly".to_string()]);
    assert!(updated.updated_at >= task.updated_at);

    let missing = db.dal.task().replace_tags(999, &["x".to_string()]).await;
    assert!(matches!(missing, Err(StoreError::NotFound(999))));
}

#[tokio::test]
async fn test_shared_tags_and_delete() {
    let db = TestDatabase::new().await;
    let tasks = db.dal.task();
    let first = tasks.create(overdue_task("one", &["Urgent"])).await.unwrap();
    let second = tasks.create(overdue_task("two", &["Urgent"])).await.unwrap();

    tasks.delete(first.id).await.unwrap();

    assert!(matches!(tasks.get(first.id).await, Err(StoreError::NotFound(_))));
    assert_eq!(tasks.get(second.id).await.unwrap().tags, vec!["Urgent".to_string()]);
    assert!(matches!(tasks.delete(first.id).await, Err(StoreError::NotFound(_))));

    let listed = tasks.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, second.id);
}
