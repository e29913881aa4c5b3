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

//! In-process task store.
//!
//! Useful for tests and for running the worker without a database. Failure
//! injection lets callers exercise the polling loop's backoff path.

use super::TaskStore;
use crate::error::StoreError;
use crate::models::task::{normalize_tags, NewTask, Task};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    next_id: i32,
    tasks: BTreeMap<i32, Task>,
}

/// Task store held entirely in memory.
///
/// Clones share the same underlying records.
#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    inner: Arc<RwLock<Inner>>,
    failures_remaining: Arc<AtomicUsize>,
    queries: Arc<AtomicUsize>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task and returns the stored record.
    pub fn insert(&self, new_task: NewTask) -> Task {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let task = Task {
            id: inner.next_id,
            tags: new_task.normalized_tags(),
            title: new_task.title,
            description: new_task.description,
            due_date: new_task.due_date,
            priority: new_task.priority,
            full_name: new_task.full_name,
            telephone: new_task.telephone,
            email: new_task.email,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.id, task.clone());
        task
    }

    pub fn get(&self, id: i32) -> Option<Task> {
        self.inner.read().tasks.get(&id).cloned()
    }

    /// Replaces the tag set of a task.
    pub fn replace_tags<S: AsRef<str>>(&self, id: i32, tags: &[S]) -> Result<Task, StoreError> {
        let mut inner = self.inner.write();
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        task.tags = normalize_tags(tags);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    pub fn remove(&self, id: i32) -> Option<Task> {
        self.inner.write().tasks.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next `count` queries fail with [`StoreError::Unavailable`].
    pub fn fail_next_queries(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of `find_overdue` calls made so far, including failed ones.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn find_overdue(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut overdue: Vec<Task> = self
            .inner
            .read()
            .tasks
            .values()
            .filter(|t| t.is_overdue(before))
            .cloned()
            .collect();
        overdue.sort_by_key(|t| (t.due_date, t.id));
        Ok(overdue)
    }
}
