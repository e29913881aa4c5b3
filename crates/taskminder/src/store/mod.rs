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

//! Task store abstraction.
//!
//! The reminder pipeline never writes tasks; it only asks the store which
//! tasks were due before a cutoff. Implementations must resolve tag names
//! eagerly so that a reminder can be built without further queries.

use crate::error::StoreError;
use crate::models::task::Task;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;

pub use memory::MemoryTaskStore;

/// Read-side contract consumed by the polling loop.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Returns tasks whose due date is strictly before `before`, ordered by
    /// due date, with tags resolved.
    async fn find_overdue(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;
}

#[async_trait]
impl<T: TaskStore + ?Sized> TaskStore for std::sync::Arc<T> {
    async fn find_overdue(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        (**self).find_overdue(before).await
    }
}
