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

//! SQLite Data Access Layer
//!
//! [`DAL`] hands out per-entity accessors over a shared [`Database`]. It also
//! implements [`TaskStore`] so the polling loop can read overdue tasks
//! straight from SQLite.

use crate::database::Database;
use crate::error::StoreError;
use crate::models::task::Task;
use crate::store::TaskStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod models;
pub mod task;

use task::TaskDAL;

/// The main Data Access Layer struct for SQLite.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// Returns a TaskDAL instance for task-related database operations.
    pub fn task(&self) -> TaskDAL {
        TaskDAL { dal: self }
    }
}

#[async_trait]
impl TaskStore for DAL {
    async fn find_overdue(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        self.task().find_overdue(before).await
    }
}
