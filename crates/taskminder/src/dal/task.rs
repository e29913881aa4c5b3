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

//! Task Data Access Layer
//!
//! Tasks own a set of tag names through the `task_tags` join table. Every
//! read resolves tags eagerly, ordered by name, so callers get complete
//! [`Task`] values without further queries.

use super::models::{
    timestamp_to_string, NewSqliteTag, NewSqliteTask, NewSqliteTaskTag, SqliteTask,
};
use super::DAL;
use crate::database::schema::{tags, task_tags, tasks};
use crate::error::StoreError;
use crate::models::task::{normalize_tags, NewTask, Task};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::collections::HashMap;

/// Data Access Layer for task operations.
pub struct TaskDAL<'a> {
    pub dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    /// Inserts a task and its tags, returning the stored record.
    pub async fn create(&self, new_task: NewTask) -> Result<Task, StoreError> {
        let conn = self.dal.database.get_connection().await?;

        let tag_names = new_task.normalized_tags();
        let now = timestamp_to_string(&Utc::now());
        let row = NewSqliteTask {
            title: new_task.title,
            description: new_task.description,
            due_date: timestamp_to_string(&new_task.due_date),
            priority: new_task.priority.into(),
            full_name: new_task.full_name,
            telephone: new_task.telephone,
            email: new_task.email,
            created_at: now.clone(),
            updated_at: now,
        };

        let id: i32 = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let id: i32 = diesel::insert_into(tasks::table)
                        .values(&row)
                        .returning(tasks::id)
                        .get_result(conn)?;
                    attach_tags(conn, id, &tag_names)?;
                    Ok(id)
                })
            })
            .await??;
        // Release the connection before `get` checks one out; the pool may hold one.
        drop(conn);

        self.get(id).await
    }

    /// Retrieves a task by id.
    pub async fn get(&self, id: i32) -> Result<Task, StoreError> {
        let conn = self.dal.database.get_connection().await?;

        let loaded = conn
            .interact(move |conn| {
                let row: Option<SqliteTask> = tasks::table
                    .find(id)
                    .select(SqliteTask::as_select())
                    .first(conn)
                    .optional()?;
                match row {
                    Some(row) => with_tags(conn, vec![row]),
                    None => Ok(Vec::new()),
                }
            })
            .await??;

        into_tasks(loaded)?
            .pop()
            .ok_or(StoreError::NotFound(id))
    }

    /// Lists all tasks, most recently created first.
    pub async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.dal.database.get_connection().await?;

        let loaded = conn
            .interact(|conn| {
                let rows: Vec<SqliteTask> = tasks::table
                    .select(SqliteTask::as_select())
                    .order((tasks::created_at.desc(), tasks::id.desc()))
                    .load(conn)?;
                with_tags(conn, rows)
            })
            .await??;

        into_tasks(loaded)
    }

    /// Tasks due strictly before `before`, earliest first.
    pub async fn find_overdue(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let cutoff = timestamp_to_string(&before);

        let loaded = conn
            .interact(move |conn| {
                let rows: Vec<SqliteTask> = tasks::table
                    .filter(tasks::due_date.lt(cutoff))
                    .select(SqliteTask::as_select())
                    .order((tasks::due_date.asc(), tasks::id.asc()))
                    .load(conn)?;
                with_tags(conn, rows)
            })
            .await??;

        into_tasks(loaded)
    }

    /// Replaces the tag set of a task.
    pub async fn replace_tags(&self, id: i32, tag_names: &[String]) -> Result<Task, StoreError> {
        let conn = self.dal.database.get_connection().await?;
        let tag_names = normalize_tags(tag_names);
        let now = timestamp_to_string(&Utc::now());

        let found = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let updated = diesel::update(tasks::table.find(id))
                        .set(tasks::updated_at.eq(&now))
                        .execute(conn)?;
                    if updated == 0 {
                        return Ok(false);
                    }
                    diesel::delete(task_tags::table.filter(task_tags::task_id.eq(id)))
                        .execute(conn)?;
                    attach_tags(conn, id, &tag_names)?;
                    Ok(true)
                })
            })
            .await??;
        drop(conn);

        if !found {
            return Err(StoreError::NotFound(id));
        }
        self.get(id).await
    }

    /// Deletes a task and its tag links.
    pub async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let conn = self.dal.database.get_connection().await?;

        let deleted = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    diesel::delete(task_tags::table.filter(task_tags::task_id.eq(id)))
                        .execute(conn)?;
                    diesel::delete(tasks::table.find(id)).execute(conn)
                })
            })
            .await??;

        if deleted == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

fn attach_tags(conn: &mut SqliteConnection, task_id: i32, tag_names: &[String]) -> QueryResult<()> {
    for name in tag_names {
        diesel::insert_or_ignore_into(tags::table)
            .values(&NewSqliteTag { name: name.as_str() })
            .execute(conn)?;
        let tag_id: i32 = tags::table
            .filter(tags::name.eq(name))
            .select(tags::id)
            .first(conn)?;
        diesel::insert_or_ignore_into(task_tags::table)
            .values(&NewSqliteTaskTag { task_id, tag_id })
            .execute(conn)?;
    }
    Ok(())
}

fn with_tags(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteTask>,
) -> QueryResult<Vec<(SqliteTask, Vec<String>)>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
    let pairs: Vec<(i32, String)> = task_tags::table
        .inner_join(tags::table)
        .filter(task_tags::task_id.eq_any(ids))
        .select((task_tags::task_id, tags::name))
        .order((task_tags::task_id.asc(), tags::name.asc()))
        .load(conn)?;

    let mut by_task: HashMap<i32, Vec<String>> = HashMap::new();
    for (task_id, name) in pairs {
        by_task.entry(task_id).or_default().push(name);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let names = by_task.remove(&row.id).unwrap_or_default();
            (row, names)
        })
        .collect())
}

fn into_tasks(loaded: Vec<(SqliteTask, Vec<String>)>) -> Result<Vec<Task>, StoreError> {
    loaded
        .into_iter()
        .map(|(row, names)| row.into_task(names))
        .collect()
}
