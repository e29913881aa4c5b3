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

//! Implementation of the `tasks` commands.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use taskminder::config::TaskminderConfig;
use taskminder::{Database, NewTask, Priority, Task, TaskStore, DAL};

/// Arguments of `tasks add`.
pub struct TaskArgs {
    pub title: String,
    pub due: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub description: Option<String>,
}

pub async fn open(config: &TaskminderConfig) -> Result<DAL> {
    let database = Database::connect(&config.database.url, config.database.pool_size)
        .await
        .with_context(|| format!("Failed to open task database {}", config.database.url))?;
    Ok(DAL::new(database))
}

/// Parses an RFC3339 timestamp into UTC.
fn parse_due(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Invalid due date '{}': expected RFC3339, e.g. 2026-10-17T09:00:00Z", s))
}

pub fn build_task(args: TaskArgs) -> Result<NewTask> {
    if args.title.trim().is_empty() {
        return Err(anyhow!("Task title cannot be empty"));
    }

    let mut task = NewTask::new(args.title, parse_due(&args.due)?, args.priority)
        .with_contact(args.name, args.phone, args.email);
    if let Some(description) = args.description {
        task = task.with_description(description);
    }
    for tag in args.tags {
        task = task.with_tag(tag);
    }

    if task.normalized_tags().is_empty() {
        return Err(anyhow!("At least one non-empty --tag is required"));
    }
    Ok(task)
}

pub fn format_task(task: &Task) -> String {
    format!(
        "#{:<5} {:<6} due {}  {}  [{}]",
        task.id,
        task.priority.name(),
        task.due_date.format("%Y-%m-%d %H:%M"),
        task.title,
        task.tags.join(", ")
    )
}

pub async fn add(dal: &DAL, new_task: NewTask) -> Result<()> {
    let task = dal
        .task()
        .create(new_task)
        .await
        .context("Failed to create task")?;
    println!("Created {}", format_task(&task));
    Ok(())
}

pub async fn list(dal: &DAL) -> Result<()> {
    let tasks = dal.task().list().await.context("Failed to list tasks")?;
    if tasks.is_empty() {
        println!("No tasks");
    }
    for task in &tasks {
        println!("{}", format_task(task));
    }
    Ok(())
}

pub async fn overdue(dal: &DAL) -> Result<()> {
    let tasks = dal
        .find_overdue(Utc::now())
        .await
        .context("Failed to query overdue tasks")?;
    println!("{} overdue tasks", tasks.len());
    for task in &tasks {
        println!("{}", format_task(task));
    }
    Ok(())
}
