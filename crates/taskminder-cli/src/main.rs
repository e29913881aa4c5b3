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

//! Taskminder CLI - runs the overdue-task reminder worker and manages tasks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskminder::config::ConfigLoader;
use taskminder::Priority;

mod commands;
mod logging;

/// Taskminder - reminders for overdue tasks over a durable message queue
#[derive(Parser)]
#[command(name = "taskminder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to TASKMINDER_CONFIG or the standard search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL (can also be set via DATABASE_URL environment variable)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reminder worker until interrupted
    Worker,
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage tasks in the task store
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the default configuration as TOML
    Default,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task
    Add {
        #[arg(long)]
        title: String,

        /// Due date in RFC3339 format (e.g. "2026-10-17T09:00:00Z")
        #[arg(long)]
        due: String,

        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: Priority,

        /// Tag name; repeat for several tags
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,

        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, default_value = "")]
        phone: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long)]
        description: Option<String>,
    },
    /// List all tasks, newest first
    List,
    /// List tasks that are past their due date
    Overdue,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config {
        command: ConfigCommands::Default,
    } = cli.command
    {
        return commands::config::print_default();
    }

    let mut config = ConfigLoader::new()
        .load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let _log_guard = logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Worker => commands::worker::run(&config).await?,
        Commands::Config { .. } => {}
        Commands::Tasks { command } => {
            let dal = commands::tasks::open(&config).await?;
            match command {
                TaskCommands::Add {
                    title,
                    due,
                    priority,
                    tags,
                    name,
                    phone,
                    email,
                    description,
                } => {
                    let new_task = commands::tasks::build_task(
                        commands::tasks::TaskArgs {
                            title,
                            due,
                            priority,
                            tags,
                            name,
                            phone,
                            email,
                            description,
                        },
                    )?;
                    commands::tasks::add(&dal, new_task).await?;
                }
                TaskCommands::List => commands::tasks::list(&dal).await?,
                TaskCommands::Overdue => commands::tasks::overdue(&dal).await?,
            }
        }
    }

    Ok(())
}
