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

//! # Taskminder
//!
//! Taskminder watches a task store for items that have passed their due date
//! and turns each newly-overdue task into a reminder on a durable message
//! queue. A consumer on the same queue performs the notification side effect
//! and acknowledges each message, requeueing it when processing fails.
//!
//! ## Components
//!
//! - [`store::TaskStore`]: the read side, answering "which tasks are due before T"
//! - [`dedup::DedupSet`]: task ids already reminded during this process lifetime
//! - [`reminder::ReminderPublisher`]: serializes overdue tasks onto the queue
//! - [`reminder::ReminderConsumer`]: receives, notifies, then acks or requeues
//! - [`poller::PollingLoop`]: the timer that drives scan-and-publish cycles
//! - [`worker::ReminderWorker`]: hosts the polling loop and the consumer
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskminder::config::TaskminderConfig;
//! use taskminder::worker::ReminderWorker;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = TaskminderConfig::default();
//! let database = taskminder::Database::connect("taskminder.db", 1).await?;
//! let store = std::sync::Arc::new(taskminder::DAL::new(database));
//! let shutdown = CancellationToken::new();
//!
//! let handle = ReminderWorker::connect(&config, store, shutdown.clone()).await?;
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await?;
//! ```

pub mod broker;
pub mod config;
#[cfg(feature = "sqlite")]
pub mod dal;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod dedup;
pub mod error;
pub mod models;
pub mod poller;
pub mod reminder;
pub mod store;
pub mod worker;

pub use dedup::DedupSet;
pub use error::{BrokerError, ProcessingError, PublishError, StoreError, WorkerError};
pub use models::reminder::ReminderMessage;
pub use models::task::{NewTask, Priority, Task};
pub use poller::{PollingLoop, PollingSettings};
pub use reminder::{ReminderConsumer, ReminderPublisher};
pub use store::{MemoryTaskStore, TaskStore};
pub use worker::{ReminderWorker, WorkerHandle, WorkerReport};

#[cfg(feature = "sqlite")]
pub use dal::DAL;
#[cfg(feature = "sqlite")]
pub use database::Database;
#[cfg(feature = "sqlite")]
pub use error::DatabaseError;
