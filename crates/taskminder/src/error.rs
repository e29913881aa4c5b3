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

//! Error types for the reminder pipeline.
//!
//! Each concern gets its own error enum so callers can tell a store outage
//! (retry the cycle later) from a broker fault (fatal at startup, per-task
//! at publish time) from a bad message (requeue or dead-letter).

use thiserror::Error;

/// Errors raised by a [`crate::store::TaskStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Task {0} not found")]
    NotFound(i32),

    #[error("Stored value for {field} is invalid: '{value}'")]
    Corrupt { field: &'static str, value: String },

    #[error("Task store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "sqlite")]
impl From<deadpool::managed::PoolError<deadpool_diesel::Error>> for StoreError {
    fn from(err: deadpool::managed::PoolError<deadpool_diesel::Error>) -> Self {
        StoreError::ConnectionPool(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<deadpool_diesel::InteractError> for StoreError {
    fn from(err: deadpool_diesel::InteractError) -> Self {
        StoreError::ConnectionPool(err.to_string())
    }
}

/// Errors raised while opening or migrating the SQLite database.
#[cfg(feature = "sqlite")]
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to create connection pool: {0}")]
    Pool(String),

    #[error("Failed to get database connection: {0}")]
    Connection(String),

    #[error("Failed to run migrations: {0}")]
    Migration(String),
}

/// Errors raised by a message broker implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Failed to declare queue '{queue}': {message}")]
    QueueDeclare { queue: String, message: String },

    #[error("Failed to publish to '{queue}': {message}")]
    Publish { queue: String, message: String },

    #[error("Broker rejected message published to '{queue}'")]
    Rejected { queue: String },

    #[error("Failed to settle delivery {delivery_tag}: {message}")]
    Settle { delivery_tag: u64, message: String },

    #[error("Delivery {0} was already settled")]
    AlreadySettled(u64),

    #[error("Unknown queue '{0}'")]
    UnknownQueue(String),

    #[error("Broker connection is closed")]
    Closed,
}

/// Errors raised while turning one overdue task into a queued reminder.
///
/// These are recovered per task: the batch continues and the task stays out
/// of the dedup set so the next cycle retries it.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize reminder: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Failure reported by a [`crate::reminder::ReminderNotifier`].
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Errors raised while processing a single delivered reminder.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Failed to deserialize reminder: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Reminder payload was empty")]
    EmptyPayload,

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Errors that stop the worker host.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Background task '{name}' failed: {message}")]
    Join { name: &'static str, message: String },
}
