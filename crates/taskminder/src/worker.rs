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

//! Worker host.
//!
//! [`ReminderWorker`] runs the two roles of the pipeline as background tasks:
//! the polling loop (publish role) and the reminder consumer (consume role).
//! Each role owns its own channel. On shutdown both roles are stopped and
//! joined before the broker connection is closed.

use crate::broker::BrokerConnection;
use crate::error::{BrokerError, WorkerError};
use crate::poller::{PollingLoop, PollingStats};
use crate::reminder::{ConsumerStats, ReminderConsumer, ReminderPublisher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[cfg(feature = "amqp")]
use {
    crate::broker::amqp::AmqpBroker,
    crate::config::TaskminderConfig,
    crate::poller::PollingSettings,
    crate::reminder::{ConsumerSettings, LogNotifier},
    crate::store::TaskStore,
    std::sync::Arc,
};

/// The publish and consume roles, ready to be started.
pub struct ReminderWorker {
    poller: PollingLoop,
    consumer: ReminderConsumer,
}

/// What the worker did before it stopped.
#[derive(Debug)]
pub struct WorkerReport {
    pub polling: PollingStats,
    pub consumer: ConsumerStats,
    /// Tasks reminded during this process lifetime.
    pub reminded: usize,
}

impl ReminderWorker {
    pub fn new(poller: PollingLoop, consumer: ReminderConsumer) -> Self {
        Self { poller, consumer }
    }

    /// Connects to the AMQP broker, opens one channel per role and starts
    /// both roles.
    ///
    /// Failing to reach the broker is fatal and returned as an error.
    #[cfg(feature = "amqp")]
    pub async fn connect(
        config: &TaskminderConfig,
        store: Arc<dyn TaskStore>,
        shutdown: CancellationToken,
    ) -> Result<WorkerHandle, WorkerError> {
        let broker = AmqpBroker::connect(&config.broker).await?;

        match Self::open_roles(&broker, config, store).await {
            Ok(worker) => Ok(worker.start_with_connection(shutdown, Box::new(broker))),
            Err(e) => {
                if let Err(close_err) = broker.close().await {
                    error!("Failed to close broker connection: {}", close_err);
                }
                Err(e.into())
            }
        }
    }

    #[cfg(feature = "amqp")]
    async fn open_roles(
        broker: &AmqpBroker,
        config: &TaskminderConfig,
        store: Arc<dyn TaskStore>,
    ) -> Result<Self, BrokerError> {
        let broker_config = &config.broker;
        let queue = broker_config.queue_name.clone();
        let dead_letter_queue = broker_config.dead_letter_queue_name();

        let publisher = broker.publisher(&[queue.as_str()]).await?;
        let consumer_tag = format!("taskminder-{}", uuid::Uuid::new_v4());
        let source = broker
            .consumer(&queue, broker_config.prefetch_count, &consumer_tag)
            .await?;

        let settings = ConsumerSettings::new(queue.clone())
            .with_dead_letter_queue(dead_letter_queue.clone())
            .with_max_delivery_attempts(broker_config.max_delivery_attempts);
        let mut consumer = ReminderConsumer::new(Box::new(source), Arc::new(LogNotifier), settings);
        if broker_config.max_delivery_attempts > 0 {
            let dead_letters = broker.publisher(&[dead_letter_queue.as_str()]).await?;
            consumer = consumer.with_dead_letter_publisher(Arc::new(dead_letters));
        }

        let poller = PollingLoop::new(
            store,
            ReminderPublisher::new(Arc::new(publisher), queue),
            PollingSettings {
                interval: config.reminders.poll_interval(),
                retry_interval: config.reminders.retry_interval(),
            },
        );

        Ok(Self::new(poller, consumer))
    }

    /// Starts both roles with no connection to close on shutdown.
    pub fn start(self, shutdown: CancellationToken) -> WorkerHandle {
        self.spawn(shutdown, None)
    }

    /// Starts both roles; `connection` is closed after they have stopped.
    pub fn start_with_connection(
        self,
        shutdown: CancellationToken,
        connection: Box<dyn BrokerConnection>,
    ) -> WorkerHandle {
        self.spawn(shutdown, Some(connection))
    }

    fn spawn(
        self,
        shutdown: CancellationToken,
        connection: Option<Box<dyn BrokerConnection>>,
    ) -> WorkerHandle {
        let poller = tokio::spawn(self.poller.run(shutdown.clone()));
        let consumer = tokio::spawn(self.consumer.run(shutdown.clone()));
        info!("Reminder worker started");

        WorkerHandle {
            shutdown,
            poller,
            consumer,
            connection,
        }
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown: CancellationToken,
    poller: JoinHandle<(ReminderPublisher, PollingStats)>,
    consumer: JoinHandle<ConsumerStats>,
    connection: Option<Box<dyn BrokerConnection>>,
}

impl WorkerHandle {
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Whether either role has stopped on its own, for example because the
    /// subscription ended.
    pub fn is_finished(&self) -> bool {
        self.poller.is_finished() || self.consumer.is_finished()
    }

    /// Signals both roles to stop, waits for them, then closes the connection.
    pub async fn shutdown(self) -> Result<WorkerReport, WorkerError> {
        info!("Stopping reminder worker");
        self.shutdown.cancel();

        let polled = self.poller.await.map_err(|e| WorkerError::Join {
            name: "polling loop",
            message: e.to_string(),
        });
        let consumed = self.consumer.await.map_err(|e| WorkerError::Join {
            name: "reminder consumer",
            message: e.to_string(),
        });

        let closed = match &self.connection {
            Some(connection) => connection.close().await,
            None => Ok::<(), BrokerError>(()),
        };

        let (publisher, polling) = polled?;
        let consumer = consumed?;
        closed?;

        info!("Reminder worker stopped");
        Ok(WorkerReport {
            polling,
            consumer,
            reminded: publisher.reminded().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::models::task::{NewTask, Priority};
    use crate::poller::PollingSettings;
    use crate::reminder::{ConsumerSettings, LogNotifier};
    use crate::store::MemoryTaskStore;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    const QUEUE: &str = "task-reminders";

    fn worker(broker: &InMemoryBroker, store: &MemoryTaskStore) -> ReminderWorker {
        broker.declare_queue(QUEUE);
        let source = broker.consume(QUEUE, 10).unwrap();
        let consumer = ReminderConsumer::new(
            Box::new(source),
            Arc::new(LogNotifier),
            ConsumerSettings::new(QUEUE),
        );
        let poller = PollingLoop::new(
            Arc::new(store.clone()),
            ReminderPublisher::new(Arc::new(broker.clone()), QUEUE),
            PollingSettings::default(),
        );
        ReminderWorker::new(poller, consumer)
    }

    #[tokio::test]
    async fn test_worker_publishes_and_consumes_then_closes_connection() {
        let broker = InMemoryBroker::new();
        let store = MemoryTaskStore::new();
        store.insert(
            NewTask::new("File taxes", Utc::now() - Duration::hours(1), Priority::High)
                .with_tag("Urgent"),
        );

        let handle = worker(&broker, &store)
            .start_with_connection(CancellationToken::new(), Box::new(broker.clone()));

        for _ in 0..1000 {
            if !broker.acked(QUEUE).is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!broker.is_closed());

        let report = handle.shutdown().await.unwrap();
        assert_eq!(report.reminded, 1);
        assert_eq!(report.consumer.acknowledged, 1);
        assert_eq!(report.polling.cycles, 1);
        assert!(broker.is_closed());
    }

    #[cfg(feature = "amqp")]
    #[tokio::test]
    async fn test_connect_fails_when_broker_is_unreachable() {
        let mut config = TaskminderConfig::default();
        config.broker.host = "127.0.0.1".into();
        config.broker.port = 1;

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ReminderWorker::connect(
                &config,
                Arc::new(MemoryTaskStore::new()),
                CancellationToken::new(),
            ),
        )
        .await
        .expect("connect did not fail promptly");

        assert!(matches!(
            result,
            Err(WorkerError::Broker(BrokerError::Connection(_)))
        ));
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_both_roles() {
        let broker = InMemoryBroker::new();
        let store = MemoryTaskStore::new();
        let shutdown = CancellationToken::new();

        let handle = worker(&broker, &store).start(shutdown.clone());
        shutdown.cancel();
        for _ in 0..1000 {
            if handle.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let report = handle.shutdown().await.unwrap();
        assert!(report.polling.cycles <= 1);
        assert_eq!(report.consumer.acknowledged, 0);
    }
}
