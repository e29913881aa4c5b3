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

//! Worker lifecycle against SQLite and the in-memory broker.

use crate::fixtures::{overdue_task, FlakyNotifier, TestDatabase, QUEUE};
use std::sync::Arc;
use std::time::Duration;
use taskminder::broker::InMemoryBroker;
use taskminder::reminder::{ConsumerSettings, ReminderConsumer};
use taskminder::{PollingLoop, PollingSettings, ReminderPublisher, ReminderWorker};
use tokio_util::sync::CancellationToken;

const DEAD_LETTERS: &str = "task-reminders.dead-letter";

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_worker_round_trip_and_ordered_shutdown() {
    let db = TestDatabase::new().await;
    let tasks = db.dal.task();
    tasks.create(overdue_task("one", &["Urgent"])).await.unwrap();
    tasks.create(overdue_task("two", &["Home"])).await.unwrap();

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    let notifier = FlakyNotifier::failing(1);
    let consumer = ReminderConsumer::new(
        Box::new(broker.consume(QUEUE, 10).unwrap()),
        notifier.clone(),
        ConsumerSettings::new(QUEUE),
    );
    let poller = PollingLoop::new(
        Arc::new(db.dal.clone()),
        ReminderPublisher::new(Arc::new(broker.clone()), QUEUE),
        PollingSettings::default(),
    );

    let shutdown = CancellationToken::new();
    let handle = ReminderWorker::new(poller, consumer)
        .start_with_connection(shutdown.clone(), Box::new(broker.clone()));

    wait_until(|| broker.acked(QUEUE).len() == 2).await;
    assert!(!broker.is_closed());

    let report = handle.shutdown().await.unwrap();
    assert!(shutdown.is_cancelled());
    assert!(broker.is_closed());
    assert_eq!(report.reminded, 2);
    assert_eq!(report.consumer.acknowledged, 2);
    assert_eq!(report.consumer.requeued, 1);
    assert_eq!(notifier.delivered.lock().len(), 2);
}

#[tokio::test]
async fn test_poison_reminder_is_dead_lettered() {
    let db = TestDatabase::new().await;
    db.dal
        .task()
        .create(overdue_task("poison", &["Urgent"]))
        .await
        .unwrap();

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    broker.declare_queue(DEAD_LETTERS);
    let consumer = ReminderConsumer::new(
        Box::new(broker.consume(QUEUE, 10).unwrap()),
        FlakyNotifier::failing(usize::MAX),
        ConsumerSettings::new(QUEUE).with_max_delivery_attempts(3),
    )
    .with_dead_letter_publisher(Arc::new(broker.clone()));
    let poller = PollingLoop::new(
        Arc::new(db.dal.clone()),
        ReminderPublisher::new(Arc::new(broker.clone()), QUEUE),
        PollingSettings::default(),
    );

    let handle = ReminderWorker::new(poller, consumer).start(CancellationToken::new());
    wait_until(|| broker.published(DEAD_LETTERS).len() == 1).await;
    let report = handle.shutdown().await.unwrap();

    assert_eq!(report.consumer.requeued, 2);
    assert_eq!(report.consumer.dead_lettered, 1);
    assert_eq!(broker.ready_count(QUEUE), 0);
    assert_eq!(
        broker.published(DEAD_LETTERS)[0].payload,
        broker.published(QUEUE)[0].payload
    );
    assert!(!broker.is_closed());
}
