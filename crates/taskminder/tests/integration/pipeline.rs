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

//! End-to-end behavior of the publish and consume roles over the in-memory
//! broker, reading tasks from SQLite.

use crate::fixtures::{
    overdue_task, published_reminders, FlakyNotifier, FlakyPublisher, TestDatabase, QUEUE,
};
use std::sync::Arc;
use taskminder::broker::InMemoryBroker;
use taskminder::reminder::{ConsumerSettings, DeliveryOutcome, ReminderConsumer};
use taskminder::{PollingLoop, PollingSettings, ReminderPublisher};

fn polling_loop(db: &TestDatabase, publisher: ReminderPublisher) -> PollingLoop {
    PollingLoop::new(
        Arc::new(db.dal.clone()),
        publisher,
        PollingSettings::default(),
    )
}

#[tokio::test]
async fn test_overdue_task_is_reminded_once_across_cycles() {
    let db = TestDatabase::new().await;
    let task = db
        .dal
        .task()
        .create(overdue_task("Submit report", &["Work"]))
        .await
        .unwrap();

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    let mut poller = polling_loop(&db, ReminderPublisher::new(Arc::new(broker.clone()), QUEUE));

    for _ in 0..5 {
        poller.run_cycle().await.unwrap();
    }

    let reminders = published_reminders(&broker, QUEUE);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].task_id, task.id);
    assert!(poller.publisher().reminded().contains(task.id));
}

#[tokio::test]
async fn test_failed_publish_is_isolated_and_retried() {
    let db = TestDatabase::new().await;
    let tasks = db.dal.task();
    let first = tasks.create(overdue_task("first", &["a"])).await.unwrap();
    let second = tasks.create(overdue_task("second", &["b"])).await.unwrap();
    let third = tasks.create(overdue_task("third", &["c"])).await.unwrap();

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    let flaky = Arc::new(FlakyPublisher::new(broker.clone()));
    flaky.fail_for(second.id);
    let mut poller = polling_loop(&db, ReminderPublisher::new(flaky.clone(), QUEUE));

    let report = poller.run_cycle().await.unwrap().publish;
    let mut published = report.published.clone();
    published.sort();
    assert_eq!(published, vec![first.id, third.id]);
    assert_eq!(report.failed_ids(), vec![second.id]);
    assert!(!poller.publisher().reminded().contains(second.id));

    flaky.heal(second.id);
    let retry = poller.run_cycle().await.unwrap().publish;
    assert_eq!(retry.published, vec![second.id]);
    assert_eq!(retry.skipped, 2);
    assert_eq!(published_reminders(&broker, QUEUE).len(), 3);
}

#[tokio::test]
async fn test_reminder_carries_tag_snapshot() {
    let db = TestDatabase::new().await;
    let task = db
        .dal
        .task()
        .create(overdue_task("Call the bank", &["Urgent"]))
        .await
        .unwrap();

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    let mut poller = polling_loop(&db, ReminderPublisher::new(Arc::new(broker.clone()), QUEUE));
    poller.run_cycle().await.unwrap();

    db.dal
        .task()
        .replace_tags(task.id, &["Someday".to_string()])
        .await
        .unwrap();
    poller.run_cycle().await.unwrap();

    let reminders = published_reminders(&broker, QUEUE);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].tags, vec!["Urgent".to_string()]);
    assert_eq!(reminders[0].full_name, "Ada Lovelace");
    assert!(reminders[0].published_at >= task.due_date);
}

#[tokio::test]
async fn test_failed_notification_is_redelivered_with_same_payload() {
    let db = TestDatabase::new().await;
    db.dal
        .task()
        .create(overdue_task("Water plants", &["Home"]))
        .await
        .unwrap();

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    let mut poller = polling_loop(&db, ReminderPublisher::new(Arc::new(broker.clone()), QUEUE));
    poller.run_cycle().await.unwrap();

    let notifier = FlakyNotifier::failing(1);
    let mut consumer = ReminderConsumer::new(
        Box::new(broker.consume(QUEUE, 10).unwrap()),
        notifier.clone(),
        ConsumerSettings::new(QUEUE),
    );

    let first = consumer.consume_one().await.unwrap().unwrap();
    assert!(matches!(first, DeliveryOutcome::Requeued { attempt: 1 }));
    assert_eq!(broker.redelivery_count(QUEUE), 1);
    assert!(broker.acked(QUEUE).is_empty());

    let second = consumer.consume_one().await.unwrap().unwrap();
    assert_eq!(second, DeliveryOutcome::Acknowledged);

    let published = broker.published(QUEUE);
    assert_eq!(broker.acked(QUEUE), vec![published[0].payload.clone()]);
    assert_eq!(notifier.delivered.lock().len(), 1);
}

#[tokio::test]
async fn test_every_published_reminder_is_eventually_settled() {
    let db = TestDatabase::new().await;
    for title in ["a", "b", "c", "d"] {
        db.dal
            .task()
            .create(overdue_task(title, &["Batch"]))
            .await
            .unwrap();
    }

    let broker = InMemoryBroker::new();
    broker.declare_queue(QUEUE);
    let mut poller = polling_loop(&db, ReminderPublisher::new(Arc::new(broker.clone()), QUEUE));
    poller.run_cycle().await.unwrap();

    let notifier = FlakyNotifier::failing(2);
    let mut consumer = ReminderConsumer::new(
        Box::new(broker.consume(QUEUE, 2).unwrap()),
        notifier.clone(),
        ConsumerSettings::new(QUEUE),
    );
    while broker.acked(QUEUE).len() < 4 {
        consumer.consume_one().await.unwrap().unwrap();
    }

    let mut delivered: Vec<i32> = notifier.delivered.lock().iter().map(|r| r.task_id).collect();
    delivered.sort();
    let mut expected: Vec<i32> = published_reminders(&broker, QUEUE)
        .iter()
        .map(|r| r.task_id)
        .collect();
    expected.sort();
    assert_eq!(delivered, expected);
    assert_eq!(broker.ready_count(QUEUE), 0);
    assert_eq!(broker.unacked_count(QUEUE), 0);
}
