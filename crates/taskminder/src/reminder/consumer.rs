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

//! Reminder Consumer
//!
//! Receives reminder deliveries, performs the notification side effect and
//! settles each delivery:
//!
//! ```text
//! Delivered -> Processing -> Acknowledged            (success, terminal)
//!                         -> Requeued -> Delivered   (failure below the limit)
//!                         -> DeadLettered            (failure at the limit, terminal)
//! ```
//!
//! Processing is at-least-once: a failed message goes back to the queue and
//! the broker decides who sees it next. Once a message has failed
//! `max_delivery_attempts` times it is copied to the dead-letter queue and
//! acknowledged. A limit of zero requeues forever.
//!
//! A delivery that has started processing always finishes (ack or nack)
//! before [`ReminderConsumer::run`] observes shutdown.

use super::notifier::ReminderNotifier;
use super::redelivery::RedeliveryTracker;
use crate::broker::{Delivery, DeliverySource, MessagePublisher, OutgoingMessage};
use crate::error::{BrokerError, ProcessingError};
use crate::models::reminder::ReminderMessage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Header recording why a message was dead-lettered.
pub const FAILURE_REASON_HEADER: &str = "x-reminder-failure";
/// Header recording how many attempts a dead-lettered message had.
pub const ATTEMPTS_HEADER: &str = "x-reminder-attempts";
/// Header recording the queue a dead-lettered message came from.
pub const ORIGINAL_QUEUE_HEADER: &str = "x-original-queue";

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: String,
    pub dead_letter_queue: String,
    /// Failed attempts before a message is dead-lettered; 0 never does.
    pub max_delivery_attempts: u32,
}

impl ConsumerSettings {
    pub fn new(queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self {
            dead_letter_queue: format!("{}.dead-letter", queue),
            queue,
            max_delivery_attempts: 5,
        }
    }

    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter_queue = queue.into();
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_delivery_attempts > 0 && attempts >= self.max_delivery_attempts
    }
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged,
    Requeued { attempt: u32 },
    DeadLettered { attempts: u32 },
}

/// Running totals for one consumer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub acknowledged: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    pub settle_errors: u64,
}

/// Consumes reminder deliveries from one subscription.
pub struct ReminderConsumer {
    source: Box<dyn DeliverySource>,
    notifier: Arc<dyn ReminderNotifier>,
    dead_letters: Option<Arc<dyn MessagePublisher>>,
    settings: ConsumerSettings,
    tracker: RedeliveryTracker,
    stats: ConsumerStats,
}

impl ReminderConsumer {
    pub fn new(
        source: Box<dyn DeliverySource>,
        notifier: Arc<dyn ReminderNotifier>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            dead_letters: None,
            settings,
            tracker: RedeliveryTracker::new(),
            stats: ConsumerStats::default(),
        }
    }

    /// Publisher used to route exhausted messages to the dead-letter queue.
    ///
    /// Without one, exhausted messages keep being requeued.
    pub fn with_dead_letter_publisher(mut self, publisher: Arc<dyn MessagePublisher>) -> Self {
        self.dead_letters = Some(publisher);
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Consumes until `shutdown` is cancelled or the subscription ends.
    pub async fn run(mut self, shutdown: CancellationToken) -> ConsumerStats {
        info!(
            "Started consuming task reminder messages from '{}'",
            self.settings.queue
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Reminder consumer received shutdown signal");
                    break;
                }
                next = self.source.next_delivery() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    if let Err(e) = self.handle_delivery(delivery.as_ref()).await {
                        error!("Failed to settle reminder delivery: {}", e);
                        self.stats.settle_errors += 1;
                    }
                }
                Some(Err(e)) => {
                    error!("Reminder subscription failed: {}", e);
                    break;
                }
                None => {
                    warn!(
                        "Reminder subscription on '{}' ended",
                        self.settings.queue
                    );
                    break;
                }
            }
        }

        info!(
            "Reminder consumer stopped: {} acknowledged, {} requeued, {} dead-lettered",
            self.stats.acknowledged, self.stats.requeued, self.stats.dead_lettered
        );
        self.stats
    }

    /// Waits for one delivery and settles it. `None` means the subscription
    /// ended.
    pub async fn consume_one(&mut self) -> Option<Result<DeliveryOutcome, BrokerError>> {
        match self.source.next_delivery().await? {
            Ok(delivery) => Some(self.handle_delivery(delivery.as_ref()).await),
            Err(e) => Some(Err(e)),
        }
    }

    /// Processes one delivery and settles it.
    pub async fn handle_delivery(
        &mut self,
        delivery: &dyn Delivery,
    ) -> Result<DeliveryOutcome, BrokerError> {
        let digest = RedeliveryTracker::digest(delivery.payload());

        let notifier = Arc::clone(&self.notifier);
        let error = match Self::process(notifier.as_ref(), delivery.payload()).await {
            Ok(message) => {
                delivery.ack().await?;
                self.tracker.forget(&digest);
                self.stats.acknowledged += 1;
                debug!("Acknowledged reminder for task {}", message.task_id);
                return Ok(DeliveryOutcome::Acknowledged);
            }
            Err(e) => e,
        };

        // A zero limit never reads the count, so failures are not tracked.
        let attempts = match delivery.delivery_count() {
            Some(previous) => previous + 1,
            None if self.settings.max_delivery_attempts == 0 => 1,
            None => self.tracker.record_failure(&digest),
        };
        error!(
            "Error processing reminder message (delivery {}, attempt {}, redelivered {}): {}",
            delivery.delivery_tag(),
            attempts,
            delivery.redelivered(),
            error
        );

        if self.settings.exhausted(attempts) {
            if let Some(publisher) = &self.dead_letters {
                let message = OutgoingMessage::json(delivery.payload().to_vec())
                    .with_header(FAILURE_REASON_HEADER, error.to_string())
                    .with_header(ATTEMPTS_HEADER, attempts.to_string())
                    .with_header(ORIGINAL_QUEUE_HEADER, self.settings.queue.clone());

                match publisher
                    .publish(&self.settings.dead_letter_queue, message)
                    .await
                {
                    Ok(()) => {
                        delivery.ack().await?;
                        self.tracker.forget(&digest);
                        self.stats.dead_lettered += 1;
                        warn!(
                            "Moved reminder delivery {} to '{}' after {} attempts",
                            delivery.delivery_tag(),
                            self.settings.dead_letter_queue,
                            attempts
                        );
                        return Ok(DeliveryOutcome::DeadLettered { attempts });
                    }
                    Err(e) => {
                        error!(
                            "Failed to dead-letter reminder delivery {}, requeueing: {}",
                            delivery.delivery_tag(),
                            e
                        );
                    }
                }
            }
        }

        delivery.nack(true).await?;
        self.stats.requeued += 1;
        Ok(DeliveryOutcome::Requeued { attempt: attempts })
    }

    async fn process(
        notifier: &dyn ReminderNotifier,
        payload: &[u8],
    ) -> Result<ReminderMessage, ProcessingError> {
        if payload.is_empty() {
            return Err(ProcessingError::EmptyPayload);
        }
        let message = ReminderMessage::from_bytes(payload)?;
        notifier.notify(&message).await?;
        Ok(message)
    }
}
