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

//! In-process message broker.
//!
//! Mirrors the parts of AMQP queue semantics the reminder pipeline relies on:
//! messages wait in a FIFO until delivered, a subscription holds at most
//! `prefetch` unacknowledged deliveries, an ack removes a message for good,
//! and a nack with requeue puts it back at the head of the queue flagged as
//! redelivered. Publishing to an undeclared queue is an error rather than a
//! silent drop.
//!
//! Inspection helpers expose what was published, acknowledged and
//! redelivered so tests can assert on queue state.

use super::{BrokerConnection, Delivery, DeliverySource, MessagePublisher, OutgoingMessage};
use crate::error::BrokerError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredMessage {
    message: OutgoingMessage,
    redelivered: bool,
    previous_deliveries: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
    published: Vec<OutgoingMessage>,
    acked: Vec<Vec<u8>>,
    discarded: Vec<Vec<u8>>,
    redeliveries: usize,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    next_tag: u64,
    closed: bool,
}

/// Broker that keeps its queues in memory.
///
/// Clones share the same queues, so one clone can publish while another
/// consumes.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    track_delivery_count: bool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a delivery count header on redeliveries, the way quorum
    /// queues do.
    pub fn with_delivery_count(mut self) -> Self {
        self.track_delivery_count = true;
        self
    }

    /// Declares a queue. Declaring an existing queue is a no-op.
    pub fn declare_queue(&self, queue: &str) {
        self.state
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default();
    }

    /// Opens a subscription on `queue` with the given prefetch limit.
    pub fn consume(&self, queue: &str, prefetch: u16) -> Result<MemoryDeliverySource, BrokerError> {
        let state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }
        Ok(MemoryDeliverySource {
            broker: self.clone(),
            queue: queue.to_string(),
            prefetch: usize::from(prefetch.max(1)),
            outstanding: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Closes the broker. Pending `next_delivery` calls return `None`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Messages waiting to be delivered.
    pub fn ready_count(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.ready.len())
    }

    /// Messages delivered but not yet settled.
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.unacked.len())
    }

    /// Every message ever published to `queue`, in publish order.
    pub fn published(&self, queue: &str) -> Vec<OutgoingMessage> {
        self.with_queue(queue, |q| q.published.clone())
    }

    /// Payloads removed from `queue` by an ack, in ack order.
    pub fn acked(&self, queue: &str) -> Vec<Vec<u8>> {
        self.with_queue(queue, |q| q.acked.clone())
    }

    /// Payloads rejected without requeue.
    pub fn discarded(&self, queue: &str) -> Vec<Vec<u8>> {
        self.with_queue(queue, |q| q.discarded.clone())
    }

    /// Number of times a message was returned to `queue` by a requeue.
    pub fn redelivery_count(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.redeliveries)
    }

    fn with_queue<T: Default>(&self, queue: &str, f: impl FnOnce(&QueueState) -> T) -> T {
        self.state.lock().queues.get(queue).map(f).unwrap_or_default()
    }

    fn settle(&self, queue: &str, tag: u64, requeue: Option<bool>) -> Result<(), BrokerError> {
        {
            let mut state = self.state.lock();
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
            let mut stored = queue_state
                .unacked
                .remove(&tag)
                .ok_or(BrokerError::AlreadySettled(tag))?;

            match requeue {
                None => queue_state.acked.push(stored.message.payload),
                Some(true) => {
                    stored.redelivered = true;
                    stored.previous_deliveries += 1;
                    queue_state.redeliveries += 1;
                    queue_state.ready.push_front(stored);
                }
                Some(false) => queue_state.discarded.push(stored.message.payload),
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for InMemoryBroker {
    async fn close(&self) -> Result<(), BrokerError> {
        InMemoryBroker::close(self);
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, queue: &str, message: OutgoingMessage) -> Result<(), BrokerError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
            queue_state.published.push(message.clone());
            queue_state.ready.push_back(StoredMessage {
                message,
                redelivered: false,
                previous_deliveries: 0,
            });
        }
        debug!("Queued message on in-memory queue '{}'", queue);
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Subscription on an [`InMemoryBroker`] queue.
pub struct MemoryDeliverySource {
    broker: InMemoryBroker,
    queue: String,
    prefetch: usize,
    outstanding: Arc<AtomicUsize>,
}

impl MemoryDeliverySource {
    /// Deliveries handed out and not yet settled.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn try_take(&self) -> Option<Option<MemoryDelivery>> {
        let mut state = self.broker.state.lock();
        if state.closed {
            return Some(None);
        }
        if self.outstanding.load(Ordering::SeqCst) >= self.prefetch {
            return None;
        }

        state.next_tag += 1;
        let tag = state.next_tag;
        let queue_state = state.queues.get_mut(&self.queue)?;
        let stored = queue_state.ready.pop_front()?;
        queue_state.unacked.insert(tag, stored.clone());
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let delivery_count = if self.broker.track_delivery_count && stored.previous_deliveries > 0 {
            Some(stored.previous_deliveries)
        } else {
            None
        };

        Some(Some(MemoryDelivery {
            broker: self.broker.clone(),
            queue: self.queue.clone(),
            tag,
            payload: stored.message.payload,
            redelivered: stored.redelivered,
            delivery_count,
            outstanding: self.outstanding.clone(),
            settled: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl DeliverySource for MemoryDeliverySource {
    async fn next_delivery(&mut self) -> Option<Result<Box<dyn Delivery>, BrokerError>> {
        loop {
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_take() {
                Some(Some(delivery)) => return Some(Ok(Box::new(delivery))),
                Some(None) => return None,
                None => notified.await,
            }
        }
    }
}

/// One message handed out by a [`MemoryDeliverySource`].
pub struct MemoryDelivery {
    broker: InMemoryBroker,
    queue: String,
    tag: u64,
    payload: Vec<u8>,
    redelivered: bool,
    delivery_count: Option<u32>,
    outstanding: Arc<AtomicUsize>,
    settled: AtomicBool,
}

impl MemoryDelivery {
    fn settle(&self, requeue: Option<bool>) -> Result<(), BrokerError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadySettled(self.tag));
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.broker.settle(&self.queue, self.tag, requeue)
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn delivery_tag(&self) -> u64 {
        self.tag
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    fn delivery_count(&self) -> Option<u32> {
        self.delivery_count
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(None)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settle(Some(requeue))
    }
}
