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

//! Message broker abstraction.
//!
//! The reminder pipeline talks to the queue through three small traits so
//! that the publish and consume roles can each own their own channel:
//!
//! - [`MessagePublisher`] sends a persistent message to a named queue
//! - [`DeliverySource`] yields deliveries from a subscription
//! - [`Delivery`] is one received message that must be acked or nacked
//!
//! Two implementations are provided: [`amqp`] on top of `lapin`, and
//! [`memory`], an in-process broker with the same acknowledgement and
//! requeue semantics.

use crate::error::BrokerError;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

pub use memory::InMemoryBroker;

/// Header carrying the broker-maintained delivery count (quorum queues).
pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// A message ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub payload: Vec<u8>,
    pub content_type: String,
    /// Survive a broker restart (AMQP delivery mode 2).
    pub persistent: bool,
    pub message_id: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl OutgoingMessage {
    /// A persistent JSON message.
    pub fn json(payload: Vec<u8>) -> Self {
        Self {
            payload,
            content_type: crate::models::reminder::CONTENT_TYPE.to_string(),
            persistent: true,
            message_id: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Publish side of a broker channel.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes `message` to `queue` through the default exchange.
    ///
    /// Returns once the broker has accepted the message.
    async fn publish(&self, queue: &str, message: OutgoingMessage) -> Result<(), BrokerError>;
}

/// A received message awaiting settlement.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn delivery_tag(&self) -> u64;

    fn payload(&self) -> &[u8];

    /// True when the broker has delivered this message before.
    fn redelivered(&self) -> bool;

    /// Broker-maintained count of previous delivery attempts, if the queue
    /// type tracks one.
    fn delivery_count(&self) -> Option<u32>;

    /// Removes the message from the queue.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Rejects the message, optionally returning it to the queue.
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// Consume side of a broker channel.
#[async_trait]
pub trait DeliverySource: Send + Sync {
    /// Waits for the next delivery. `None` means the subscription ended.
    async fn next_delivery(&mut self) -> Option<Result<Box<dyn Delivery>, BrokerError>>;
}

/// The connection that owns the role channels. Closed once, after both roles
/// have stopped.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn close(&self) -> Result<(), BrokerError>;
}
