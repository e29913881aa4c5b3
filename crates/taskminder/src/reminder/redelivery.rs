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

//! Failed-attempt bookkeeping for requeued messages.
//!
//! Classic AMQP queues only flag a message as redelivered; they do not count
//! attempts. The tracker counts failures per message body (keyed by its
//! SHA-256 digest) so the consumer can stop requeueing after a bounded number
//! of attempts. Like the dedup set it lives in process memory, so counts
//! restart with the worker.
//!
//! A failed message may later be acknowledged by another consumer, so entries
//! are not guaranteed to be forgotten. The tracker holds at most `capacity`
//! digests and evicts the oldest one first; an evicted message starts
//! counting from zero again.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Digests tracked before the oldest is evicted.
pub const DEFAULT_TRACKER_CAPACITY: usize = 10_000;

/// Failure counts keyed by payload digest.
#[derive(Debug)]
pub struct RedeliveryTracker {
    failures: HashMap<String, u32>,
    /// Digests in first-failure order.
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for RedeliveryTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACKER_CAPACITY)
    }
}

impl RedeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker holding at most `capacity` digests (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            failures: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Hex SHA-256 digest identifying a payload.
    pub fn digest(payload: &[u8]) -> String {
        hex::encode(Sha256::digest(payload))
    }

    /// Records a failed attempt and returns the number of failures so far.
    pub fn record_failure(&mut self, digest: &str) -> u32 {
        if let Some(count) = self.failures.get_mut(digest) {
            *count += 1;
            return *count;
        }

        while self.failures.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.failures.remove(&oldest);
                }
                None => break,
            }
        }
        self.failures.insert(digest.to_string(), 1);
        self.order.push_back(digest.to_string());
        1
    }

    pub fn failures(&self, digest: &str) -> u32 {
        self.failures.get(digest).copied().unwrap_or(0)
    }

    /// Drops the entry for a message that reached a terminal state.
    pub fn forget(&mut self, digest: &str) {
        if self.failures.remove(digest).is_some() {
            self.order.retain(|tracked| tracked != digest);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
