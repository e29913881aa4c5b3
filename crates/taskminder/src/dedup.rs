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

//! Deduplication set for published reminders.
//!
//! Holds the ids of tasks that already had a reminder published during this
//! process lifetime. Entries are never removed. The set is not persisted, so
//! a restarted worker reminds again for tasks that are still overdue; the
//! pipeline is at-least-once across restarts.
//!
//! The set is owned by the publisher and only touched from the polling
//! loop's task, so it needs no lock.

use std::collections::HashSet;

/// Task ids that have already been reminded.
#[derive(Debug, Default, Clone)]
pub struct DedupSet {
    seen: HashSet<i32>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, task_id: i32) -> bool {
        self.seen.contains(&task_id)
    }

    /// Records a task id. Returns `false` if it was already present.
    pub fn insert(&mut self, task_id: i32) -> bool {
        self.seen.insert(task_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_first_sighting_only() {
        let mut set = DedupSet::new();
        assert!(set.insert(7));
        assert!(!set.insert(7));
        assert!(set.contains(7));
        assert!(!set.contains(8));
        assert_eq!(set.len(), 1);
    }
}
