//! Bounded memory of recently produced step results.
//!
//! At-least-once delivery means an agent can see the same task step
//! twice. The service answers a redelivery from this cache instead of
//! computing a second, possibly different, result.

use std::collections::{HashMap, VecDeque};

use taskmesh_core::TaskResultPayload;
use uuid::Uuid;

pub(crate) type StepKey = (Uuid, u32);

pub(crate) struct RecentResults {
    capacity: usize,
    order: VecDeque<StepKey>,
    entries: HashMap<StepKey, TaskResultPayload>,
}

impl RecentResults {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, key: &StepKey) -> Option<&TaskResultPayload> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, payload: TaskResultPayload) {
        let key = (payload.task_id, payload.step);
        if self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            } else {
                break;
            }
        }
        self.order.push_back(key);
        self.entries.insert(key, payload);
    }
}
