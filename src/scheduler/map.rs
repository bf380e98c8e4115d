//! Ordered-map backend.
//!
//! Keys live in a `BTreeMap` indexed by `(time, seq)`, so every operation,
//! removal included, is O(log n).

use std::collections::BTreeMap;

use super::{EventKey, SchedulerBackend};
use crate::time::VirtualTime;
use crate::types::SequenceNumber;

#[derive(Debug, Default)]
pub struct MapScheduler {
    map: BTreeMap<(VirtualTime, SequenceNumber), u32>,
}

impl MapScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulerBackend for MapScheduler {
    fn name(&self) -> &'static str {
        "map"
    }

    fn insert(&mut self, key: EventKey) {
        self.map.insert((key.time, key.seq), key.slot);
    }

    fn peek(&self) -> Option<EventKey> {
        self.map
            .first_key_value()
            .map(|(&(time, seq), &slot)| EventKey { time, seq, slot })
    }

    fn pop(&mut self) -> Option<EventKey> {
        self.map
            .pop_first()
            .map(|((time, seq), slot)| EventKey { time, seq, slot })
    }

    fn remove(&mut self, key: &EventKey) -> bool {
        self.map.remove(&(key.time, key.seq)).is_some()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}
