//! Binary-heap backend, the reference ordering strategy.
//!
//! `BinaryHeap` is a max-heap, so keys are wrapped in `Reverse` to pop the
//! smallest `(time, seq)` first. Cancellation is lazy: removing an arbitrary
//! key costs a full rebuild, so the scheduler only asks for it on an explicit
//! `remove`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::{EventKey, SchedulerBackend};

#[derive(Debug, Default)]
pub struct HeapScheduler {
    heap: BinaryHeap<Reverse<EventKey>>,
}

impl HeapScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulerBackend for HeapScheduler {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn insert(&mut self, key: EventKey) {
        self.heap.push(Reverse(key));
    }

    fn peek(&self) -> Option<EventKey> {
        self.heap.peek().map(|Reverse(key)| *key)
    }

    fn pop(&mut self) -> Option<EventKey> {
        self.heap.pop().map(|Reverse(key)| key)
    }

    fn remove(&mut self, key: &EventKey) -> bool {
        let before = self.heap.len();
        self.heap.retain(|Reverse(k)| k.seq != key.seq);
        self.heap.len() != before
    }

    fn eager_removal(&self) -> bool {
        false
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn clear(&mut self) {
        self.heap.clear();
    }
}
