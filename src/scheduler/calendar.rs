//! Calendar-queue backend.
//!
//! Time is cut into windows of `width`; window `w` lives in bucket
//! `w & (buckets - 1)`, so one pass over the buckets covers a "year" of
//! `buckets * width`. Each bucket is kept sorted, which makes FIFO order at
//! equal times fall out of the `(time, seq)` key.
//!
//! ```text
//!   bucket:     0        1        2        3
//!            +------+ +------+ +------+ +------+
//!   window:  | 0, 4 | | 1, 5 | | 2, 6 | | 3, 7 |   (year = 4 windows)
//!            +------+ +------+ +------+ +------+
//!                        ^
//!                        cursor: last_bucket = 1, bucket_top = end of window 1
//! ```
//!
//! Dequeue scans forward from the cursor for a bucket whose front falls in
//! the current window; after a full year without a hit it falls back to a
//! direct search over the bucket fronts. The bucket count doubles when the
//! queue holds more than two events per bucket and halves below one per two
//! buckets; each resize re-estimates `width` from the spacing of the earliest
//! events.
//!
//! # Invariants
//!
//! - `buckets.len()` is a power of two and `>= 2`.
//! - Every key has `time >= last_prio`, the time of the last dequeued key
//!   (an earlier insert moves the cursor back).
//! - `bucket_top` is the exclusive end of the window `last_bucket` is in.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{EventKey, SchedulerBackend};
use crate::time::VirtualTime;

/// Number of earliest events sampled when re-estimating the bucket width.
const WIDTH_SAMPLE: usize = 25;

/// Tuning for [`CalendarScheduler`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Starting bucket count (rounded up to a power of two, at least 2).
    pub initial_buckets: usize,
    /// Starting window width.
    pub initial_width: VirtualTime,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            initial_buckets: 2,
            initial_width: VirtualTime::from_micros(1),
        }
    }
}

#[derive(Debug)]
pub struct CalendarScheduler {
    buckets: Vec<VecDeque<EventKey>>,
    /// Window width in attoseconds, always > 0.
    width: i128,
    len: usize,
    last_bucket: usize,
    bucket_top: i128,
    last_prio: i128,
    resizes: u64,
}

impl CalendarScheduler {
    pub fn new() -> Self {
        Self::with_config(&CalendarConfig::default())
    }

    pub fn with_config(config: &CalendarConfig) -> Self {
        let buckets = config.initial_buckets.max(2).next_power_of_two();
        let width = config.initial_width.attos().max(1);
        let mut sched = Self {
            buckets: vec![VecDeque::new(); buckets],
            width,
            len: 0,
            last_bucket: 0,
            bucket_top: 0,
            last_prio: 0,
            resizes: 0,
        };
        sched.move_cursor(0);
        sched
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn width(&self) -> VirtualTime {
        VirtualTime::from_attos(self.width)
    }

    /// How many times the calendar has been rebuilt.
    pub fn resizes(&self) -> u64 {
        self.resizes
    }

    fn bucket_of(&self, time: i128) -> usize {
        (time.div_euclid(self.width) & (self.buckets.len() as i128 - 1)) as usize
    }

    fn window_top(&self, time: i128) -> i128 {
        time.div_euclid(self.width)
            .saturating_add(1)
            .saturating_mul(self.width)
    }

    fn move_cursor(&mut self, time: i128) {
        self.last_prio = time;
        self.last_bucket = self.bucket_of(time);
        self.bucket_top = self.window_top(time);
    }

    fn insert_sorted(&mut self, key: EventKey) {
        let idx = self.bucket_of(key.time.attos());
        let bucket = &mut self.buckets[idx];
        let pos = bucket.partition_point(|k| k < &key);
        bucket.insert(pos, key);
    }

    /// Bucket holding the smallest key, and the end of its window.
    fn locate(&self) -> Option<(usize, i128)> {
        if self.len == 0 {
            return None;
        }
        let mask = self.buckets.len() - 1;
        let mut idx = self.last_bucket;
        let mut top = self.bucket_top;
        for _ in 0..self.buckets.len() {
            if let Some(front) = self.buckets[idx].front() {
                if front.time.attos() < top {
                    return Some((idx, top));
                }
            }
            idx = (idx + 1) & mask;
            top = top.saturating_add(self.width);
        }

        // Nothing due within a year of the cursor.
        let (idx, earliest) = self
            .buckets
            .iter()
            .enumerate()
            .filter_map(|(i, bucket)| bucket.front().map(|key| (i, *key)))
            .min_by_key(|(_, key)| *key)?;
        Some((idx, self.window_top(earliest.time.attos())))
    }

    /// Rebuilds with `buckets` buckets and a freshly estimated width.
    fn resize(&mut self, buckets: usize) {
        let mut keys: Vec<EventKey> = self.buckets.iter_mut().flat_map(|b| b.drain(..)).collect();
        keys.sort_unstable();

        if let Some(width) = estimate_width(&keys) {
            self.width = width;
        }
        self.buckets = vec![VecDeque::new(); buckets];
        // Ascending order keeps every bucket sorted with plain appends.
        for key in keys {
            let idx = self.bucket_of(key.time.attos());
            self.buckets[idx].push_back(key);
        }
        self.move_cursor(self.last_prio);
        self.resizes += 1;
    }
}

impl Default for CalendarScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Brown's estimate: three times the mean gap between the earliest events,
/// after discarding gaps more than twice the first mean.
fn estimate_width(sorted: &[EventKey]) -> Option<i128> {
    let sample = &sorted[..sorted.len().min(WIDTH_SAMPLE)];
    if sample.len() < 2 {
        return None;
    }
    let gaps: Vec<i128> = sample
        .windows(2)
        .map(|w| w[1].time.attos() - w[0].time.attos())
        .collect();
    let mean = gaps.iter().sum::<i128>() / gaps.len() as i128;

    let close: Vec<i128> = gaps.into_iter().filter(|&g| g <= mean * 2).collect();
    let refined = if close.is_empty() {
        mean
    } else {
        close.iter().sum::<i128>() / close.len() as i128
    };
    let width = refined.saturating_mul(3);
    (width > 0).then_some(width)
}

impl SchedulerBackend for CalendarScheduler {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn insert(&mut self, key: EventKey) {
        if key.time.attos() < self.last_prio {
            self.move_cursor(key.time.attos());
        }
        self.insert_sorted(key);
        self.len += 1;
        if self.len > self.buckets.len() * 2 {
            self.resize(self.buckets.len() * 2);
        }
    }

    fn peek(&self) -> Option<EventKey> {
        let (idx, _) = self.locate()?;
        self.buckets[idx].front().copied()
    }

    fn pop(&mut self) -> Option<EventKey> {
        let (idx, top) = self.locate()?;
        let key = self.buckets[idx].pop_front()?;
        self.len -= 1;
        self.last_bucket = idx;
        self.bucket_top = top;
        self.last_prio = key.time.attos();

        if self.buckets.len() > 2 && self.len < self.buckets.len() / 2 {
            self.resize(self.buckets.len() / 2);
        }
        Some(key)
    }

    fn remove(&mut self, key: &EventKey) -> bool {
        let idx = self.bucket_of(key.time.attos());
        match self.buckets[idx].binary_search(key) {
            Ok(pos) => {
                self.buckets[idx].remove(pos);
                self.len -= 1;
                true
            }
            Err(_) => false,
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
        self.move_cursor(0);
    }
}
