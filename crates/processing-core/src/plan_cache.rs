//! Bounded cache of FFT plans.
//!
//! Planning a transform is expensive relative to running it once, and the
//! history length rarely changes, so plans are kept between frames. The
//! cache holds at most `capacity` plans and evicts the least recently used
//! one. A fresh planner is created per miss so no planner-internal cache
//! outlives its entry.

use std::sync::Arc;

use rustfft::{Fft, FftDirection, FftPlanner};

/// Default number of cached plans: one forward and one inverse for the
/// current history length, plus room for one more length.
pub const DEFAULT_PLAN_CAPACITY: usize = 4;

struct CachedPlan {
    len: usize,
    direction: FftDirection,
    plan: Arc<dyn Fft<f32>>,
    last_used: u64,
}

/// LRU cache of FFT plans keyed by transform length and direction.
pub struct PlanCache {
    entries: Vec<CachedPlan>,
    capacity: usize,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Fetch the plan for `len`/`direction`, planning it on a miss.
    pub fn get(&mut self, len: usize, direction: FftDirection) -> Arc<dyn Fft<f32>> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.len == len && e.direction == direction)
        {
            entry.last_used = tick;
            self.hits += 1;
            return Arc::clone(&entry.plan);
        }

        self.misses += 1;
        let plan = FftPlanner::<f32>::new().plan_fft(len, direction);
        tracing::debug!(len, ?direction, "Planned temporal FFT");

        if self.entries.len() >= self.capacity {
            if let Some(lru) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
            {
                let evicted = self.entries.swap_remove(lru);
                tracing::debug!(
                    len = evicted.len,
                    direction = ?evicted.direction,
                    "Evicted FFT plan"
                );
            }
        }

        self.entries.push(CachedPlan {
            len,
            direction,
            plan: Arc::clone(&plan),
            last_used: tick,
        });
        plan
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn contains(&self, len: usize, direction: FftDirection) -> bool {
        self.entries
            .iter()
            .any(|e| e.len == len && e.direction == direction)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_CAPACITY)
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<(usize, FftDirection)> =
            self.entries.iter().map(|e| (e.len, e.direction)).collect();
        f.debug_struct("PlanCache")
            .field("capacity", &self.capacity)
            .field("entries", &keys)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
