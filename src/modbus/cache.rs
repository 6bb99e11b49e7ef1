use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cache key: (unit, parameter address, parameter count).
pub type ParKey = (u8, u16, u16);

/// TTL-bounded memoization for parameter reads.
///
/// Entries expire by elapsed time only; keys that stop being queried stay in
/// memory, which is acceptable for the small fixed set of ranges the trend
/// logger touches. A zero TTL disables caching entirely.
pub struct ParCache {
    ttl: Duration,
    entries: HashMap<ParKey, (Vec<f32>, Instant)>,
}

impl ParCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn lookup(&self, key: &ParKey) -> Option<Vec<f32>> {
        self.lookup_at(key, Instant::now())
    }

    pub fn store(&mut self, key: ParKey, values: Vec<f32>) {
        self.store_at(key, values, Instant::now());
    }

    fn lookup_at(&self, key: &ParKey, now: Instant) -> Option<Vec<f32>> {
        if !self.enabled() {
            return None;
        }
        let (values, fetched) = self.entries.get(key)?;
        if now.duration_since(*fetched) > self.ttl {
            debug!("🕐 Cache entry {:?} expired", key);
            return None;
        }
        Some(values.clone())
    }

    fn store_at(&mut self, key: ParKey, values: Vec<f32>, now: Instant) {
        if self.enabled() {
            self.entries.insert(key, (values, now));
        }
    }
}
