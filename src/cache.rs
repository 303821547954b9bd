//! Single-slot TTL cache, injected into request handlers.
//!
//! Advisory only: a cold start just rebuilds the response. Writes are
//! idempotent last-writer-wins, so a plain mutex around the slot is all
//! the coordination needed.

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<T> {
    at: Instant,
    value: T,
}

pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Option<Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some(e) if e.at.elapsed() < self.ttl => Some(e.value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(Entry {
            at: Instant::now(),
            value,
        });
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(), None::<u32>);
        cache.put(7u32);
        assert_eq!(cache.get(), Some(7));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(0));
        cache.put(7u32);
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn clear_drops_the_slot() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("x".to_string());
        cache.clear();
        assert_eq!(cache.get(), None);
    }
}
