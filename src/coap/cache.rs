//! Bounded, time-limited exchange state.
//!
//! Backs message deduplication and block-wise transfers. Entries expire after
//! a fixed lifetime; when the map is full the oldest entry is evicted.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

struct Slot<V> {
    value: V,
    stored_at: Instant,
}

/// Concurrent map whose entries live for at most `lifetime`.
#[derive(Clone)]
pub struct ExpiringCache<K, V> {
    inner: Arc<DashMap<K, Slot<V>>>,
    lifetime: Duration,
    capacity: usize,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            lifetime,
            capacity: capacity.max(1),
        }
    }

    /// Live value for `key`. An expired entry is removed and reads as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let value = self.inner.get(key).and_then(|slot| {
            (now.duration_since(slot.stored_at) < self.lifetime).then(|| slot.value.clone())
        });
        if value.is_none() {
            self.inner.remove_if(key, |_, slot| now.duration_since(slot.stored_at) >= self.lifetime);
        }
        value
    }

    /// Store `value`, replacing any previous entry for `key`.
    pub fn insert(&self, key: K, value: V) {
        self.make_room();
        self.inner.insert(key, self.slot(value));
    }

    /// Store `value` unless a live entry exists; returns the live entry if so.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V> {
        self.make_room();
        let now = Instant::now();
        match self.inner.entry(key) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(occupied.get().stored_at) < self.lifetime {
                    Some(occupied.get().value.clone())
                } else {
                    occupied.insert(self.slot(value));
                    None
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.slot(value));
                None
            }
        }
    }

    /// Replace the value of an existing entry, keeping its original age.
    pub fn update(&self, key: &K, value: V) {
        if let Some(mut slot) = self.inner.get_mut(key) {
            slot.value = value;
        }
    }

    pub fn remove(&self, key: &K) {
        self.inner.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn slot(&self, value: V) -> Slot<V> {
        Slot {
            value,
            stored_at: Instant::now(),
        }
    }

    /// Must be called without holding any shard guard.
    fn make_room(&self) {
        if self.inner.len() < self.capacity {
            return;
        }
        let now = Instant::now();
        self.inner
            .retain(|_, slot| now.duration_since(slot.stored_at) < self.lifetime);

        while self.inner.len() >= self.capacity {
            let oldest = self
                .inner
                .iter()
                .min_by_key(|entry| entry.value().stored_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.inner.remove(&key);
                }
                None => break,
            }
        }
    }
}
