//! Admission primitives: token bucket and TTL-LRU cache.
//!
//! Every stateful filter keeps its per-subject state inside a
//! [`TtlCache`], so dropping an entry (capacity or expiry) is the only
//! cleanup path the filters need.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

/// Classic token bucket: `rate` tokens per second accumulate up to
/// `burst`, refill computed lazily on access.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket that starts full.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available. An infinite rate always admits;
    /// a zero rate admits only the initial burst.
    pub fn allow(&self) -> bool {
        if self.rate.is_infinite() {
            return true;
        }
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded map with LRU eviction and a fixed per-entry TTL measured
/// from insertion. Recency is updated on every hit and every insert;
/// expired entries are dropped on lookup.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Look up a live entry, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                inner.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace, restarting the entry's TTL.
    pub fn add(&self, key: K, value: V) {
        self.inner.lock().put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &K) {
        self.inner.lock().pop(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
