//! Bounded cache with TTL and max-size eviction
//!
//! Holds the watcher's found receipts so that a repeated wait for an identity
//! that already resolved returns without querying the destination domain.
//! Entries expire after the TTL; when full, the oldest insertion is evicted.
//!
//! Each entry costs roughly its key and value plus 24 bytes of bookkeeping, so
//! the default 10,000 found receipts stay around 1.5 MB.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_SIZE: usize = 10_000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400; // 24 hours

#[derive(Debug)]
pub struct BoundedCache<K, V> {
    map: HashMap<K, Entry<V>>,
    max_size: usize,
    ttl: Duration,
    /// Insertion counter; orders entries whose timestamps tie
    seq: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted: Instant,
    seq: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            max_size: max_size.max(1),
            ttl,
            seq: 0,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map
            .get(key)
            .filter(|e| e.inserted.elapsed() < self.ttl)
            .map(|e| &e.value)
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.map.retain(|_, e| now.duration_since(e.inserted) < ttl);
        if !self.map.contains_key(&key) {
            while self.map.len() >= self.max_size {
                let oldest = self
                    .map
                    .iter()
                    .min_by_key(|(_, e)| e.seq)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        self.map.remove(&k);
                    }
                    None => break,
                }
            }
        }
        self.seq += 1;
        self.map.insert(
            key,
            Entry {
                value,
                inserted: now,
                seq: self.seq,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
