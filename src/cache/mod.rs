//! Bounded in-memory caching.
//!
//! [`BoundedCache`] is a fixed-capacity key/value map that evicts the
//! oldest inserted entry first. Instances are constructed by the host and
//! injected into the components that use them; there is no global cache.
//!
//! The scan engine uses it as a [`DigestCache`], keyed on path, size and
//! modification time, so rescanning an unchanged tree in the same process
//! skips re-reading file contents.
//!
//! # Example
//!
//! ```
//! use quickpurge::cache::BoundedCache;
//!
//! let cache = BoundedCache::new(2);
//! assert_eq!(cache.get_or_compute("a", || 1), 1);
//! assert_eq!(cache.get_or_compute("a", || 99), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Fixed-capacity cache with oldest-inserted-first eviction.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// `compute` runs without the lock held, so a slow computation does not
    /// block other readers. Two racing misses for one key both compute; the
    /// first stored value wins.
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.lock().entries.get(&key) {
            return value.clone();
        }

        let value = compute();

        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get(&key) {
            return existing.clone();
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, value.clone());
        value
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic inside `compute` never happens under the lock, so a poisoned
    // mutex still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identity of a file's contents as far as the digest cache is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DigestKey {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Digest cache shared with the scan engine. `None` values record files that
/// could not be hashed.
pub type DigestCache = BoundedCache<DigestKey, Option<String>>;
