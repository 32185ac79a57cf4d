//! Bounded least-recently-used container with an eviction hook.

use lru::LruCache;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Why an entry left a [`BoundedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// Pushed out by a newer entry when the cache was full.
    Capacity,
    /// Removed explicitly by key or by predicate.
    Removed,
    /// Dropped by [`BoundedCache::clear`].
    Cleared,
    /// Overwritten by a new value under the same key.
    Replaced,
}

type EvictionHook<K, V> = Box<dyn Fn(&K, &V, Eviction) + Send + Sync>;

/// A fixed-capacity map that evicts the least recently used entry.
///
/// Every entry that leaves the cache, for any reason, is first shown to the
/// eviction hook and then dropped. Values that own engine resources release
/// them in `Drop`, so removal from the cache is what ends their life unless
/// another owner still holds them.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    on_evict: Option<EvictionHook<K, V>>,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            on_evict: None,
        }
    }

    /// Installs the hook called for every entry leaving the cache.
    #[must_use]
    pub fn with_eviction_hook(
        mut self,
        hook: impl Fn(&K, &V, Eviction) + Send + Sync + 'static,
    ) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    fn evicted(&self, key: &K, value: &V, cause: Eviction) {
        if let Some(hook) = &self.on_evict {
            hook(key, value, cause);
        }
    }

    /// Returns the value for `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Returns the value for `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Returns true if `key` is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub fn put(&mut self, key: K, value: V) {
        let replacing = self.entries.contains(&key);
        if let Some((old_key, old_value)) = self.entries.push(key, value) {
            let cause = if replacing {
                Eviction::Replaced
            } else {
                Eviction::Capacity
            };
            self.evicted(&old_key, &old_value, cause);
        }
    }

    /// Removes and returns the value for `key`.
    ///
    /// The hook sees the entry before it is handed back.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (old_key, old_value) = self.entries.pop_entry(key)?;
        self.evicted(&old_key, &old_value, Eviction::Removed);
        Some(old_value)
    }

    /// Removes every entry for which `keep` returns false.
    ///
    /// Returns the number of entries removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> usize
    where
        K: Clone,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|&(k, v)| !keep(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Removes every entry, least recently used first.
    pub fn clear(&mut self) {
        while let Some((key, value)) = self.entries.pop_lru() {
            self.evicted(&key, &value, Eviction::Cleared);
        }
    }

    /// Returns the keys, most recently used first.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

impl<K: Hash + Eq, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
