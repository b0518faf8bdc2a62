//! Thread-safe map

use crate::lock::{LockStrategy, RwStrategy};
use std::borrow::Borrow;
use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A map guarded by a pluggable read/write lock
///
/// Absent keys return `None`; nothing here signals errors. The same
/// locking discipline and `Sync` caveats as [`SafeList`](super::SafeList)
/// apply.
pub struct SafeMap<K, V> {
    lock: Arc<dyn RwStrategy>,
    entries: UnsafeCell<HashMap<K, V>>,
}

// Safety: `entries` is only touched inside the lock's read/write
// sections; writes are exclusive, reads are shared.
unsafe impl<K: Send, V: Send> Send for SafeMap<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for SafeMap<K, V> {}

impl<K, V> Default for SafeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SafeMap<K, V> {
    /// Create a map with the default lock strategy
    pub fn new() -> Self {
        Self::with_strategy(LockStrategy::default(), "safemap")
    }

    /// Create a map with an explicit lock strategy
    pub fn with_strategy(strategy: LockStrategy, label: &str) -> Self {
        Self {
            lock: strategy.build(label),
            entries: UnsafeCell::new(HashMap::new()),
        }
    }

    fn read<R>(&self, body: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        // Safety: shared access under the read lock.
        self.lock.read(|| body(unsafe { &*self.entries.get() }))
    }

    fn write<R>(&self, body: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        // Safety: exclusive access under the write lock.
        self.lock.write(|| body(unsafe { &mut *self.entries.get() }))
    }

    pub fn count(&self) -> usize {
        self.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|entries| entries.is_empty())
    }
}

impl<K: Eq + Hash, V> SafeMap<K, V> {
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        self.read(|entries| entries.get(key).cloned())
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.read(|entries| entries.contains_key(key))
    }

    /// Set `key` to `value`, discarding any previous value
    pub fn insert(&self, key: K, value: V) {
        self.write(|entries| {
            entries.insert(key, value);
        });
    }

    /// Set `key` to `value`, returning the previous value
    pub fn update(&self, key: K, value: V) -> Option<V> {
        self.write(|entries| entries.insert(key, value))
    }

    /// Return the value under `key`, inserting `default()` first when the
    /// key is absent. One write section, so two racing callers cannot both
    /// insert.
    pub fn get_or_insert_with(&self, key: K, default: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        self.write(|entries| entries.entry(key).or_insert_with(default).clone())
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.write(|entries| entries.remove(key))
    }

    pub fn remove_all(&self) {
        self.write(|entries| entries.clear());
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.read(|entries| entries.keys().cloned().collect())
    }

    /// Visit every entry under the read lock
    pub fn for_each(&self, mut body: impl FnMut(&K, &V)) {
        self.read(|entries| {
            for (key, value) in entries {
                body(key, value);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_insert_get_remove() {
        let map = SafeMap::new();
        assert!(map.is_empty());
        assert_eq!(map.get("missing"), None);

        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);

        assert_eq!(map.count(), 2);
        assert_eq!(map.get("a"), Some(1));
        assert!(map.contains_key("b"));

        assert_eq!(map.remove("a"), Some(1));
        assert_eq!(map.remove("a"), None);
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn test_update_returns_previous_value() {
        let map = SafeMap::new();
        assert_eq!(map.update("k".to_string(), 1), None);
        assert_eq!(map.update("k".to_string(), 2), Some(1));
        assert_eq!(map.get("k"), Some(2));
    }

    #[test]
    fn test_get_or_insert_with() {
        let map: SafeMap<String, Vec<i32>> = SafeMap::new();

        let fresh = map.get_or_insert_with("k".to_string(), || vec![7]);
        assert_eq!(fresh, vec![7]);

        // Existing entry wins; the default is not re-evaluated.
        let existing = map.get_or_insert_with("k".to_string(), || vec![99]);
        assert_eq!(existing, vec![7]);
    }

    #[test]
    fn test_keys_and_for_each() {
        let map = SafeMap::new();
        map.insert("x".to_string(), 10);
        map.insert("y".to_string(), 20);

        let mut keys = map.keys();
        keys.sort();
        assert_eq!(keys, vec!["x".to_string(), "y".to_string()]);

        let mut total = 0;
        map.for_each(|_, value| total += value);
        assert_eq!(total, 30);

        map.remove_all();
        assert!(map.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_with_every_safe_strategy() {
        for strategy in [
            LockStrategy::BarrierQueue,
            LockStrategy::OsRwLock,
            LockStrategy::Semaphore,
            LockStrategy::SingleMutex,
        ] {
            let map = Arc::new(SafeMap::with_strategy(strategy, "test.concurrent"));
            let writers = 8;
            let inserts_per_writer = 100;

            let handles: Vec<_> = (0..writers)
                .map(|w| {
                    let map = map.clone();
                    thread::spawn(move || {
                        for i in 0..inserts_per_writer {
                            map.insert(format!("{w}:{i}"), i);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(
                map.count(),
                writers * inserts_per_writer,
                "{strategy:?} lost inserts"
            );
        }
    }
}
