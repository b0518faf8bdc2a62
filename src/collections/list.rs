//! Thread-safe list

use crate::lock::{LockStrategy, RwStrategy};
use crate::queue::TaskQueue;
use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::sync::Arc;

/// A list guarded by a pluggable read/write lock
///
/// Caller-supplied predicates and `for_each` bodies run inside the locked
/// section and must not call back into the same list. Removal completions
/// run after the write lock is released — on the configured completion
/// queue when one is set, otherwise on the calling thread.
///
/// The `Sync` impl is justified by the locking discipline: every access to
/// the underlying storage goes through the lock. Constructing a list with
/// [`LockStrategy::NoOpUnsafe`] voids that justification; that strategy
/// exists only for the lock tests' negative control.
pub struct SafeList<T> {
    lock: Arc<dyn RwStrategy>,
    completion_queue: Option<Arc<TaskQueue>>,
    items: UnsafeCell<Vec<T>>,
}

// Safety: `items` is only touched inside the lock's read/write sections;
// writes are exclusive, reads are shared. Elements move out through
// `&self` (removal), hence `T: Send` on both impls.
unsafe impl<T: Send> Send for SafeList<T> {}
unsafe impl<T: Send + Sync> Sync for SafeList<T> {}

impl<T> Default for SafeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SafeList<T> {
    /// Create a list with the default lock strategy
    pub fn new() -> Self {
        Self::with_strategy(LockStrategy::default(), "safelist")
    }

    /// Create a list with an explicit lock strategy
    pub fn with_strategy(strategy: LockStrategy, label: &str) -> Self {
        Self {
            lock: strategy.build(label),
            completion_queue: None,
            items: UnsafeCell::new(Vec::new()),
        }
    }

    /// Schedule removal completions onto `queue` instead of running them
    /// on the calling thread
    pub fn with_completion_queue(mut self, queue: Arc<TaskQueue>) -> Self {
        self.completion_queue = Some(queue);
        self
    }

    fn read<R>(&self, body: impl FnOnce(&Vec<T>) -> R) -> R {
        // Safety: shared access under the read lock.
        self.lock.read(|| body(unsafe { &*self.items.get() }))
    }

    fn write<R>(&self, body: impl FnOnce(&mut Vec<T>) -> R) -> R {
        // Safety: exclusive access under the write lock.
        self.lock.write(|| body(unsafe { &mut *self.items.get() }))
    }

    fn complete(&self, job: impl FnOnce() + Send + 'static) {
        match &self.completion_queue {
            Some(queue) => {
                if let Err(error) = queue.enqueue(job) {
                    tracing::error!(%error, "Removal completion dropped");
                }
            }
            None => job(),
        }
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub fn count(&self) -> usize {
        self.read(|items| items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|items| items.is_empty())
    }

    pub fn index_where(&self, predicate: impl Fn(&T) -> bool) -> Option<usize> {
        self.read(|items| items.iter().position(|item| predicate(item)))
    }

    pub fn contains_where(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.read(|items| items.iter().any(|item| predicate(item)))
    }

    /// Visit every element under the read lock
    pub fn for_each(&self, mut body: impl FnMut(&T)) {
        self.read(|items| {
            for item in items {
                body(item);
            }
        })
    }

    pub fn map<U>(&self, transform: impl Fn(&T) -> U) -> Vec<U> {
        self.read(|items| items.iter().map(|item| transform(item)).collect())
    }

    pub fn filter_map<U>(&self, transform: impl Fn(&T) -> Option<U>) -> Vec<U> {
        self.read(|items| items.iter().filter_map(|item| transform(item)).collect())
    }

    // ─── Mutations ───────────────────────────────────────────────

    pub fn append(&self, element: T) {
        self.write(|items| items.push(element));
    }

    pub fn append_all(&self, elements: impl IntoIterator<Item = T>) {
        self.write(|items| items.extend(elements));
    }

    /// Insert at `index`; an out-of-range index appends instead
    pub fn insert_at(&self, element: T, index: usize) {
        self.write(|items| {
            let index = index.min(items.len());
            items.insert(index, element);
        });
    }

    /// Remove the first element matching `predicate`
    pub fn remove_where(&self, predicate: impl Fn(&T) -> bool) {
        self.write(|items| {
            if let Some(index) = items.iter().position(|item| predicate(item)) {
                items.remove(index);
            }
        });
    }

    pub fn remove_all(&self) {
        self.write(|items| items.clear());
    }
}

impl<T: Clone> SafeList<T> {
    pub fn first(&self) -> Option<T> {
        self.read(|items| items.first().cloned())
    }

    pub fn last(&self) -> Option<T> {
        self.read(|items| items.last().cloned())
    }

    pub fn first_where(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.read(|items| items.iter().find(|item| predicate(item)).cloned())
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.read(|items| items.iter().filter(|item| predicate(item)).cloned().collect())
    }

    pub fn sorted_by(&self, compare: impl FnMut(&T, &T) -> Ordering) -> Vec<T> {
        let mut copy = self.snapshot();
        copy.sort_by(compare);
        copy
    }

    /// Copy of the current contents, in order
    pub fn snapshot(&self) -> Vec<T> {
        self.read(|items| items.clone())
    }

    /// Safe indexed read: out-of-range returns `None`
    pub fn get(&self, index: usize) -> Option<T> {
        self.read(|items| items.get(index).cloned())
    }

    /// Safe indexed write: out-of-range is ignored
    pub fn set(&self, index: usize, value: T) {
        self.write(|items| {
            if let Some(slot) = items.get_mut(index) {
                *slot = value;
            }
        });
    }
}

impl<T: PartialEq> SafeList<T> {
    pub fn contains(&self, element: &T) -> bool {
        self.read(|items| items.contains(element))
    }
}

impl<T: Send + 'static> SafeList<T> {
    /// Remove at `index`, handing the removed element to `completion`
    /// after the lock is released. Out-of-range removes nothing and the
    /// completion never runs.
    pub fn remove_at(&self, index: usize, completion: impl FnOnce(T) + Send + 'static) {
        let removed = self.write(|items| {
            if index < items.len() {
                Some(items.remove(index))
            } else {
                None
            }
        });
        if let Some(element) = removed {
            self.complete(move || completion(element));
        }
    }

    /// Remove the first match, handing the removed element to `completion`
    /// after the lock is released
    pub fn remove_where_then(
        &self,
        predicate: impl Fn(&T) -> bool,
        completion: impl FnOnce(T) + Send + 'static,
    ) {
        let removed = self.write(|items| {
            items
                .iter()
                .position(|item| predicate(item))
                .map(|index| items.remove(index))
        });
        if let Some(element) = removed {
            self.complete(move || completion(element));
        }
    }

    /// Clear the list, handing the previous contents to `completion`
    /// after the lock is released
    pub fn remove_all_then(&self, completion: impl FnOnce(Vec<T>) + Send + 'static) {
        let drained = self.write(std::mem::take);
        self.complete(move || completion(drained));
    }
}
