//! Read/write lock strategies
//!
//! A common read/write-lock contract with interchangeable backing
//! strategies. Every thread-safe collection owns one strategy instance,
//! selected at construction via [`LockStrategy`]. All strategies run the
//! caller's closure inside the locked section; a closure returning
//! `Result` propagates its error through the generic helpers unchanged.
//!
//! Lock-primitive failure (a poisoned `std::sync` lock) is a programming
//! error, not a recoverable condition — it panics with the lock's label.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, LockResult, Mutex, RwLock};

/// Core contract for a read/write lock strategy
///
/// `read_locked` sections may run concurrently with each other;
/// `write_locked` sections are exclusive against both readers and other
/// writers. Both block the calling thread until the section completes.
pub trait RwStrategy: Send + Sync {
    /// Run `body` while holding the lock for shared (read) access
    fn read_locked(&self, body: &mut dyn FnMut());

    /// Run `body` while holding the lock for exclusive (write) access
    fn write_locked(&self, body: &mut dyn FnMut());
}

impl dyn RwStrategy {
    /// Run a read section and return its value
    pub fn read<R>(&self, body: impl FnOnce() -> R) -> R {
        run_once(body, |f| self.read_locked(f))
    }

    /// Run a write section and return its value
    pub fn write<R>(&self, body: impl FnOnce() -> R) -> R {
        run_once(body, |f| self.write_locked(f))
    }
}

/// Adapt a value-returning `FnOnce` to the object-safe `FnMut` contract
fn run_once<R>(body: impl FnOnce() -> R, section: impl FnOnce(&mut dyn FnMut())) -> R {
    let mut body = Some(body);
    let mut out = None;
    let mut thunk = || {
        let body = body.take().expect("lock strategy ran its body twice");
        out = Some(body());
    };
    section(&mut thunk);
    out.expect("lock strategy never ran its body")
}

/// Unwrap a `std::sync` lock result, treating poisoning as fatal
fn must<T>(result: LockResult<T>, label: &str) -> T {
    match result {
        Ok(value) => value,
        Err(_) => panic!("{label}: lock poisoned by a panicking holder"),
    }
}

/// Selects the backing strategy for a lock
///
/// Serializable so a strategy can be picked from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockStrategy {
    /// Concurrent readers, barrier-style exclusive writers (default)
    #[default]
    BarrierQueue,
    /// The operating system's reader/writer lock
    OsRwLock,
    /// Manually counted readers excluded by a binary semaphore
    Semaphore,
    /// One exclusive mutex for reads and writes — no read concurrency
    SingleMutex,
    /// No locking at all. Exists so the concurrency tests can prove they
    /// fail without real locking; never use it on shared collections.
    NoOpUnsafe,
}

impl LockStrategy {
    /// Resolve this strategy to a lock instance
    ///
    /// The label shows up in panic messages when a lock is poisoned.
    pub fn build(self, label: &str) -> Arc<dyn RwStrategy> {
        let full = format!("{label}.{self:?}");
        match self {
            LockStrategy::BarrierQueue => Arc::new(BarrierRwLock::new(full)),
            LockStrategy::OsRwLock => Arc::new(OsRwLock::new(full)),
            LockStrategy::Semaphore => Arc::new(SemaphoreRwLock::new(full)),
            LockStrategy::SingleMutex => Arc::new(SingleMutexLock::default()),
            LockStrategy::NoOpUnsafe => Arc::new(NoOpLock),
        }
    }

    /// The fastest strategy for call sites that don't need reader
    /// concurrency: a single uncontended-fast mutex
    pub fn performant_lock() -> Arc<dyn RwStrategy> {
        Arc::new(SingleMutexLock::default())
    }
}

// ─── Barrier queue ───────────────────────────────────────────────

#[derive(Default)]
struct BarrierState {
    active_readers: usize,
    writer_active: bool,
    waiting_writers: usize,
}

/// Readers run concurrently; a writer acts as a barrier — it waits for
/// active readers to drain, runs exclusively, and bars new readers while
/// it is waiting or active. The writer's caller blocks until the write
/// section completes, so external semantics stay deterministic.
pub struct BarrierRwLock {
    label: String,
    state: Mutex<BarrierState>,
    readers_turn: Condvar,
    writers_turn: Condvar,
}

impl BarrierRwLock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(BarrierState::default()),
            readers_turn: Condvar::new(),
            writers_turn: Condvar::new(),
        }
    }
}

impl RwStrategy for BarrierRwLock {
    fn read_locked(&self, body: &mut dyn FnMut()) {
        let mut state = must(self.state.lock(), &self.label);
        while state.writer_active || state.waiting_writers > 0 {
            state = must(self.readers_turn.wait(state), &self.label);
        }
        state.active_readers += 1;
        drop(state);

        body();

        let mut state = must(self.state.lock(), &self.label);
        state.active_readers -= 1;
        if state.active_readers == 0 {
            self.writers_turn.notify_one();
        }
    }

    fn write_locked(&self, body: &mut dyn FnMut()) {
        let mut state = must(self.state.lock(), &self.label);
        state.waiting_writers += 1;
        while state.writer_active || state.active_readers > 0 {
            state = must(self.writers_turn.wait(state), &self.label);
        }
        state.waiting_writers -= 1;
        state.writer_active = true;
        drop(state);

        body();

        let mut state = must(self.state.lock(), &self.label);
        state.writer_active = false;
        if state.waiting_writers > 0 {
            self.writers_turn.notify_one();
        } else {
            self.readers_turn.notify_all();
        }
    }
}

// ─── OS reader/writer lock ───────────────────────────────────────

/// Direct wrapping of the platform rwlock. Poisoning means a holder
/// panicked mid-section; continuing from that state is unsafe, so
/// acquisition failure is fatal.
pub struct OsRwLock {
    label: String,
    inner: RwLock<()>,
}

impl OsRwLock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inner: RwLock::new(()),
        }
    }
}

impl RwStrategy for OsRwLock {
    fn read_locked(&self, body: &mut dyn FnMut()) {
        let _guard = must(self.inner.read(), &self.label);
        body();
    }

    fn write_locked(&self, body: &mut dyn FnMut()) {
        let _guard = must(self.inner.write(), &self.label);
        body();
    }
}

// ─── Semaphore scheme ────────────────────────────────────────────

/// Binary semaphore built from a mutex and a condvar
struct BinarySemaphore {
    available: Mutex<bool>,
    turn: Condvar,
}

impl BinarySemaphore {
    fn new() -> Self {
        Self {
            available: Mutex::new(true),
            turn: Condvar::new(),
        }
    }

    fn acquire(&self, label: &str) {
        let mut available = must(self.available.lock(), label);
        while !*available {
            available = must(self.turn.wait(available), label);
        }
        *available = false;
    }

    fn release(&self, label: &str) {
        *must(self.available.lock(), label) = true;
        self.turn.notify_one();
    }
}

/// Manually counted multiple-readers/single-writer scheme: a mutex guards
/// the reader count, and a binary semaphore excludes writers from the
/// moment the first reader arrives until the last reader leaves.
pub struct SemaphoreRwLock {
    label: String,
    reader_count: Mutex<usize>,
    busy: BinarySemaphore,
}

impl SemaphoreRwLock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reader_count: Mutex::new(0),
            busy: BinarySemaphore::new(),
        }
    }

    fn begin_read(&self) {
        let first_reader_in = {
            let mut count = must(self.reader_count.lock(), &self.label);
            *count += 1;
            *count == 1
        };
        if first_reader_in {
            self.busy.acquire(&self.label);
        }
    }

    fn end_read(&self) {
        let last_reader_out = {
            let mut count = must(self.reader_count.lock(), &self.label);
            *count -= 1;
            *count == 0
        };
        if last_reader_out {
            self.busy.release(&self.label);
        }
    }
}

impl RwStrategy for SemaphoreRwLock {
    fn read_locked(&self, body: &mut dyn FnMut()) {
        self.begin_read();
        body();
        self.end_read();
    }

    fn write_locked(&self, body: &mut dyn FnMut()) {
        self.busy.acquire(&self.label);
        body();
        self.busy.release(&self.label);
    }
}

// ─── Single mutex ────────────────────────────────────────────────

/// Reads and writes share one exclusive mutex — the safest strategy, not
/// the fastest under read-heavy load. `parking_lot` mutexes cannot poison,
/// so this path has no fatal branch.
#[derive(Default)]
pub struct SingleMutexLock {
    inner: parking_lot::Mutex<()>,
}

impl RwStrategy for SingleMutexLock {
    fn read_locked(&self, body: &mut dyn FnMut()) {
        let _guard = self.inner.lock();
        body();
    }

    fn write_locked(&self, body: &mut dyn FnMut()) {
        let _guard = self.inner.lock();
        body();
    }
}

// ─── No-op (negative control) ────────────────────────────────────

/// A lock that doesn't lock at all
///
/// Any test claiming to verify thread-safety had better fail when run
/// with this strategy.
pub struct NoOpLock;

impl RwStrategy for NoOpLock {
    fn read_locked(&self, body: &mut dyn FnMut()) {
        body();
    }

    fn write_locked(&self, body: &mut dyn FnMut()) {
        body();
    }
}
