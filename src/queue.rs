//! Serial task queues
//!
//! A [`TaskQueue`] is a named execution context: one worker thread
//! draining a channel of jobs in FIFO order. The bus uses them for its
//! background publish queue, its designated main queue, and per-subscriber
//! delivery queues; the collections can use one for removal completions.

use crate::error::{BusError, Result};
use crossbeam_channel::Sender;
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serial execution context backed by a dedicated worker thread
///
/// Jobs run in enqueue order. Dropping the queue closes the channel,
/// lets the worker drain what was already enqueued, and joins it.
pub struct TaskQueue {
    label: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl TaskQueue {
    /// Spawn a new queue with the given label (used as the thread name)
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let worker_label = label.clone();
        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                tracing::trace!(queue = %worker_label, "Worker started");
                for job in receiver {
                    job();
                }
                tracing::trace!(queue = %worker_label, "Worker stopped");
            })
            .unwrap_or_else(|e| panic!("{label}: failed to spawn queue worker: {e}"));
        let worker_id = worker.thread().id();

        Self {
            label,
            sender: Some(sender),
            worker: Some(worker),
            worker_id,
        }
    }

    /// The queue's label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Schedule a job onto the queue without waiting for it
    ///
    /// Fails only if the worker has terminated (a previous job panicked,
    /// unwinding the worker thread).
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(BusError::QueueTerminated(self.label.clone()));
        };
        sender
            .send(Box::new(job))
            .map_err(|_| BusError::QueueTerminated(self.label.clone()))
    }

    /// Whether the calling thread is this queue's worker thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            // A job holding the last Arc to its own queue would deadlock
            // joining itself; let that thread exit on its own.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
