//! Cooperative run queue.
//!
//! Every asynchronous step of the engine (observer delivery, transport
//! completion, waiter wake-up) is a task on a [`Scheduler`]. Nothing runs
//! until the owner drives the queue with [`Scheduler::tick`] or
//! [`Scheduler::run_until_idle`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

type Task = Box<dyn FnOnce() + Send>;

/// A shared FIFO of tasks. Clones share the same queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task. It runs on a later tick, never inside this call.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.lock().push_back(Box::new(task));
    }

    /// Runs one task. Returns false if the queue was empty.
    pub fn tick(&self) -> bool {
        // The guard is dropped before the task runs.
        let next = self.queue.lock().pop_front();
        match next {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including ones scheduled meanwhile, until none remain.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.tick() {
            ran += 1;
        }
        ran
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
