// Mon Oct 12 2026 - Alex

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// A rejected push. The task is handed back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError<T> {
    #[error("queue is closed")]
    Closed(T),
}

impl<T> QueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Closed(task) => task,
        }
    }
}

struct QueueState<T> {
    pending: VecDeque<T>,
    active_producers: usize,
    closed: bool,
}

/// Thread-safe channel between stages.
///
/// Besides the pending tasks the queue tracks how many producers are still
/// alive. `pop` only reports "no more tasks" (`None`) once the pending list is
/// empty and every registered producer has unregistered, which is what makes
/// fan-in (several producers on one queue) terminate correctly.
///
/// A closed queue rejects pushes and returns `None` from `pop` right away,
/// regardless of what is still pending.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Queue whose `push` blocks while `capacity` tasks are pending.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                active_producers: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn push(&self, task: T) -> Result<(), QueueError<T>> {
        let mut state = self.state.lock();

        if let Some(capacity) = self.capacity {
            while !state.closed && state.pending.len() >= capacity {
                self.not_full.wait(&mut state);
            }
        }

        if state.closed {
            return Err(QueueError::Closed(task));
        }

        state.pending.push_back(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until a task is available or the queue is done.
    ///
    /// Each concurrent caller claims at most one task, so several consumers
    /// sharing a queue never see the same task twice.
    pub fn pop(&self, consumer: &str) -> Option<T> {
        let mut state = self.state.lock();

        loop {
            if state.closed {
                log::trace!("{}: queue closed", consumer);
                return None;
            }

            if let Some(task) = state.pending.pop_front() {
                if self.capacity.is_some() {
                    self.not_full.notify_one();
                }
                return Some(task);
            }

            if state.active_producers == 0 {
                log::trace!("{}: no tasks and no active producers", consumer);
                return None;
            }

            log::trace!(
                "{}: no tasks, waiting on {} producer(s)",
                consumer,
                state.active_producers
            );
            self.not_empty.wait(&mut state);
        }
    }

    pub fn register_producer(&self) {
        let mut state = self.state.lock();
        state.active_producers += 1;
    }

    pub fn unregister_producer(&self) {
        let mut state = self.state.lock();

        if state.active_producers == 0 {
            log::warn!("unregister_producer called on a queue with no active producers");
            return;
        }

        state.active_producers -= 1;
        if state.active_producers == 0 {
            self.not_empty.notify_all();
        }
    }

    /// True once no producer is active. Pending tasks may still be queued.
    pub fn is_done(&self) -> bool {
        self.state.lock().active_producers == 0
    }

    pub fn active_producers(&self) -> usize {
        self.state.lock().active_producers
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TaskQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &state.pending.len())
            .field("active_producers", &state.active_producers)
            .field("closed", &state.closed)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Keeps one producer registered on a queue for as long as it lives.
pub struct ProducerGuard<T> {
    queue: Arc<TaskQueue<T>>,
}

impl<T> ProducerGuard<T> {
    pub fn new(queue: Arc<TaskQueue<T>>) -> Self {
        queue.register_producer();
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<TaskQueue<T>> {
        &self.queue
    }
}

impl<T> Drop for ProducerGuard<T> {
    fn drop(&mut self) {
        self.queue.unregister_producer();
    }
}

/// Type-erased handle used by the pipeline to abort every queue it touches,
/// whatever the task type.
pub trait QueueControl: Send + Sync {
    fn close(&self);
}

impl<T: Send> QueueControl for TaskQueue<T> {
    fn close(&self) {
        TaskQueue::close(self)
    }
}
