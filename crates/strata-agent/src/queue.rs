//! Per-pool pending-task queue.
//!
//! A FIFO of [`TaskRequest`] guarded by a mutex, with [`Notify`] wakeups
//! replacing the classic condition variable. Non-push pools pop the head;
//! the push pools remove the element their scheduler selects.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use strata_core::protocol::TaskRequest;

/// Ordered queue of pending task requests for one pool.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<TaskRequest>>,
    notify: Notify,
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task and wakes one waiting worker.
    pub fn enqueue(&self, task: TaskRequest) {
        self.lock().push_back(task);
        self.notify.notify_one();
    }

    /// Removes and returns the head task, waiting while the queue is
    /// empty.
    pub async fn pop(&self) -> TaskRequest {
        loop {
            let notified = self.notify.notified();
            if let Some(task) = self.lock().pop_front() {
                return task;
            }
            notified.await;
        }
    }

    /// Waits for the queue to be non-empty, then removes the element the
    /// selector picks.
    ///
    /// The selector runs under the queue lock and may consult shared
    /// accounting (the registry lock nests inside the queue lock). When it
    /// returns `None` — a high-lane worker finding no high-priority task —
    /// another waiter is woken so a normal-lane worker can take the head,
    /// and `None` is returned to the caller.
    pub async fn pop_selected<F>(&self, select: F) -> Option<TaskRequest>
    where
        F: Fn(&VecDeque<TaskRequest>) -> Option<usize>,
    {
        loop {
            let notified = self.notify.notified();
            {
                let mut tasks = self.lock();
                if !tasks.is_empty() {
                    return match select(&tasks) {
                        Some(index) => tasks.remove(index),
                        None => {
                            drop(tasks);
                            self.notify.notify_one();
                            None
                        }
                    };
                }
            }
            notified.await;
        }
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskRequest>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
