//! Task queue: unbounded FIFO shared by all workers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use super::task::Task;

/// Unbounded FIFO of tasks.
///
/// Tracks outstanding work (queued or executing) so callers can wait until
/// everything put on the queue has been handled.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    available: Notify,
    /// Tasks put but not yet marked done.
    outstanding: AtomicUsize,
    idle: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Never blocks on capacity.
    pub async fn put(&self, task: Task) {
        debug!(task_id = %task.id, job_id = ?task.job_id, "Task queued");
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().await.push_back(task);
        self.available.notify_one();
    }

    /// Put a task back at the head. Used when a worker is stopped while
    /// holding a task it has not started.
    pub(crate) async fn put_front(&self, task: Task) {
        self.tasks.lock().await.push_front(task);
        self.available.notify_one();
    }

    /// Take the oldest task, waiting up to `timeout` for one to arrive.
    pub async fn get(&self, timeout: Duration) -> Option<Task> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(task) = self.tasks.lock().await.pop_front() {
                return Some(task);
            }
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    /// Take the oldest task without waiting.
    pub async fn try_get(&self) -> Option<Task> {
        self.tasks.lock().await.pop_front()
    }

    /// Mark a task taken with `get` as fully handled.
    pub fn task_done(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        if previous <= 1 {
            self.idle.notify_waiters();
        }
    }

    /// Remove every queued task, in FIFO order.
    pub async fn drain(&self) -> Vec<Task> {
        let drained: Vec<Task> = self.tasks.lock().await.drain(..).collect();
        if !drained.is_empty() {
            let previous = self.outstanding.fetch_sub(drained.len(), Ordering::SeqCst);
            if previous <= drained.len() {
                self.idle.notify_waiters();
            }
        }
        drained
    }

    /// Number of queued (not yet taken) tasks.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Tasks queued or still executing.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Wait until every task put on the queue has been marked done or drained.
    pub async fn join(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}
