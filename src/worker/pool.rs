//! Fixed-size pool of workers sharing one task queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::queue::TaskQueue;
use super::task::Task;
use super::worker::{ActionWorker, StateCell, WorkerState};
use crate::config::HandlerConfig;

/// Outcome of [`WorkerPool::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Tasks still queued when the workers exited. Never started.
    pub unprocessed: Vec<Task>,
}

/// Pool of long-lived workers. Size is fixed at construction.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    stop: Arc<AtomicBool>,
    states: Vec<StateCell>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers (at least one) on the current runtime.
    pub fn new(config: &HandlerConfig) -> Self {
        Self::with_queue(config, Arc::new(TaskQueue::new()))
    }

    /// Spawn workers over an existing queue.
    pub fn with_queue(config: &HandlerConfig, queue: Arc<TaskQueue>) -> Self {
        let size = config.worker_count.max(1);
        let stop = Arc::new(AtomicBool::new(false));

        let mut states = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let worker = ActionWorker::new(
                id,
                Arc::clone(&queue),
                Arc::clone(&stop),
                config.poll_interval,
            );
            states.push(worker.state());
            handles.push(tokio::spawn(worker.run()));
        }

        info!(
            workers = size,
            poll_ms = config.poll_interval.as_millis() as u64,
            "Worker pool started"
        );

        Self {
            queue,
            stop,
            states,
            handles: Mutex::new(handles),
            poll_interval: config.poll_interval,
        }
    }

    /// Enqueue a task. Always accepted; tasks submitted after `stop()` stay
    /// queued and are returned by `shutdown()`.
    pub async fn submit(&self, task: Task) {
        if self.is_stopped() {
            warn!(task_id = %task.id, job_id = ?task.job_id, "Task submitted to stopped pool");
        }
        self.queue.put(task).await;
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Current state of every worker, by worker id.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states.iter().map(StateCell::get).collect()
    }

    /// Number of tasks waiting to be picked up.
    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }

    /// Wait until every submitted task has run and its callback returned.
    pub async fn wait_idle(&self) {
        self.queue.join().await;
    }

    /// Ask workers to exit at their next poll boundary. In-flight tasks finish;
    /// their workers report `Stopping` until then.
    pub fn stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("Worker pool stopping");
        }
        for state in &self.states {
            state.begin_stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Stop the pool, wait for all workers to exit, and hand back the tasks
    /// that were never started.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.stop();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker exited abnormally");
            }
        }

        let unprocessed = self.queue.drain().await;
        if !unprocessed.is_empty() {
            warn!(count = unprocessed.len(), "Worker pool shut down with queued tasks");
        }
        info!("Worker pool stopped");

        ShutdownReport { unprocessed }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
