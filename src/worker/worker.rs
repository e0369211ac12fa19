//! A single background worker: poll, run one task, report, repeat.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::queue::TaskQueue;
use super::task::Task;
use crate::error::{Error, TaskError};

/// Observable state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Polling the queue.
    Idle = 0,
    /// Executing a task.
    Busy = 1,
    /// Stop requested. An in-flight task still runs to completion.
    Stopping = 2,
    /// Loop exited.
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Busy,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Shared, lock-free view of a worker's state.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new(state: WorkerState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `Stopping` unless the worker already exited.
    pub(super) fn begin_stop(&self) {
        let _ = self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
            (WorkerState::from_u8(raw) != WorkerState::Stopped)
                .then_some(WorkerState::Stopping as u8)
        });
    }
}

/// Worker that executes queued tasks one at a time until stopped.
pub struct ActionWorker {
    id: usize,
    queue: Arc<TaskQueue>,
    stop: Arc<AtomicBool>,
    state: StateCell,
    poll_interval: Duration,
}

impl ActionWorker {
    pub fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        stop: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            stop,
            state: StateCell::new(WorkerState::Idle),
            poll_interval,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Poll the queue until the stop flag is set.
    ///
    /// The flag is checked once per poll, so an idle worker exits within
    /// `poll_interval`; a busy one finishes its task first.
    pub async fn run(self) {
        info!(worker = self.id, "Worker started");

        while !self.stopped() {
            let Some(task) = self.queue.get(self.poll_interval).await else {
                continue;
            };

            if self.stopped() {
                debug!(
                    worker = self.id,
                    task_id = %task.id,
                    "Stopped before start, returning task"
                );
                self.state.begin_stop();
                self.queue.put_front(task).await;
                break;
            }

            self.state.set(WorkerState::Busy);
            self.run_task(task).await;
            if self.stopped() {
                self.state.begin_stop();
            } else {
                self.state.set(WorkerState::Idle);
            }
            self.queue.task_done();
        }

        self.state.begin_stop();
        info!(worker = self.id, "Worker stopping");
        self.state.set(WorkerState::Stopped);
    }

    /// Run one task and its callback. Errors and panics from either are
    /// logged here and never escape.
    async fn run_task(&self, task: Task) {
        let Task {
            id,
            job_id,
            action,
            args,
            session,
            work,
            callback,
        } = task;

        debug!(
            worker = self.id,
            task_id = %id,
            job_id = ?job_id,
            action = %action,
            "Running task"
        );

        let work_session = Arc::clone(&session);
        let work_args = args.clone();
        let outcome = match AssertUnwindSafe(async move { work(work_session, work_args).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(Error::Task(TaskError::Panicked {
                id,
                message: panic_message(panic.as_ref()),
            })),
        };

        if let Err(e) = &outcome {
            warn!(
                worker = self.id,
                task_id = %id,
                job_id = ?job_id,
                action = %action,
                error = %e,
                "Task failed"
            );
        }

        let callback_args = args.clone();
        match AssertUnwindSafe(async move { callback(session, outcome, callback_args).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {
                debug!(worker = self.id, task_id = %id, "Task finished");
            }
            Ok(Err(e)) => {
                error!(
                    worker = self.id,
                    task_id = %id,
                    job_id = ?job_id,
                    action = %action,
                    args = ?args,
                    error = %e,
                    "Task callback failed"
                );
            }
            Err(panic) => {
                error!(
                    worker = self.id,
                    task_id = %id,
                    job_id = ?job_id,
                    action = %action,
                    args = ?args,
                    panic = %panic_message(panic.as_ref()),
                    "Task callback panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
