//! Worker system: background execution of queued launches.
//!
//! Core components:
//! - `task`: unit of work: callable, args, isolated session, completion callback
//! - `queue`: unbounded FIFO shared by all workers
//! - `worker`: polling loop (Idle → Busy → Idle, stop flag checked per poll)
//! - `pool`: fixed set of workers, cooperative shutdown

pub mod pool;
pub mod queue;
pub mod task;
pub mod worker;

pub use pool::{ShutdownReport, WorkerPool};
pub use queue::TaskQueue;
pub use task::{Task, TaskCallback, TaskWork};
pub use worker::{ActionWorker, WorkerState};
