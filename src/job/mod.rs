//! Job tracking for background launches.
//!
//! - `state`: job status machine (running → done | failed) and record
//! - `manager`: create / complete jobs through a session, committing each change

pub mod manager;
pub mod state;

pub use manager::{COMPONENT_KIND, JobManager};
pub use state::{JOB_KIND, Job, JobStatus};
