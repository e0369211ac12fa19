//! Discoverable, launchable actions on a tracking platform's event bus.
//! Queued launches run on a worker pool and are tracked as jobs.

pub mod action;
pub mod actions;
pub mod config;
pub mod error;
pub mod job;
pub mod replay;
pub mod session;
pub mod worker;
