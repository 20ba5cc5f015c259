//! # classcast-worker
//!
//! Cron-driven maintenance for Classcast: the staleness sweep, the
//! active-count reconcile, and the audit retention purge. Jobs run
//! in-process against the session registry; there is no job queue.

pub mod scheduler;

pub use scheduler::CronScheduler;
