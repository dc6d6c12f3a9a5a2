//! Crash-tolerant distributed job scheduler.
//!
//! Any number of processes share one schedule store; each runs its own
//! `Scheduler`. The scheduler guarantees at most one active execution per job
//! id at any instant:
//!
//! - **Cache**: live in-memory mirror of the schedule collection, bootstrapped
//!   from a full scan and kept current by the store's change feed
//! - **Claimer**: a single atomic conditional update per attempt, with a
//!   fencing check and a stale-heartbeat fallback that reclaims crashed
//!   holders
//! - **Runner**: executes claimed jobs, emits heartbeats, records terminal
//!   status, isolates failures
//! - **Ticker**: 100ms scan of the cache fanning out claim attempts for
//!   locally-registered, time-eligible schedules
//!
//! Lost claim races are normal no-ops, not errors. There is no exactly-once
//! guarantee and no cross-job ordering; the contract is per-job mutual
//! exclusion with crash-tolerant reclaiming.

mod cache;
mod claim;
mod config;
mod error;
mod registry;
mod runner;
mod scheduler;
mod ticker;

pub use cache::ScheduleCache;
pub use claim::Claimer;
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use registry::{JobFn, JobFuture, JobRegistry, derived_job_id};
pub use runner::{JobFailure, Runner};
pub use scheduler::{JobOptions, Scheduler};

pub use lockstep_store::{ScheduleRecord, ScheduleStatus, ScheduleStore};
