//! Per-process job registry.
//!
//! Maps job ids to their executable functions. Schedules are visible to every
//! process through the cache, but only ids registered here are eligible for
//! local claiming.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Future returned by a job function.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// An executable job. Invoked once per claimed execution.
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Derive a stable job id from arbitrary content (sha256, hex).
///
/// Opt-in convenience for callers who want content-addressed ids; an explicit
/// id is always preferable since content hashes change with any
/// representation change.
pub fn derived_job_id(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut id = String::with_capacity(digest.len() * 2);
    for byte in digest {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// Thread-safe map from job id to executable.
pub struct JobRegistry {
    jobs: DashMap<String, JobFn>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Register a job function under `id`, replacing any previous one.
    pub fn insert(&self, id: impl Into<String>, job: JobFn) {
        self.jobs.insert(id.into(), job);
    }

    /// Remove a registration. Returns whether one existed.
    pub fn remove(&self, id: &str) -> bool {
        self.jobs.remove(id).is_some()
    }

    /// Look up the executable for `id`.
    pub fn get(&self, id: &str) -> Option<JobFn> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `id` is locally runnable.
    pub fn contains(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
