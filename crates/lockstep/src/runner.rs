//! Executes claimed jobs.
//!
//! While a job runs, a heartbeat task refreshes `lastPing` so other processes
//! can tell a live holder from a crashed one. Job failures (including panics)
//! are isolated here; nothing escapes to the ticker.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use lockstep_store::{
    ScheduleFilter, ScheduleRecord, ScheduleStatus, ScheduleStore, ScheduleUpdate, now_ms,
};

use crate::registry::JobFn;

/// A job execution that failed.
#[derive(Debug, Clone)]
pub struct JobFailure {
    /// The schedule id.
    pub id: String,
    /// The job's error, or a description of its panic.
    pub error: String,
}

/// Runs claimed jobs and records their outcome.
///
/// Cheap to clone; clones share the running count and the failure channel.
#[derive(Clone)]
pub struct Runner {
    store: Arc<dyn ScheduleStore>,
    running: Arc<AtomicUsize>,
    failures_tx: broadcast::Sender<JobFailure>,
    heartbeat_period: Duration,
}

impl Runner {
    /// Create a runner.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        running: Arc<AtomicUsize>,
        failures_tx: broadcast::Sender<JobFailure>,
        heartbeat_period: Duration,
    ) -> Self {
        Self {
            store,
            running,
            failures_tx,
            heartbeat_period,
        }
    }

    /// Number of executions currently in flight in this process.
    pub fn running_jobs(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Execute a claimed schedule to completion.
    ///
    /// Infallible by design: job errors become `status = error` plus a
    /// failure event (or a log line when nobody subscribed), store write
    /// failures are logged, and the running count is balanced on every path.
    pub async fn run(&self, record: ScheduleRecord, job: JobFn) {
        self.running.fetch_add(1, Ordering::SeqCst);
        debug!(id = %record.id, title = %record.title, "job started");

        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.store),
            record.id.clone(),
            self.heartbeat_period,
        ));

        let outcome = match AssertUnwindSafe(job()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(describe_panic(panic)),
        };

        heartbeat.abort();

        // Interval schedules become re-eligible; pure one-shots are finished
        // for good. A failed execution stays claimable either way.
        let status = match &outcome {
            Err(_) => ScheduleStatus::Error,
            Ok(()) if record.interval.is_none() => ScheduleStatus::Done,
            Ok(()) => ScheduleStatus::Active,
        };
        let settle = ScheduleUpdate {
            status: Some(status),
            last_end: Some(now_ms()),
            ..Default::default()
        };
        if let Err(store_error) = self
            .store
            .find_and_update(ScheduleFilter::by_id(&record.id), settle)
            .await
        {
            warn!(id = %record.id, error = %store_error, "failed to record job outcome");
        }

        match outcome {
            Ok(()) => debug!(id = %record.id, status = ?status, "job settled"),
            Err(job_error) => {
                if self.failures_tx.receiver_count() > 0 {
                    let _ = self.failures_tx.send(JobFailure {
                        id: record.id.clone(),
                        error: job_error,
                    });
                } else {
                    error!(id = %record.id, error = %job_error, "job failed");
                }
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Refresh `lastPing` every period until aborted.
async fn heartbeat_loop(store: Arc<dyn ScheduleStore>, id: String, period: Duration) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The claim already stamped a fresh ping; skip the immediate first tick.
    ticks.tick().await;

    loop {
        ticks.tick().await;
        let ping = ScheduleUpdate {
            last_ping: Some(now_ms()),
            ..Default::default()
        };
        if let Err(error) = store
            .find_and_update(ScheduleFilter::by_id(&id), ping)
            .await
        {
            warn!(id = %id, error = %error, "heartbeat write failed");
        }
    }
}

fn describe_panic(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("job panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("job panicked: {message}")
    } else {
        "job panicked".to_string()
    }
}
