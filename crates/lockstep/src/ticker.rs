//! Fixed-cadence eligibility scan.
//!
//! Each cycle filters the cache down to schedules this process can run right
//! now and fans out a claim+run attempt for every one of them concurrently.
//! The batch settles in full before the next cycle is scheduled; shutdown
//! stops the loop permanently.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use lockstep_store::now_ms;

use crate::cache::ScheduleCache;
use crate::claim::Claimer;
use crate::registry::JobRegistry;
use crate::runner::Runner;

/// The periodic claim loop.
pub struct Ticker {
    cache: Arc<ScheduleCache>,
    registry: Arc<JobRegistry>,
    claimer: Arc<Claimer>,
    runner: Runner,
    tick_interval: Duration,
}

impl Ticker {
    /// Create a ticker over the given components.
    pub fn new(
        cache: Arc<ScheduleCache>,
        registry: Arc<JobRegistry>,
        claimer: Arc<Claimer>,
        runner: Runner,
        tick_interval: Duration,
    ) -> Self {
        Self {
            cache,
            registry,
            claimer,
            runner,
            tick_interval,
        }
    }

    /// Spawn the tick loop; it exits when `shutdown_rx` turns true.
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown_rx))
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        debug!("ticker started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let now = now_ms();
            let batch: Vec<_> = self
                .cache
                .records()
                .into_iter()
                .filter(|record| record.due(now))
                .filter_map(|record| {
                    // Only locally-registered ids are claimable here; other
                    // processes race for the rest.
                    self.registry.get(&record.id).map(|job| (record, job))
                })
                .map(|(record, job)| {
                    let claimer = Arc::clone(&self.claimer);
                    let runner = self.runner.clone();
                    async move {
                        match claimer.try_claim(&record).await {
                            Ok(Some(claimed)) => runner.run(claimed, job).await,
                            Ok(None) => {} // lost the race, someone else runs it
                            Err(error) => {
                                warn!(id = %record.id, error = %error, "claim attempt failed");
                            }
                        }
                    }
                })
                .collect();

            // Unbounded fan-out; the cycle settles only when every attempt
            // in the batch has.
            join_all(batch).await;

            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // A dropped sender can never signal shutdown; treat it as one.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep(self.tick_interval) => {}
            }
        }

        debug!("ticker stopped");
    }
}
