//! Public scheduler API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info;

use lockstep_store::{ScheduleRecord, ScheduleSeed, ScheduleStore, now_ms};

use crate::cache::ScheduleCache;
use crate::claim::Claimer;
use crate::registry::{JobFuture, JobRegistry};
use crate::runner::{JobFailure, Runner};
use crate::ticker::Ticker;
use crate::{SchedulerConfig, SchedulerError};

/// Capacity of the job failure broadcast channel.
const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// How often `close` re-checks the running count.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Optional metadata for a job registration.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Human label; defaults to the job id.
    pub title: Option<String>,
    /// Earliest start instant, epoch milliseconds.
    pub time: Option<i64>,
    /// Re-run period for recurring jobs.
    pub interval: Option<Duration>,
}

/// A scheduler instance coordinating through a shared store.
///
/// Every process sharing the store runs one of these; together they guarantee
/// at most one active execution per job id.
pub struct Scheduler {
    store: Arc<dyn ScheduleStore>,
    cache: Arc<ScheduleCache>,
    registry: Arc<JobRegistry>,
    running: Arc<AtomicUsize>,
    failures_tx: broadcast::Sender<JobFailure>,
    shutdown_tx: watch::Sender<bool>,
    ticker_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Scheduler {
    /// Start a scheduler over `store`.
    ///
    /// Resolves once the schedule cache is live; the ticker begins claiming
    /// immediately after.
    pub async fn start(
        store: Arc<dyn ScheduleStore>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;

        let cache = Arc::new(ScheduleCache::start(Arc::clone(&store)).await?);
        let registry = Arc::new(JobRegistry::new());
        let running = Arc::new(AtomicUsize::new(0));
        let (failures_tx, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        let runner = Runner::new(
            Arc::clone(&store),
            Arc::clone(&running),
            failures_tx.clone(),
            config.heartbeat_period,
        );
        let claimer = Arc::new(Claimer::new(Arc::clone(&store), config.heartbeat_timeout));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = Ticker::new(
            Arc::clone(&cache),
            Arc::clone(&registry),
            claimer,
            runner,
            config.tick_interval,
        );
        let ticker_handle = ticker.spawn(shutdown_rx);

        info!("scheduler started");
        Ok(Self {
            store,
            cache,
            registry,
            running,
            failures_tx,
            shutdown_tx,
            ticker_handle: Mutex::new(Some(ticker_handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Register a job under an explicit stable id.
    ///
    /// Stores the executable locally and upserts the schedule metadata;
    /// claim state on an existing record is never disturbed, so re-registering
    /// (from this or any other process) converges silently. Returns the id.
    #[tracing::instrument(skip(self, job, options))]
    pub async fn add_job<F>(
        &self,
        id: &str,
        job: F,
        options: JobOptions,
    ) -> Result<String, SchedulerError>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Closed);
        }

        let id = id.to_string();
        self.registry.insert(id.clone(), Arc::new(job));

        let seed = ScheduleSeed {
            id: id.clone(),
            title: options.title.unwrap_or_else(|| id.clone()),
            time: options.time,
            interval: options
                .interval
                .map(|period| i64::try_from(period.as_millis()).unwrap_or(i64::MAX)),
            date_added: now_ms(),
        };
        self.store.upsert(seed).await?;

        info!(id = %id, "job registered");
        Ok(id)
    }

    /// Delete a job's persisted schedule and local registration.
    ///
    /// An execution already claimed under this id is not interrupted.
    /// Returns whether a persisted record existed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_job(&self, id: &str) -> Result<bool, SchedulerError> {
        self.registry.remove(id);
        let existed = self.store.delete(id).await?;
        info!(id = %id, existed, "job removed");
        Ok(existed)
    }

    /// Subscribe to job failures.
    ///
    /// While at least one subscriber is live, failures are delivered on the
    /// channel instead of the fallback error log.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<JobFailure> {
        self.failures_tx.subscribe()
    }

    /// Number of executions currently in flight in this process.
    pub fn running_jobs(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of every schedule visible in the cache.
    pub fn schedules(&self) -> Vec<ScheduleRecord> {
        self.cache.records()
    }

    /// Shut down: stop claiming, wait for in-flight executions, stop cache
    /// sync.
    ///
    /// Cooperative, not preemptive — running jobs are never aborted; this
    /// polls until the running count reaches zero. Idempotent.
    pub async fn close(&self) -> Result<(), SchedulerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.ticker_handle.lock().await.take() {
            let _ = handle.await;
        }

        while self.running.load(Ordering::SeqCst) > 0 {
            sleep(CLOSE_POLL_INTERVAL).await;
        }

        self.cache.stop().await;
        info!("scheduler closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_store::MemoryStore;

    #[tokio::test]
    async fn add_job_after_close_is_rejected() {
        let scheduler = Scheduler::start(Arc::new(MemoryStore::new()), SchedulerConfig::default())
            .await
            .unwrap();
        scheduler.close().await.unwrap();

        let result = scheduler
            .add_job("late", || Box::pin(async { Ok(()) }), JobOptions::default())
            .await;
        assert!(matches!(result, Err(SchedulerError::Closed)));
    }

    #[tokio::test]
    async fn oversized_interval_saturates_instead_of_wrapping() {
        let store = MemoryStore::new();
        let scheduler = Scheduler::start(Arc::new(store.clone()), SchedulerConfig::default())
            .await
            .unwrap();

        scheduler
            .add_job(
                "glacial",
                || Box::pin(async { Ok(()) }),
                JobOptions {
                    interval: Some(Duration::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // A wrapped-negative interval would make the record due on every tick.
        let record = store.scan().await.unwrap().remove(0);
        assert_eq!(record.interval, Some(i64::MAX));
        scheduler.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let scheduler = Scheduler::start(Arc::new(MemoryStore::new()), SchedulerConfig::default())
            .await
            .unwrap();
        scheduler.close().await.unwrap();
        scheduler.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_start() {
        let config = SchedulerConfig {
            heartbeat_timeout: Duration::from_millis(10),
            heartbeat_period: Duration::from_millis(10),
            ..Default::default()
        };
        let result = Scheduler::start(Arc::new(MemoryStore::new()), config).await;
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }
}
