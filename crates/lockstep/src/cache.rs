//! Live in-memory mirror of the schedule collection.
//!
//! Bootstrap order matters: the feed subscription is taken and its position
//! confirmed *before* the full scan, so every mutation after the scan is
//! guaranteed to arrive on the feed. Buffered events replay in collection
//! order on top of the snapshot, which converges to the live state.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lockstep_store::{ChangeEvent, ChangeFeed, ScheduleRecord, ScheduleStore};
use tokio::sync::broadcast::error::RecvError;

use crate::SchedulerError;

/// Continuously-synchronized view of all persisted schedules.
pub struct ScheduleCache {
    records: Arc<DashMap<String, ScheduleRecord>>,
    stop_tx: watch::Sender<bool>,
    apply_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleCache {
    /// Bootstrap the cache and start applying live changes.
    ///
    /// Resolves only once the feed has confirmed its position and the
    /// snapshot is loaded; from that point the view is complete and stays
    /// current.
    pub async fn start(store: Arc<dyn ScheduleStore>) -> Result<Self, SchedulerError> {
        let mut feed = store.watch().await?;
        feed.positioned().await?;

        let records: Arc<DashMap<String, ScheduleRecord>> = Arc::new(DashMap::new());
        for record in store.scan().await? {
            records.insert(record.id.clone(), record);
        }
        debug!(count = records.len(), "schedule cache bootstrapped");

        let (stop_tx, stop_rx) = watch::channel(false);
        let apply_handle = tokio::spawn(apply_changes(
            feed,
            Arc::clone(&records),
            Arc::clone(&store),
            stop_rx,
        ));

        Ok(Self {
            records,
            stop_tx,
            apply_handle: Mutex::new(Some(apply_handle)),
        })
    }

    /// Snapshot of all cached schedules.
    pub fn records(&self) -> Vec<ScheduleRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Look up a schedule by id.
    pub fn get(&self, id: &str) -> Option<ScheduleRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Number of cached schedules.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache holds no schedules.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Unsubscribe from the change feed and wait for the apply task to exit.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.apply_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

/// Apply change feed events to the cache until stopped.
async fn apply_changes(
    mut feed: ChangeFeed,
    records: Arc<DashMap<String, ScheduleRecord>>,
    store: Arc<dyn ScheduleStore>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                // A dropped sender can never signal a stop; treat it as one.
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("schedule cache sync stopped");
                    break;
                }
            }
            event = feed.recv() => match event {
                Ok(ChangeEvent::Inserted(record)) | Ok(ChangeEvent::Updated(record)) => {
                    records.insert(record.id.clone(), record);
                }
                Ok(ChangeEvent::Deleted(id)) => {
                    records.remove(&id);
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed events can hide deletes; rebuild from a fresh
                    // scan and let the remaining buffered events replay on
                    // top of it.
                    warn!(skipped, "change feed lagged, rescanning");
                    match store.scan().await {
                        Ok(snapshot) => {
                            records.clear();
                            for record in snapshot {
                                records.insert(record.id.clone(), record);
                            }
                        }
                        Err(error) => {
                            warn!(error = %error, "rescan after lag failed");
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("change feed closed");
                    break;
                }
            }
        }
    }
}
