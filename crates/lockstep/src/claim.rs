//! The atomic claim protocol.
//!
//! One conditional find-and-update per attempt is the entire mutual-exclusion
//! mechanism: no lock service, no leader election. Two branches can win the
//! claim:
//!
//! 1. the schedule is unclaimed (`active` or `error`) and its `lastStart`
//!    still equals the value this process observed — the fencing check that
//!    loses gracefully when another process got there first
//! 2. the schedule is `running` but its holder's heartbeat went stale — the
//!    crash-recovery path, available only after the heartbeat timeout
//!
//! A claim stamps `status = running` and fresh `lastStart`/`lastPing`, so the
//! record self-describes its holder's liveness from the first instant.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use lockstep_store::{
    FilterBranch, ScheduleFilter, ScheduleRecord, ScheduleStatus, ScheduleStore, ScheduleUpdate,
    now_ms,
};

use crate::SchedulerError;

/// Executes claim attempts against the store.
pub struct Claimer {
    store: Arc<dyn ScheduleStore>,
    heartbeat_timeout: Duration,
}

impl Claimer {
    /// Create a claimer with the given staleness threshold.
    pub fn new(store: Arc<dyn ScheduleStore>, heartbeat_timeout: Duration) -> Self {
        Self {
            store,
            heartbeat_timeout,
        }
    }

    /// Attempt to claim `record` for execution.
    ///
    /// Returns the claimed (post-update) record, or `None` when the race was
    /// lost — a normal outcome, not an error.
    pub async fn try_claim(
        &self,
        record: &ScheduleRecord,
    ) -> Result<Option<ScheduleRecord>, SchedulerError> {
        let now = now_ms();
        let stale_before = now - self.heartbeat_timeout.as_millis() as i64;

        let filter = ScheduleFilter {
            branches: vec![
                FilterBranch {
                    id: record.id.clone(),
                    status_in: Some(vec![ScheduleStatus::Active, ScheduleStatus::Error]),
                    last_start: Some(record.last_start),
                    ping_older_than: None,
                },
                FilterBranch {
                    id: record.id.clone(),
                    status_in: Some(vec![ScheduleStatus::Running]),
                    last_start: None,
                    ping_older_than: Some(stale_before),
                },
            ],
        };
        let update = ScheduleUpdate {
            status: Some(ScheduleStatus::Running),
            last_start: Some(now),
            last_ping: Some(now),
            last_end: None,
        };

        let claimed = self.store.find_and_update(filter, update).await?;
        if claimed.is_some() {
            debug!(id = %record.id, "claimed schedule");
        }
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_store::{MemoryStore, ScheduleSeed};
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(10);

    async fn active_record(store: &MemoryStore, id: &str) -> ScheduleRecord {
        store
            .upsert(ScheduleSeed {
                id: id.to_string(),
                title: id.to_string(),
                time: None,
                interval: None,
                date_added: now_ms(),
            })
            .await
            .unwrap()
    }

    async fn force(store: &MemoryStore, id: &str, update: ScheduleUpdate) -> ScheduleRecord {
        store
            .find_and_update(ScheduleFilter::by_id(id), update)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn claims_an_active_schedule() {
        let store = MemoryStore::new();
        let record = active_record(&store, "a").await;
        let claimer = Claimer::new(Arc::new(store), TIMEOUT);

        let claimed = claimer.try_claim(&record).await.unwrap().unwrap();
        assert_eq!(claimed.status, ScheduleStatus::Running);
        assert!(claimed.last_start.is_some());
        assert_eq!(claimed.last_ping, claimed.last_start);
    }

    #[tokio::test]
    async fn fencing_rejects_a_stale_observation() {
        let store = MemoryStore::new();
        let record = active_record(&store, "a").await;
        let claimer = Claimer::new(Arc::new(store.clone()), TIMEOUT);

        // Another process claims and settles first; lastStart moved on.
        claimer.try_claim(&record).await.unwrap().unwrap();
        force(
            &store,
            "a",
            ScheduleUpdate {
                status: Some(ScheduleStatus::Active),
                last_end: Some(now_ms()),
                ..Default::default()
            },
        )
        .await;

        // Our observation still carries the old lastStart.
        assert_eq!(claimer.try_claim(&record).await.unwrap(), None);

        // A fresh observation claims fine.
        let fresh = store.scan().await.unwrap().remove(0);
        assert!(claimer.try_claim(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn only_one_of_two_racing_claims_wins() {
        let store = MemoryStore::new();
        let record = active_record(&store, "a").await;
        let claimer = Claimer::new(Arc::new(store), TIMEOUT);

        let (first, second) = tokio::join!(claimer.try_claim(&record), claimer.try_claim(&record));
        let wins = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|outcome| outcome.is_some())
            .count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn running_with_live_heartbeat_is_not_claimable() {
        let store = MemoryStore::new();
        let record = active_record(&store, "a").await;
        let claimer = Claimer::new(Arc::new(store.clone()), TIMEOUT);

        claimer.try_claim(&record).await.unwrap().unwrap();
        let running = store.scan().await.unwrap().remove(0);
        assert_eq!(claimer.try_claim(&running).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_heartbeat_is_reclaimed() {
        let store = MemoryStore::new();
        let record = active_record(&store, "a").await;
        let claimer = Claimer::new(Arc::new(store.clone()), TIMEOUT);

        claimer.try_claim(&record).await.unwrap().unwrap();
        // Simulate a crashed holder: its last ping is past the timeout.
        let dead = force(
            &store,
            "a",
            ScheduleUpdate {
                last_ping: Some(now_ms() - TIMEOUT.as_millis() as i64 - 1),
                ..Default::default()
            },
        )
        .await;

        let reclaimed = claimer.try_claim(&dead).await.unwrap().unwrap();
        assert_eq!(reclaimed.status, ScheduleStatus::Running);
        assert!(reclaimed.last_ping.unwrap() > dead.last_ping.unwrap());
    }

    #[tokio::test]
    async fn error_schedules_are_reclaimable_but_done_is_terminal() {
        let store = MemoryStore::new();
        active_record(&store, "a").await;
        let claimer = Claimer::new(Arc::new(store.clone()), TIMEOUT);

        let errored = force(
            &store,
            "a",
            ScheduleUpdate {
                status: Some(ScheduleStatus::Error),
                ..Default::default()
            },
        )
        .await;
        assert!(claimer.try_claim(&errored).await.unwrap().is_some());

        let done = force(
            &store,
            "a",
            ScheduleUpdate {
                status: Some(ScheduleStatus::Done),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(claimer.try_claim(&done).await.unwrap(), None);
    }
}
