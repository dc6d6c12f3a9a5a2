//! In-memory reference adapter.
//!
//! Backs the test suite and documents the semantics a real backend must
//! provide. Every operation holds the collection lock for its whole span,
//! which makes `find_and_update` indivisible by construction. The store is
//! cheaply cloneable; clones share one collection, so several scheduler
//! instances in one test stand in for several processes sharing a database.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::trace;

use crate::{
    ChangeEvent, ChangeFeed, ScheduleFilter, ScheduleRecord, ScheduleSeed, ScheduleStore,
    ScheduleUpdate, StoreError,
};

/// Change event channel capacity. Large enough that a briefly-busy subscriber
/// does not lag during test bursts.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// An in-memory `ScheduleStore`.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    docs: Mutex<BTreeMap<String, ScheduleRecord>>,
    events_tx: broadcast::Sender<ChangeEvent>,
    positioned_tx: watch::Sender<bool>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        // A broadcast subscription is positioned at the instant it is taken,
        // so the confirmation signal is already resolved.
        let (positioned_tx, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                docs: Mutex::new(BTreeMap::new()),
                events_tx,
                positioned_tx,
            }),
        }
    }

    fn emit(&self, event: ChangeEvent) {
        if self.inner.events_tx.send(event).is_err() {
            trace!("no change feed subscribers");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn upsert(&self, seed: ScheduleSeed) -> Result<ScheduleRecord, StoreError> {
        let mut docs = self.inner.docs.lock().await;
        match docs.entry(seed.id.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.title = seed.title;
                existing.time = seed.time;
                existing.interval = seed.interval;
                let record = existing.clone();
                // Emit under the lock so the feed observes mutations in
                // collection order.
                self.emit(ChangeEvent::Updated(record.clone()));
                Ok(record)
            }
            Entry::Vacant(entry) => {
                let record = seed.into_record();
                entry.insert(record.clone());
                self.emit(ChangeEvent::Inserted(record.clone()));
                Ok(record)
            }
        }
    }

    async fn find_and_update(
        &self,
        filter: ScheduleFilter,
        update: ScheduleUpdate,
    ) -> Result<Option<ScheduleRecord>, StoreError> {
        let mut docs = self.inner.docs.lock().await;
        for branch in &filter.branches {
            if let Some(doc) = docs.get_mut(&branch.id)
                && branch.matches(doc)
            {
                update.apply(doc);
                let record = doc.clone();
                self.emit(ChangeEvent::Updated(record.clone()));
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut docs = self.inner.docs.lock().await;
        let existed = docs.remove(id).is_some();
        if existed {
            self.emit(ChangeEvent::Deleted(id.to_string()));
        }
        Ok(existed)
    }

    async fn scan(&self) -> Result<Vec<ScheduleRecord>, StoreError> {
        Ok(self.inner.docs.lock().await.values().cloned().collect())
    }

    async fn watch(&self) -> Result<ChangeFeed, StoreError> {
        Ok(ChangeFeed::new(
            self.inner.events_tx.subscribe(),
            self.inner.positioned_tx.subscribe(),
        ))
    }
}
