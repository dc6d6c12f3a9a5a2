//! The store contract the scheduler coordinates through.

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::{ScheduleFilter, ScheduleRecord, ScheduleSeed, ScheduleUpdate, StoreError};

/// A change to the schedule collection, streamed to feed subscribers.
///
/// Insert and update events carry the full resulting document; deletes carry
/// the key of the removed document.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A schedule was created.
    Inserted(ScheduleRecord),
    /// A schedule was updated.
    Updated(ScheduleRecord),
    /// A schedule was deleted.
    Deleted(String),
}

/// A live subscription to schedule changes.
///
/// Subscribers must await [`ChangeFeed::positioned`] before trusting a full
/// scan taken after subscribing: once the signal fires, every mutation after
/// the scan is guaranteed to arrive on the feed, so nothing is lost in the
/// snapshot/subscribe handoff window.
pub struct ChangeFeed {
    events: broadcast::Receiver<ChangeEvent>,
    positioned: watch::Receiver<bool>,
}

impl ChangeFeed {
    /// Build a feed from a subscription and its position-confirmation signal.
    pub fn new(events: broadcast::Receiver<ChangeEvent>, positioned: watch::Receiver<bool>) -> Self {
        Self { events, positioned }
    }

    /// Wait until the stream confirms its starting position.
    pub async fn positioned(&mut self) -> Result<(), StoreError> {
        self.positioned
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| StoreError::FeedClosed)?;
        Ok(())
    }

    /// Receive the next change event.
    pub async fn recv(&mut self) -> Result<ChangeEvent, broadcast::error::RecvError> {
        self.events.recv().await
    }
}

/// A document store holding `ScheduleRecord`s.
///
/// Any backend providing these five capabilities is substitutable; the
/// scheduler performs all cross-process mutation through
/// [`find_and_update`](ScheduleStore::find_and_update), which must be a single
/// indivisible operation.
#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
    /// Insert or update a schedule by key.
    ///
    /// An insert materializes the seed as a fresh `active` record. An update
    /// rewrites the metadata fields (`title`, `time`, `interval`) only and
    /// never disturbs claim state, so concurrent first registrations converge.
    /// Returns the resulting document.
    async fn upsert(&self, seed: ScheduleSeed) -> Result<ScheduleRecord, StoreError>;

    /// Atomically apply `update` to the first document matching `filter`.
    ///
    /// Returns the post-update document, or `None` when nothing matched. The
    /// match-and-update pair must be indivisible; this single operation is the
    /// scheduler's entire mutual-exclusion mechanism.
    async fn find_and_update(
        &self,
        filter: ScheduleFilter,
        update: ScheduleUpdate,
    ) -> Result<Option<ScheduleRecord>, StoreError>;

    /// Delete a schedule by key. Returns whether a document existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Read the full collection, ordered by id.
    async fn scan(&self) -> Result<Vec<ScheduleRecord>, StoreError>;

    /// Subscribe to the live change stream.
    async fn watch(&self) -> Result<ChangeFeed, StoreError>;
}
