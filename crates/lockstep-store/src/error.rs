//! Error types for the schedule store.

use thiserror::Error;

/// Errors that can occur when talking to a schedule store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed an operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The change feed closed before the requested signal arrived.
    #[error("change feed closed")]
    FeedClosed,
}
