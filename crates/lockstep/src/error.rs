//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
///
/// A lost claim race is not an error; `Claimer::try_claim` reports it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] lockstep_store::StoreError),

    /// Invalid scheduler configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The scheduler has been closed.
    #[error("scheduler is closed")]
    Closed,
}
