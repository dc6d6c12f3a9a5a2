//! Schedule store boundary for Lockstep.
//!
//! This crate defines the persisted data model and the store contract the
//! scheduler coordinates through:
//!
//! - **Types**: the shared `ScheduleRecord` document and the filter/update
//!   vocabulary used by the atomic conditional update
//! - **Store**: the `ScheduleStore` trait (upsert, conditional find-and-update,
//!   delete, full scan, live change feed)
//! - **Memory**: an in-memory reference adapter, used by the test suite and as
//!   a template for real backends

mod error;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{ChangeEvent, ChangeFeed, ScheduleStore};
pub use types::{
    FilterBranch, ScheduleFilter, ScheduleRecord, ScheduleSeed, ScheduleStatus, ScheduleUpdate,
    now_ms,
};
