//! Persisted schedule documents and the filter/update vocabulary.
//!
//! Field names on the wire are camelCase (`lastStart`, `lastPing`, ...), so
//! any document store already holding schedules in that layout is directly
//! substitutable.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Status of a persisted schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Eligible for claiming.
    #[default]
    Active,
    /// Claimed by some process; the holder refreshes `lastPing` while alive.
    Running,
    /// Last execution failed; still claimable.
    Error,
    /// One-shot schedule that completed; never claimed again.
    Done,
}

/// A schedule document shared through the store.
///
/// All timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    /// Unique key across the store.
    pub id: String,
    /// Human label.
    pub title: String,
    /// Claim state.
    pub status: ScheduleStatus,
    /// Earliest instant before which the job must not start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    /// Re-eligibility period, measured from `last_start`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// When the current or most recent execution was claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_start: Option<i64>,
    /// Last heartbeat from the current holder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<i64>,
    /// When the most recent execution settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_end: Option<i64>,
    /// When the schedule was first registered.
    pub date_added: i64,
}

impl ScheduleRecord {
    /// Whether this schedule is time-eligible at `now`.
    ///
    /// Checks the one-shot lower bound (`time`) and the interval elapsed since
    /// `last_start`. A schedule that has never started counts as elapsed.
    /// Claim-state eligibility is not checked here; that is the claim
    /// protocol's job.
    pub fn due(&self, now: i64) -> bool {
        if let Some(time) = self.time
            && time > now
        {
            return false;
        }
        if let Some(interval) = self.interval
            && let Some(last_start) = self.last_start
            && now - last_start < interval
        {
            return false;
        }
        true
    }
}

/// Metadata written by job registration.
///
/// Upserting a seed never touches `status`, `last_start`, `last_ping` or
/// `last_end`, so racing first registrations from several processes converge
/// on one record without resetting claim state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSeed {
    pub id: String,
    pub title: String,
    pub time: Option<i64>,
    pub interval: Option<i64>,
    pub date_added: i64,
}

impl ScheduleSeed {
    /// The record a fresh insert of this seed produces.
    pub fn into_record(self) -> ScheduleRecord {
        ScheduleRecord {
            id: self.id,
            title: self.title,
            status: ScheduleStatus::Active,
            time: self.time,
            interval: self.interval,
            last_start: None,
            last_ping: None,
            last_end: None,
            date_added: self.date_added,
        }
    }
}

/// One branch of a conditional-update filter.
///
/// A branch matches a record when the id is equal and every predicate that is
/// present holds. Absent predicates match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBranch {
    /// Record key this branch targets.
    pub id: String,
    /// Status must be one of these, when present.
    pub status_in: Option<Vec<ScheduleStatus>>,
    /// `last_start` must equal this exact value (including unset), when
    /// present. This is the fencing predicate: it detects a claim race that
    /// another process already won.
    pub last_start: Option<Option<i64>>,
    /// `last_ping` must be set and strictly older than this instant, when
    /// present. This is the staleness predicate that reclaims crashed holders.
    pub ping_older_than: Option<i64>,
}

impl FilterBranch {
    /// A branch with no predicates beyond the id.
    pub fn any(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_in: None,
            last_start: None,
            ping_older_than: None,
        }
    }

    /// Whether this branch matches `record`.
    ///
    /// Reference semantics shared by every adapter; backends that translate
    /// branches into native queries must agree with this function.
    pub fn matches(&self, record: &ScheduleRecord) -> bool {
        if record.id != self.id {
            return false;
        }
        if let Some(ref statuses) = self.status_in
            && !statuses.contains(&record.status)
        {
            return false;
        }
        if let Some(expected) = self.last_start
            && record.last_start != expected
        {
            return false;
        }
        if let Some(threshold) = self.ping_older_than {
            match record.last_ping {
                Some(ping) if ping < threshold => {}
                _ => return false,
            }
        }
        true
    }
}

/// A disjunction of filter branches; the filter matches when any branch does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub branches: Vec<FilterBranch>,
}

impl ScheduleFilter {
    /// A filter matching a record by id alone.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            branches: vec![FilterBranch::any(id)],
        }
    }

    /// Whether any branch matches `record`.
    pub fn matches(&self, record: &ScheduleRecord) -> bool {
        self.branches.iter().any(|branch| branch.matches(record))
    }
}

/// Fields written by a conditional update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub status: Option<ScheduleStatus>,
    pub last_start: Option<i64>,
    pub last_ping: Option<i64>,
    pub last_end: Option<i64>,
}

impl ScheduleUpdate {
    /// Apply this update to `record` in place.
    pub fn apply(&self, record: &mut ScheduleRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(last_start) = self.last_start {
            record.last_start = Some(last_start);
        }
        if let Some(last_ping) = self.last_ping {
            record.last_ping = Some(last_ping);
        }
        if let Some(last_end) = self.last_end {
            record.last_end = Some(last_end);
        }
    }
}
