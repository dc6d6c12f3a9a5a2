//! Scheduler timing configuration.

use std::time::Duration;

use crate::SchedulerError;

/// Default ticker cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default heartbeat write cadence while a job runs.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Default age after which a running holder's claim is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing knobs for a scheduler instance.
///
/// Every instance sharing a store should use the same heartbeat settings;
/// the timeout bounds worst-case reclaim latency after a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often the ticker scans the cache for eligible schedules.
    pub tick_interval: Duration,
    /// How often a running job refreshes `lastPing`.
    pub heartbeat_period: Duration,
    /// How stale `lastPing` must be before a running claim is reclaimable.
    pub heartbeat_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration.
    ///
    /// The timeout must be strictly greater than the heartbeat period,
    /// otherwise a live holder could be reclaimed between two of its own
    /// pings.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.tick_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "tick_interval must be nonzero".to_string(),
            ));
        }
        if self.heartbeat_period.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "heartbeat_period must be nonzero".to_string(),
            ));
        }
        if self.heartbeat_timeout <= self.heartbeat_period {
            return Err(SchedulerError::InvalidConfig(format!(
                "heartbeat_timeout ({:?}) must exceed heartbeat_period ({:?})",
                self.heartbeat_timeout, self.heartbeat_period
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SchedulerConfig::default().validate().unwrap();
    }

    #[test]
    fn timeout_must_exceed_period() {
        let config = SchedulerConfig {
            heartbeat_period: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_cadences_are_rejected() {
        let config = SchedulerConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            heartbeat_period: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
