//! Engine and scheduler configuration

use std::time::Duration;

/// Configuration for [`crate::TaskEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-call timeout on notifier dispatch; a timeout is a per-action
    /// failure, not a retry
    pub notify_timeout: Duration,

    /// Attempts for store writes that hit contention
    pub store_retry_attempts: u32,

    /// Base backoff between contention retries (multiplied by attempt)
    pub store_retry_backoff: Duration,

    /// Hours before a deadline at which reminders fire; reminders that would
    /// land in the past are skipped
    pub deadline_reminder_hours: Vec<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_timeout: Duration::from_secs(10),
            store_retry_attempts: 3,
            store_retry_backoff: Duration::from_millis(50),
            deadline_reminder_hours: vec![24, 1],
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn with_store_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.store_retry_attempts = attempts;
        self.store_retry_backoff = backoff;
        self
    }

    pub fn with_deadline_reminder_hours(mut self, hours: Vec<i64>) -> Self {
        self.deadline_reminder_hours = hours;
        self
    }
}

/// Configuration for the [`crate::Scheduler`] worker
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between worker ticks
    pub tick_interval: Duration,

    /// Maximum scheduled rows claimed per tick
    pub batch_size: usize,

    /// Age after which a `processing` row is swept back to `pending`
    pub stale_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            batch_size: 100,
            stale_after: Duration::from_secs(600),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.notify_timeout, Duration::from_secs(10));
        assert_eq!(config.store_retry_attempts, 3);
        assert_eq!(config.deadline_reminder_hours, vec![24, 1]);
    }

    #[test]
    fn scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn builders() {
        let config = EngineConfig::new()
            .with_notify_timeout(Duration::from_millis(100))
            .with_store_retry(5, Duration::from_millis(10));
        assert_eq!(config.notify_timeout, Duration::from_millis(100));
        assert_eq!(config.store_retry_attempts, 5);

        let config = SchedulerConfig::new()
            .with_tick_interval(Duration::from_millis(250))
            .with_batch_size(10);
        assert_eq!(config.batch_size, 10);
    }
}
