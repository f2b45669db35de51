//! Poll interval coordination
//!
//! Consumers register the cadence they would like; the bus polls at the
//! fastest one while it is in the foreground. Nobody needs to know about the
//! other consumers: lowest interval wins.

use super::state::BusStatus;
use crate::config::{SyncConfig, MIN_POLL_INTERVAL};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Identifies one interval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollToken(Uuid);

impl PollToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PollToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct PollIntervals {
    requests: HashMap<PollToken, Duration>,
}

impl PollIntervals {
    pub fn register(&mut self, token: PollToken, interval: Duration) {
        self.requests.insert(token, interval);
    }

    /// Returns whether the token was registered
    pub fn unregister(&mut self, token: PollToken) -> bool {
        self.requests.remove(&token).is_some()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Interval the poll timer should use in `status`
    pub fn effective(&self, status: &BusStatus, config: &SyncConfig) -> Duration {
        let interval = match status {
            BusStatus::Ready => self
                .requests
                .values()
                .copied()
                .fold(config.default_poll_interval, Duration::min),
            BusStatus::Backgrounded => config.background_poll_interval,
            _ => config.default_poll_interval,
        };
        interval.max(MIN_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_requests_uses_default() {
        let intervals = PollIntervals::default();
        let config = SyncConfig::default();
        assert_eq!(
            intervals.effective(&BusStatus::Ready, &config),
            config.default_poll_interval
        );
    }

    #[test]
    fn test_lowest_request_wins_and_unregister_restores_next() {
        let mut intervals = PollIntervals::default();
        let config = SyncConfig::default();
        let slow = PollToken::new();
        let fast = PollToken::new();
        intervals.register(slow, Duration::from_secs(10));
        intervals.register(fast, Duration::from_secs(3));

        assert_eq!(
            intervals.effective(&BusStatus::Ready, &config),
            Duration::from_secs(3)
        );

        assert!(intervals.unregister(fast));
        assert_eq!(
            intervals.effective(&BusStatus::Ready, &config),
            Duration::from_secs(10)
        );

        assert!(intervals.unregister(slow));
        assert!(!intervals.unregister(slow));
        assert_eq!(
            intervals.effective(&BusStatus::Ready, &config),
            config.default_poll_interval
        );
    }

    #[test]
    fn test_requests_slower_than_default_are_capped() {
        let mut intervals = PollIntervals::default();
        let config = SyncConfig::default();
        intervals.register(PollToken::new(), Duration::from_secs(600));
        assert_eq!(
            intervals.effective(&BusStatus::Ready, &config),
            config.default_poll_interval
        );
    }

    #[test]
    fn test_backgrounded_ignores_requests() {
        let mut intervals = PollIntervals::default();
        let config = SyncConfig::default();
        intervals.register(PollToken::new(), Duration::from_secs(1));
        assert_eq!(
            intervals.effective(&BusStatus::Backgrounded, &config),
            config.background_poll_interval
        );
        assert_eq!(
            intervals.effective(&BusStatus::Suspended, &config),
            config.default_poll_interval
        );
    }
}
