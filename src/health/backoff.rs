//! Linear backoff between broker connectivity probes
//!
//! After the n-th consecutive failure the wait grows by `base * n`, so three
//! failures in a row give waits of `base`, `3 * base` and `6 * base`. The
//! growth is cumulative linear rather than exponential and is capped at
//! `max`. A success resets everything.

use std::time::Duration;
use tokio::time::Instant;

/// Default probe cadence
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default cap on the wait between probes
pub const DEFAULT_MAX_CHECK_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    retries: u32,
    current: Duration,
    next_check: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            retries: 0,
            current: Duration::ZERO,
            next_check: None,
        }
    }

    /// True once `now` is past the next allowed check
    pub fn ready(&self, now: Instant) -> bool {
        self.next_check.map_or(true, |next| now > next)
    }

    pub fn record_success(&mut self) {
        self.retries = 0;
        self.current = Duration::ZERO;
        self.next_check = None;
    }

    /// Register a failed probe at `now` and return the new wait
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.retries = self.retries.saturating_add(1);
        self.current = self
            .current
            .saturating_add(self.base.saturating_mul(self.retries))
            .min(self.max);
        self.next_check = Some(now + self.current);
        self.current
    }

    /// Consecutive failures since the last success
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Current wait between probes
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn next_check(&self) -> Option<Instant> {
        self.next_check
    }

    pub fn base(&self) -> Duration {
        self.base
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_CHECK_INTERVAL)
    }
}
