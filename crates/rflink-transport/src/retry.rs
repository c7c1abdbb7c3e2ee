//! Retry pacing for auto-connect workers.

use std::time::Duration;

use rflink_core::constants::SOCKET_RETRY_INTERVAL;

/// Fixed-interval retry policy with an optional attempt bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Policy of the socket worker: retry forever, once per second.
    pub fn socket() -> Self {
        Self::new(SOCKET_RETRY_INTERVAL, None)
    }

    /// Policy of the radio controller: a few paced attempts per established
    /// link, then give the link up and wait for the medium to re-report it.
    pub fn radio() -> Self {
        Self::new(Duration::from_secs(1), Some(3))
    }

    /// Delay before the given 1-based attempt, or `None` when the policy
    /// is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt > max => None,
            _ => Some(self.interval),
        }
    }
}

/// Mutable retry cursor over a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
    attempt: u32,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Record one failure; returns the pause before the next attempt, or
    /// `None` when the policy is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        self.policy.delay_for(self.attempt)
    }

    /// Reset after a success or a target change.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_policy_never_exhausts() {
        let mut retry = Retry::new(RetryPolicy::socket());
        for _ in 0..1000 {
            assert_eq!(retry.next_delay(), Some(SOCKET_RETRY_INTERVAL));
        }
    }

    #[test]
    fn test_bounded_policy_exhausts_then_resets() {
        let mut retry = Retry::new(RetryPolicy::radio());
        assert!(retry.next_delay().is_some());
        assert!(retry.next_delay().is_some());
        assert!(retry.next_delay().is_some());
        assert_eq!(retry.next_delay(), None);
        retry.reset();
        assert!(retry.next_delay().is_some());
    }
}
