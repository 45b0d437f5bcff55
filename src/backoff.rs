//! Bounded exponential backoff between submission attempts.
//!
//! An [`ExponentialBackoff`] is an immutable policy shared by every call; each call
//! derives its own [`Backoff`] schedule from it with [`ExponentialBackoff::start`].

use std::time::Duration;
use tokio::time::Instant;

/// Exponential retry policy.
///
/// The delay before attempt `n + 1` is `initial_interval * multiplier^(n - 1)`, capped
/// at `max_interval`. Delays are never randomized, so the sequence is non-decreasing.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Wall-clock budget measured from the first attempt. `None` disables it.
    pub max_elapsed_time: Option<Duration>,
}

impl ExponentialBackoff {
    pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(50);
    pub const DEFAULT_MULTIPLIER: f64 = 1.5;
    pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_MAX_ELAPSED_TIME: Duration = Duration::from_secs(15 * 60);

    pub fn with_initial_interval(mut self, initial_interval: Duration) -> Self {
        self.initial_interval = initial_interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_elapsed_time(mut self, max_elapsed_time: Option<Duration>) -> Self {
        self.max_elapsed_time = max_elapsed_time;
        self
    }

    /// Delay to wait after the `attempt`-th failure (1-based), before the next attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        // A multiplier below 1 would shrink delays.
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay_nanos = (self.initial_interval.as_nanos() as f64 * factor).round();
        if !delay_nanos.is_finite() || delay_nanos >= self.max_interval.as_nanos() as f64 {
            self.max_interval.max(self.initial_interval)
        } else {
            Duration::from_nanos(delay_nanos as u64)
        }
    }

    /// Starts a fresh schedule for one submission.
    pub fn start(&self) -> Backoff<'_> {
        Backoff {
            policy: self,
            attempts: 0,
            started_at: Instant::now(),
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Self::DEFAULT_INITIAL_INTERVAL,
            multiplier: Self::DEFAULT_MULTIPLIER,
            max_interval: Self::DEFAULT_MAX_INTERVAL,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            max_elapsed_time: Some(Self::DEFAULT_MAX_ELAPSED_TIME),
        }
    }
}

/// Per-call backoff state.
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a ExponentialBackoff,
    attempts: u32,
    started_at: Instant,
}

impl Backoff<'_> {
    /// Records a finished attempt and returns how long to wait before the next one,
    /// or `None` once the attempt or time budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_after(self.attempts);
        if let Some(max_elapsed) = self.policy.max_elapsed_time {
            if self.started_at.elapsed() + delay > max_elapsed {
                return None;
            }
        }
        Some(delay)
    }

    /// Number of attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_allows_five_attempts() {
        let policy = ExponentialBackoff::default();
        let mut backoff = policy.start();
        let delays: Vec<Duration> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(delays.len(), 4);
        assert_eq!(backoff.attempts(), 5);
        assert_eq!(delays[0], Duration::from_millis(50));
        assert_eq!(delays[1], Duration::from_millis(75));
    }

    #[test]
    fn test_delays_are_non_decreasing_and_capped() {
        let policy = ExponentialBackoff::default()
            .with_max_attempts(40)
            .with_max_interval(Duration::from_secs(1))
            .with_max_elapsed_time(None);
        let delays: Vec<Duration> = (1..40).map(|n| policy.delay_after(n)).collect();
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1], "{:?} > {:?}", pair[0], pair[1]);
        }
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_single_attempt_policy_never_sleeps() {
        let policy = ExponentialBackoff::default().with_max_attempts(1);
        let mut backoff = policy.start();
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_elapsed_budget_stops_schedule() {
        let policy = ExponentialBackoff::default()
            .with_initial_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(1)));
        let mut backoff = policy.start();
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_multiplier_below_one_is_treated_as_constant() {
        let policy = ExponentialBackoff::default().with_multiplier(0.5);
        assert_eq!(policy.delay_after(1), policy.delay_after(4));
    }
}
