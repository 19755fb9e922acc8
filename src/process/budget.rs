//! Restart accounting for one supervised child.

use std::time::Duration;

use tokio::time::Instant;

/// Counts quick successive crashes.
///
/// A crash happening at least `threshold` after the last restart starts a new
/// series; otherwise it consumes one of `retries` attempts.
#[derive(Clone, Debug)]
pub(crate) struct RetryBudget {
    retries: u32,
    threshold: Duration,
    attempts: u32,
    last_restart: Option<Instant>,
}

impl RetryBudget {
    pub(crate) fn new(retries: u32, threshold: Duration) -> Self {
        Self {
            retries,
            threshold,
            attempts: 0,
            last_restart: None,
        }
    }

    /// Records a crash at `now`; returns the 1-based attempt to run, or `None`
    /// when the budget is spent.
    pub(crate) fn on_crash(&mut self, now: Instant) -> Option<u32> {
        if let Some(last) = self.last_restart
            && now.saturating_duration_since(last) >= self.threshold
        {
            self.attempts = 0;
        }
        if self.attempts >= self.retries {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    /// Records that a restart was performed at `now`.
    pub(crate) fn mark_restarted(&mut self, now: Instant) {
        self.last_restart = Some(now);
    }

    #[cfg(test)]
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(30);

    #[test]
    fn quick_crashes_exhaust_the_budget() {
        let mut budget = RetryBudget::new(3, THRESHOLD);
        let mut now = Instant::now();

        for expected in 1..=3 {
            assert_eq!(budget.on_crash(now), Some(expected));
            now += Duration::from_secs(1);
            budget.mark_restarted(now);
            now += Duration::from_secs(1);
        }
        assert_eq!(budget.on_crash(now), None);
        assert_eq!(budget.attempts(), 3);
    }

    #[test]
    fn crash_after_threshold_starts_a_new_series() {
        let mut budget = RetryBudget::new(2, THRESHOLD);
        let start = Instant::now();

        assert_eq!(budget.on_crash(start), Some(1));
        budget.mark_restarted(start);
        assert_eq!(budget.on_crash(start + Duration::from_secs(1)), Some(2));
        budget.mark_restarted(start + Duration::from_secs(1));

        // exactly at the threshold counts as a fresh series
        assert_eq!(budget.on_crash(start + Duration::from_secs(31)), Some(1));
    }

    #[test]
    fn zero_retries_gives_up_immediately() {
        let mut budget = RetryBudget::new(0, THRESHOLD);
        assert_eq!(budget.on_crash(Instant::now()), None);
    }
}
