//! # Exponential restart backoff.
//!
//! The delay before restart `n` (1-based) is `first × factor^(n-1)`, clamped to
//! `max`, then jittered. With the defaults this is `2^n` seconds.
//!
//! ```rust
//! use std::time::Duration;
//! use deskvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(2),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(2));
//! assert_eq!(backoff.next(1), Duration::from_secs(4));
//! assert_eq!(backoff.next(5), Duration::from_secs(10));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::config::secs;
use crate::policies::jitter::JitterPolicy;

/// Restart backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    #[serde(rename = "first_secs", with = "secs")]
    pub first: Duration,
    /// Upper bound for any single delay.
    #[serde(rename = "max_secs", with = "secs")]
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_secs(2),
            max: Duration::from_secs(300),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for a 0-indexed step.
    ///
    /// Each step derives its base independently from `first` and `factor`, so jitter
    /// never compounds across steps. Non-finite or negative bases collapse to `max`.
    pub fn next(&self, step: u32) -> Duration {
        let exp = step.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_doubles_from_two_seconds() {
        let policy = BackoffPolicy::default();
        let delays: Vec<Duration> = (0..3).map(|step| policy.next(step)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn clamps_to_max() {
        let policy = BackoffPolicy {
            max: Duration::from_secs(20),
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.next(4), Duration::from_secs(20));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(20));
    }

    #[test]
    fn constant_factor_keeps_first() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(250),
            factor: 1.0,
            ..BackoffPolicy::default()
        };
        for step in 0..10 {
            assert_eq!(policy.next(step), Duration::from_millis(250));
        }
    }

    #[test]
    fn equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..BackoffPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.next(2);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(8));
        }
    }

    #[test]
    fn deserializes_from_seconds() {
        let policy: BackoffPolicy =
            toml::from_str("first_secs = 1\nmax_secs = 60\nfactor = 3.0\njitter = \"full\"")
                .expect("valid backoff table");
        assert_eq!(policy.first, Duration::from_secs(1));
        assert_eq!(policy.max, Duration::from_secs(60));
        assert_eq!(policy.jitter, JitterPolicy::Full);
    }
}
