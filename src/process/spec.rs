use std::time::Duration;

use serde::Deserialize;

use crate::policies::BackoffPolicy;

/// Settings applied to every supervised process unless overridden per spec.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessDefaults {
    /// Restarts allowed within one series of quick crashes.
    pub retries: u32,
    /// A crash this long after the last restart starts a new series.
    pub retry_threshold_secs: u64,
    /// Periodic restart interval; `0` disables it.
    pub restart_every_secs: u64,
    /// Delay between a crash and the restart.
    pub backoff: BackoffPolicy,
}

impl Default for ProcessDefaults {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_threshold_secs: 30,
            restart_every_secs: 0,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ProcessDefaults {
    #[inline]
    pub fn retry_threshold(&self) -> Duration {
        Duration::from_secs(self.retry_threshold_secs)
    }

    #[inline]
    pub fn restart_every(&self) -> Option<Duration> {
        (self.restart_every_secs > 0).then(|| Duration::from_secs(self.restart_every_secs))
    }
}

/// # What to run and how to keep it running.
///
/// ```rust
/// use std::time::Duration;
/// use deskvisor::ProcessSpec;
///
/// let spec = ProcessSpec::new(["pactl", "subscribe"])
///     .with_restart_every(Some(Duration::from_secs(3600)))
///     .with_retries(3);
/// assert_eq!(spec.program(), "pactl");
/// assert_eq!(spec.retries(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct ProcessSpec {
    args: Vec<String>,
    restart_every: Option<Duration>,
    retries: u32,
    retry_threshold: Duration,
    backoff: BackoffPolicy,
}

impl ProcessSpec {
    /// Spec for `args` with the built-in defaults.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_defaults(args, &ProcessDefaults::default())
    }

    /// Spec for `args` with configured defaults.
    pub fn with_defaults<I, S>(args: I, defaults: &ProcessDefaults) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            restart_every: defaults.restart_every(),
            retries: defaults.retries,
            retry_threshold: defaults.retry_threshold(),
            backoff: defaults.backoff,
        }
    }

    pub fn with_restart_every(mut self, every: Option<Duration>) -> Self {
        self.restart_every = every.filter(|d| !d.is_zero());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_threshold(mut self, threshold: Duration) -> Self {
        self.retry_threshold = threshold;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Full argument vector; the first element is the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program name, empty when no arguments were given.
    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn restart_every(&self) -> Option<Duration> {
        self.restart_every
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_threshold(&self) -> Duration {
        self.retry_threshold
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_flow_into_spec() {
        let defaults = ProcessDefaults {
            retries: 2,
            restart_every_secs: 60,
            ..ProcessDefaults::default()
        };
        let spec = ProcessSpec::with_defaults(["xev"], &defaults);
        assert_eq!(spec.retries(), 2);
        assert_eq!(spec.restart_every(), Some(Duration::from_secs(60)));
        assert_eq!(spec.retry_threshold(), Duration::from_secs(30));
    }

    #[test]
    fn zero_period_disables_scheduled_restarts() {
        let spec = ProcessSpec::new(["xev"]).with_restart_every(Some(Duration::ZERO));
        assert_eq!(spec.restart_every(), None);
        assert_eq!(ProcessDefaults::default().restart_every(), None);
    }

    #[test]
    fn empty_args_have_empty_program() {
        assert_eq!(ProcessSpec::new(Vec::<String>::new()).program(), "");
    }
}
