//! # Lifecycle events.
//!
//! [`EventKind`] groups events in three families:
//! - **Listener events**: registry and dispatch activity.
//! - **Process events**: supervised child lifecycle.
//! - **Runtime events**: task failures and shutdown.
//!
//! ## Ordering guarantees
//! Each event carries a globally unique, monotonically increasing `seq`.
//!
//! ```rust
//! use std::time::Duration;
//! use deskvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_source("xinput-watcher")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(4));
//!
//! assert_eq!(ev.delay_ms, Some(4000));
//! assert_eq!(ev.attempt, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Listener events ===
    /// A listener instance was constructed for a new key.
    ///
    /// Sets: `source` (listener key)
    ListenerCreated,

    /// A listener's `start()` was spawned.
    ///
    /// Sets: `source`
    ListenerStarting,

    /// A payload was dispatched to the listener's callbacks.
    ///
    /// Sets: `source`, `attempt` (number of callbacks)
    Dispatched,

    /// A trigger was dropped because its payload equals the previous one.
    ///
    /// Sets: `source`
    DuplicateSuppressed,

    // === Process events ===
    /// A supervised child was spawned.
    ///
    /// Sets: `source` (program), `pid` when known
    ProcessSpawned,

    /// A supervised child exited without being asked to.
    ///
    /// Sets: `source`, `exit_code` when the child exited normally
    ProcessExited,

    /// A crash restart was scheduled.
    ///
    /// Sets: `source`, `attempt` (1-based restart number), `delay_ms`
    BackoffScheduled,

    /// The periodic restart timer fired.
    ///
    /// Sets: `source`
    RestartScheduled,

    /// A supervised child was stopped on request.
    ///
    /// Sets: `source`
    ProcessStopped,

    /// The restart budget ran out; supervision ended.
    ///
    /// Sets: `source`, `attempt` (budget)
    RestartsExhausted,

    // === Runtime events ===
    /// A tracked task returned an error or panicked.
    ///
    /// Sets: `source` (task name), `reason`
    TaskFailed,

    /// A termination signal was observed or a fatal error forced shutdown.
    ShutdownRequested,

    /// Every tracked task finished within the grace period.
    AllStoppedWithin,

    /// Some tracked tasks outlived the grace period.
    GraceExceeded,
}

/// Lifecycle event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Listener key, program or task name.
    pub source: Option<Arc<str>>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Attempt or count, depending on the kind.
    pub attempt: Option<u32>,
    /// Delay in milliseconds.
    pub delay_ms: Option<u32>,
    /// Child exit code.
    pub exit_code: Option<i32>,
    /// Child process id.
    pub pid: Option<u32>,
}

impl Event {
    /// Creates an event stamped with the current time and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            source: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            exit_code: None,
            pid: None,
        }
    }

    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Delay as a [`Duration`], when set.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.map(|ms| Duration::from_millis(u64::from(ms)))
    }
}
