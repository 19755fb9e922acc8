//! Restart delay policies for supervised processes.
//!
//! ## Contents
//! - [`BackoffPolicy`] how the wait before the n-th restart grows (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization applied on top of the computed delay
//!
//! ## Quick wiring
//! ```text
//! ProcessSpec { retries, retry_threshold, restart_every, backoff: BackoffPolicy }
//!      └─► process::SupervisedProcess exit watcher uses:
//!           - RetryBudget to decide restart vs give up
//!           - backoff.next(attempt - 1) to sleep before restart #attempt
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=2s, factor=2.0, max=300s, jitter=None,
//!   i.e. 2s, 4s, 8s, 16s, ... before restarts 1, 2, 3, 4, ...

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
