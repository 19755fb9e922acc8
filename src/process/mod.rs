//! # Child processes.
//!
//! [`SupervisedProcess`] keeps a long-running helper alive: it restarts the
//! child after unexpected exits with exponential backoff, gives up after a
//! bounded number of quick successive failures and can restart it on a fixed
//! period. [`cmd`] and [`shell`] run one-shot commands and capture their output.
//!
//! ## Crash recovery
//! ```text
//! child exits ─► deliberate (stop/restart)? ─► done
//!      │
//!      └─► RetryBudget::on_crash(now)
//!             ├─ now - last_restart >= retry_threshold ─► attempts = 0
//!             ├─ attempts < retries ─► attempts += 1
//!             │      └─► sleep(backoff.next(attempts - 1)) ─► relaunch
//!             └─ otherwise ─► state = Failed, on_failure hook, stop supervising
//! ```
//!
//! With the default policy restarts 1, 2, 3 wait 2s, 4s, 8s.
//!
//! Every child is started through `/usr/bin/env`, so the program is resolved
//! on `PATH` the same way a shell would.

mod budget;
mod command;
mod io;
mod spec;
mod supervisor;

pub use command::{CommandOutput, cmd, shell};
pub use io::ProcessIo;
pub use spec::{ProcessDefaults, ProcessSpec};
pub use supervisor::{ProcessState, SupervisedProcess};

/// Launcher every child goes through.
pub(crate) const LAUNCHER: &str = "/usr/bin/env";
