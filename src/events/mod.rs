//! Lifecycle events: types and broadcast bus.
//!
//! The runtime, the listener registry, dispatchers and supervised processes
//! publish [`Event`]s on a shared [`Bus`]. Nothing inside the runtime depends on
//! them being received; they exist for programmatic observers (status widgets,
//! tests, metrics).
//!
//! ## Quick reference
//! - **Publishers**: `Runtime`, `TaskSet`, `ListenerRegistry`, `Dispatcher`,
//!   `SupervisedProcess`.
//! - **Consumers**: anything holding `runtime.bus().subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
