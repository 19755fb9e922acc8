//! Runtime core: declaration, tracked tasks and lifecycle.
//!
//! - [`runtime`]: [`Runtime`], the declaration entry points and the run/stop loop;
//! - [`builder`]: [`RuntimeBuilder`] wiring bus, task set and registries;
//! - [`handle`]: [`RuntimeHandle`], the cloneable view listeners and supervisors use;
//! - [`tasks`]: [`TaskSet`], cancellable tracked tasks with outcome reporting;
//! - [`plugin`]: the [`Plugin`] entry point for user configuration;
//! - [`shutdown`]: termination signal handling.

mod builder;
mod handle;
mod plugin;
mod runtime;
mod shutdown;
mod tasks;

pub use builder::RuntimeBuilder;
pub use handle::RuntimeHandle;
pub use plugin::Plugin;
pub use runtime::Runtime;
pub use tasks::TaskSet;
