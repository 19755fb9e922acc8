use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::tasks::TaskSet;
use crate::error::{ProcessError, TaskError};
use crate::events::Bus;
use crate::process::{ProcessDefaults, ProcessSpec, SupervisedProcess};

/// # Cloneable access to the running runtime.
///
/// Handed to listeners (through their context) and to anything that needs to
/// spawn tracked work, run blocking calls or supervise helpers.
#[derive(Clone)]
pub struct RuntimeHandle {
    tasks: TaskSet,
    bus: Bus,
    blocking: Arc<Semaphore>,
    process_defaults: Arc<ProcessDefaults>,
}

impl RuntimeHandle {
    pub(crate) fn new(
        tasks: TaskSet,
        bus: Bus,
        blocking_threads: usize,
        process_defaults: ProcessDefaults,
    ) -> Self {
        Self {
            tasks,
            bus,
            blocking: Arc::new(Semaphore::new(blocking_threads.max(1))),
            process_defaults: Arc::new(process_defaults),
        }
    }

    /// Spawns tracked work; see [`TaskSet::spawn`].
    pub fn spawn<F>(&self, name: impl Into<Arc<str>>, fut: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.tasks.spawn(name, fut);
    }

    /// Spawns tracked work that starts after `delay`.
    ///
    /// The delay is cancelled together with the runtime.
    pub fn spawn_after<F>(&self, name: impl Into<Arc<str>>, delay: Duration, fut: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.tasks.spawn(name, async move {
            tokio::time::sleep(delay).await;
            fut.await
        });
    }

    /// Runs `f` on the blocking pool, at most `blocking_threads` at a time.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .blocking
            .acquire()
            .await
            .map_err(|_| TaskError::Canceled)?;
        tokio::task::spawn_blocking(f).await.map_err(|e| {
            if e.is_panic() {
                TaskError::fail("blocking call panicked")
            } else {
                TaskError::Canceled
            }
        })
    }

    /// Supervisor for `args` using the configured process defaults.
    pub fn supervise<I, S>(&self, args: I) -> Result<SupervisedProcess, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = ProcessSpec::with_defaults(args, &self.process_defaults);
        SupervisedProcess::new(spec, self.clone())
    }

    /// Supervisor for a fully custom spec.
    pub fn supervise_spec(&self, spec: ProcessSpec) -> Result<SupervisedProcess, ProcessError> {
        SupervisedProcess::new(spec, self.clone())
    }

    /// Process settings from the runtime configuration.
    pub fn process_defaults(&self) -> &ProcessDefaults {
        &self.process_defaults
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// A token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.tasks.token()
    }

    pub fn is_stopping(&self) -> bool {
        self.tasks.is_cancelled()
    }

    /// Handle not attached to a [`Runtime`](super::Runtime); fatal errors go nowhere.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let bus = Bus::new(1024);
        let (tasks, _fatal) = TaskSet::new(bus.clone());
        Self::new(tasks, bus, 4, ProcessDefaults::default())
    }
}
