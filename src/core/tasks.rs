//! # Tracked task set.
//!
//! Every long-running unit of work (listener start-up, pollers, process
//! watchers, timers) goes through [`TaskSet::spawn`]:
//! - the future is raced against the runtime [`CancellationToken`];
//! - panics are caught and reported as failures;
//! - the outcome is logged and published on the [`Bus`];
//! - fatal errors are forwarded to the runtime loop, which shuts down.
//!
//! ```text
//! spawn(name, fut) ─► tracker.spawn(select! {
//!                        token.cancelled() ─► Err(Canceled)
//!                        catch_unwind(fut) ─► Ok | Err(Fail) | Err(Fatal) | panic ─► Err(Fail)
//!                     })
//!                        └─► report(): Fatal ─► fatal_tx ─► Runtime::run() stops everything
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, trace};

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};

/// Cancellable, tracked set of background tasks. Cheap to clone.
#[derive(Clone)]
pub struct TaskSet {
    tracker: TaskTracker,
    token: CancellationToken,
    bus: Bus,
    fatal: mpsc::UnboundedSender<TaskError>,
}

impl TaskSet {
    pub(crate) fn new(bus: Bus) -> (Self, mpsc::UnboundedReceiver<TaskError>) {
        let (fatal, fatal_rx) = mpsc::unbounded_channel();
        let set = Self {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
            bus,
            fatal,
        };
        (set, fatal_rx)
    }

    /// Spawns `fut` as a tracked task named `name`.
    ///
    /// Tasks spawned after cancellation complete immediately without being polled.
    pub fn spawn<F>(&self, name: impl Into<Arc<str>>, fut: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let name: Arc<str> = name.into();
        let token = self.token.clone();
        let bus = self.bus.clone();
        let fatal = self.fatal.clone();

        self.tracker.spawn(async move {
            let res = tokio::select! {
                biased;
                _ = token.cancelled() => Err(TaskError::Canceled),
                res = AssertUnwindSafe(fut).catch_unwind() => {
                    res.unwrap_or_else(|panic| Err(TaskError::fail(panic_message(&*panic))))
                }
            };
            report(&name, res, &bus, &fatal);
        });
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Whether shutdown has begun.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
        self.tracker.close();
    }

    pub(crate) async fn wait(&self) {
        self.tracker.wait().await;
    }
}

fn report(name: &str, res: Result<(), TaskError>, bus: &Bus, fatal: &mpsc::UnboundedSender<TaskError>) {
    match res {
        Ok(()) => trace!(task = name, "task finished"),
        Err(TaskError::Canceled) => debug!(task = name, "task cancelled"),
        Err(e) => {
            error!(task = name, label = e.as_label(), error = %e.as_message(), "task failed");
            bus.publish(
                Event::new(EventKind::TaskFailed)
                    .with_source(name)
                    .with_reason(e.as_message()),
            );
            if e.is_fatal() {
                let _ = fatal.send(e);
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn fatal_errors_are_forwarded() {
        let (set, mut fatal) = TaskSet::new(Bus::new(8));
        set.spawn("ok", async { Ok(()) });
        set.spawn("soft", async { Err(TaskError::fail("retry later")) });
        set.spawn("hard", async { Err(TaskError::fatal("no helper binary")) });

        let err = fatal.recv().await.expect("fatal forwarded");
        assert_eq!(err, TaskError::fatal("no helper binary"));
        assert!(fatal.try_recv().is_err());
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let (set, _fatal) = TaskSet::new(bus);
        set.spawn("boom", async {
            let sensor: Option<u8> = None;
            sensor.expect("sensor vanished");
            Ok(())
        });

        let ev = rx.recv().await.expect("reported");
        assert_eq!(ev.kind, EventKind::TaskFailed);
        assert_eq!(ev.reason.as_deref(), Some("panic: sensor vanished"));
    }

    #[tokio::test]
    async fn cancel_stops_pending_work() {
        let (set, _fatal) = TaskSet::new(Bus::new(8));
        set.spawn("forever", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        assert_eq!(set.len(), 1);

        set.cancel();
        tokio::time::timeout(Duration::from_secs(1), set.wait())
            .await
            .expect("drained");
        assert!(set.is_empty());
        assert!(set.is_cancelled());
    }
}
