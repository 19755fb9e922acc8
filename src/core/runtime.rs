//! # Runtime: declaration, listener start-up and graceful shutdown.
//!
//! ```text
//! Runtime::run(plugin)
//!   ├─► plugin.register(&runtime)          declarations: on()/inject() annotate callbacks,
//!   │                                      on() creates listener instances
//!   ├─► no listeners? ─► warn, return Ok
//!   ├─► for each listener (creation order): spawn start() as a tracked task
//!   │        start() error or panic ─► fatal "failure while initializing listener <key>"
//!   └─► select!
//!         ├─ SIGINT/SIGTERM ─────────► stop() ─► Ok
//!         └─ fatal error from a task ─► stop() ─► Err(Fatal)
//!
//! stop()
//!   ├─► publish ShutdownRequested, cancel the token, close the tracker
//!   └─► wait for tracked tasks, at most cfg.grace
//!         ├─ drained  ─► AllStoppedWithin
//!         └─ timeout  ─► GraceExceeded { pending }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::builder::RuntimeBuilder;
use super::handle::RuntimeHandle;
use super::plugin::Plugin;
use super::shutdown;
use super::tasks::panic_message;
use crate::annotations::{Callback, Inject, OnEvent};
use crate::config::Config;
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::objects::{Dependency, ObjectRegistry};

/// Owns the registries and the tracked task set for one daemon run.
pub struct Runtime {
    cfg: Config,
    handle: RuntimeHandle,
    objects: Arc<ObjectRegistry>,
    listeners: Arc<ListenerRegistry>,
    fatal_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskError>>>,
    started: AtomicBool,
    stopping: AtomicBool,
}

impl Runtime {
    /// Runtime with `cfg` and fresh registries.
    pub fn new(cfg: Config) -> Self {
        Self::builder(cfg).build()
    }

    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn from_parts(
        cfg: Config,
        handle: RuntimeHandle,
        objects: Arc<ObjectRegistry>,
        listeners: Arc<ListenerRegistry>,
        fatal_rx: mpsc::UnboundedReceiver<TaskError>,
    ) -> Self {
        Self {
            cfg,
            handle,
            objects,
            listeners,
            fatal_rx: Mutex::new(Some(fatal_rx)),
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    pub fn bus(&self) -> &Bus {
        self.handle.bus()
    }

    pub fn objects(&self) -> &Arc<ObjectRegistry> {
        &self.objects
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Binds `callback` to every listener in `keys`; its event arrives as the
    /// leading argument.
    pub fn on(&self, callback: &Callback, keys: impl IntoIterator<Item = ListenerKey>) {
        callback.annotate(Arc::new(OnEvent::new(&self.listeners, keys)));
    }

    /// Prepends the objects behind `deps` to `callback`'s arguments, in order.
    pub fn inject(&self, callback: &Callback, deps: impl IntoIterator<Item = Dependency>) {
        callback.annotate(Arc::new(Inject::new(Arc::clone(&self.objects), deps)));
    }

    /// Spawns tracked work; see [`TaskSet::spawn`](super::TaskSet::spawn).
    pub fn spawn<F>(&self, name: impl Into<Arc<str>>, fut: F)
    where
        F: std::future::Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.handle.spawn(name, fut);
    }

    /// Runs the plugin's declarations.
    pub fn load<P: Plugin + ?Sized>(&self, plugin: &P) -> Result<(), RuntimeError> {
        debug!(plugin = plugin.name(), "loading plugin");
        plugin
            .register(self)
            .map_err(|e| RuntimeError::Declaration {
                plugin: plugin.name().to_string(),
                error: e.as_message(),
            })
    }

    /// Starts every registered listener, in creation order, as tracked tasks.
    ///
    /// Only the first call has an effect; a listener is started at most once.
    pub fn start_listeners(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("listeners already started");
            return;
        }
        for entry in self.listeners.entries_snapshot() {
            let name = entry.dispatcher.name().to_string();
            let listener = entry.listener;
            self.bus()
                .publish(Event::new(EventKind::ListenerStarting).with_source(name.as_str()));
            info!(listener = %name, "starting listener");

            let context = format!("failure while initializing listener {name}");
            self.handle.spawn(format!("listener {name}"), async move {
                AssertUnwindSafe(listener.start())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(TaskError::fatal(panic_message(&*panic))))
                    .map_err(|e| e.into_fatal(&context))
            });
        }
    }

    /// Declares, starts and serves until a termination signal or a fatal error.
    pub async fn run<P: Plugin + ?Sized>(&self, plugin: &P) -> Result<(), RuntimeError> {
        self.load(plugin)?;
        if self.listeners.is_empty() {
            warn!("no event listeners enabled, exiting");
            return Ok(());
        }

        let mut fatal_rx = self.take_fatal_rx();
        self.start_listeners();
        info!(listeners = self.listeners.len(), "runtime started");

        let outcome = tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => match res {
                Ok(()) => {
                    info!("termination signal received");
                    Ok(())
                }
                Err(e) => Err(RuntimeError::Signal { error: e.to_string() }),
            },
            Some(err) = recv_fatal(&mut fatal_rx) => {
                error!(label = err.as_label(), error = %err.as_message(), "fatal error, shutting down");
                Err(RuntimeError::Fatal { error: err.as_message() })
            }
        };

        let stopped = self.stop().await;
        outcome?;
        stopped
    }

    /// Cancels every tracked task and waits for them within the grace period.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            self.bus().publish(Event::new(EventKind::ShutdownRequested));
        }
        let tasks = self.handle.tasks();
        tasks.cancel();

        let grace = self.cfg.grace();
        match tokio::time::timeout(grace, tasks.wait()).await {
            Ok(()) => {
                self.bus().publish(Event::new(EventKind::AllStoppedWithin));
                info!("all tasks stopped");
                Ok(())
            }
            Err(_) => {
                let pending = tasks.len();
                self.bus().publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_attempt(u32::try_from(pending).unwrap_or(u32::MAX)),
                );
                Err(RuntimeError::GraceExceeded { grace, pending })
            }
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn take_fatal_rx(&self) -> Option<mpsc::UnboundedReceiver<TaskError>> {
        self.fatal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn recv_fatal(rx: &mut Option<mpsc::UnboundedReceiver<TaskError>>) -> Option<TaskError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
