use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;

use super::dispatcher::Dispatcher;
use super::payload::Payload;
use crate::core::RuntimeHandle;
use crate::error::TaskError;

/// # An event source.
///
/// One instance exists per distinct [`ListenerKey`](super::ListenerKey). It is
/// built when the first callback binds to it and started once by the runtime.
///
/// `start` typically spawns its long-running work through the context and
/// returns; any error it returns is fatal for the runtime.
///
/// ```rust
/// use std::time::Duration;
/// use async_trait::async_trait;
/// use deskvisor::{Listener, ListenerContext, TaskError};
/// use serde::Serialize;
///
/// #[derive(Clone, Default, Serialize)]
/// struct TickAttrs { period_secs: u64 }
///
/// struct Tick { ctx: ListenerContext, attrs: TickAttrs }
///
/// #[async_trait]
/// impl Listener for Tick {
///     type Attrs = TickAttrs;
///
///     fn build(ctx: ListenerContext, attrs: TickAttrs) -> Self {
///         Self { ctx, attrs }
///     }
///
///     async fn start(&self) -> Result<(), TaskError> {
///         let ctx = self.ctx.clone();
///         let period = Duration::from_secs(self.attrs.period_secs.max(1));
///         self.ctx.spawn("tick", async move {
///             loop {
///                 tokio::time::sleep(period).await;
///                 if let Err(e) = ctx.trigger_with(None, true).await {
///                     return Err(e);
///                 }
///             }
///         });
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync + Sized + 'static {
    /// Constructor overrides; part of the listener's identity.
    type Attrs: Serialize + Default + Clone + Send + Sync + 'static;

    /// Creates the instance. Called while the registry is locked, so it must not
    /// declare further bindings.
    fn build(ctx: ListenerContext, attrs: Self::Attrs) -> Self;

    /// Begins producing events.
    async fn start(&self) -> Result<(), TaskError>;
}

/// Object-safe view of a built listener.
pub(crate) trait Startable: Send + Sync {
    fn start(&self) -> BoxFuture<'_, Result<(), TaskError>>;
}

impl<L: Listener> Startable for L {
    fn start(&self) -> BoxFuture<'_, Result<(), TaskError>> {
        Listener::start(self)
    }
}

/// Back-reference handed to a listener: its own dispatcher plus the runtime.
#[derive(Clone)]
pub struct ListenerContext {
    dispatcher: Arc<Dispatcher>,
    runtime: RuntimeHandle,
}

impl ListenerContext {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, runtime: RuntimeHandle) -> Self {
        Self {
            dispatcher,
            runtime,
        }
    }

    /// Display name of the owning key.
    pub fn name(&self) -> &str {
        self.dispatcher.name()
    }

    /// Delivers `payload` to every bound callback unless it repeats the previous one.
    ///
    /// Returns whether callbacks ran.
    pub async fn trigger(&self, payload: impl Into<Option<Payload>>) -> Result<bool, TaskError> {
        self.dispatcher.trigger(payload.into(), false).await
    }

    /// Like [`trigger`](Self::trigger), optionally bypassing duplicate suppression.
    pub async fn trigger_with(
        &self,
        payload: Option<Payload>,
        allow_duplicates: bool,
    ) -> Result<bool, TaskError> {
        self.dispatcher.trigger(payload, allow_duplicates).await
    }

    /// Spawns tracked work on the runtime.
    pub fn spawn<F>(&self, name: impl Into<Arc<str>>, fut: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.runtime.spawn(name, fut);
    }

    /// Spawns tracked work after `delay`.
    pub fn spawn_after<F>(&self, name: impl Into<Arc<str>>, delay: Duration, fut: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.runtime.spawn_after(name, delay, fut);
    }

    /// Runs a blocking call on the bounded auxiliary pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.runtime.run_blocking(f).await
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
