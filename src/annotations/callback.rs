use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;

use super::args::{Args, Invocation};
use super::behavior::Behavior;
use crate::error::TaskError;
use crate::listeners::Payload;

/// Future returned by every composed callback.
pub type CallbackFuture = BoxFuture<'static, Result<(), TaskError>>;

/// An invocable layer of the composed chain.
pub type Handler = Arc<dyn Fn(Invocation) -> CallbackFuture + Send + Sync>;

/// # A user callback plus its ordered annotations.
///
/// Cloning is cheap and clones share the annotation list, so a callback can be
/// registered on several listeners and still be annotated afterwards.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    original: Handler,
    annotations: Mutex<Vec<Arc<dyn Behavior>>>,
}

impl Callback {
    /// Wraps an async function receiving the positional [`Args`].
    ///
    /// ```rust
    /// use deskvisor::{Callback, TaskError};
    ///
    /// let cb = Callback::new("log_battery", |mut args| async move {
    ///     let event = args.event()?;
    ///     println!("battery: {event:?}");
    ///     Ok::<(), TaskError>(())
    /// });
    /// assert_eq!(cb.name(), "log_battery");
    /// ```
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let original: Handler = Arc::new(move |inv: Invocation| f(inv.args).boxed());
        Self::from_handler(name, original)
    }

    /// Wraps an already-erased handler.
    pub fn from_handler(name: impl Into<Arc<str>>, original: Handler) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                original,
                annotations: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Appends `behavior` and runs its declaration-time effect.
    pub fn annotate(&self, behavior: Arc<dyn Behavior>) {
        self.annotations_mut().push(Arc::clone(&behavior));
        behavior.declared(self);
    }

    /// Kinds of the attached behaviors, in attachment order.
    pub fn annotations(&self) -> Vec<&'static str> {
        self.annotations_mut().iter().map(|b| b.kind()).collect()
    }

    /// The undecorated handler.
    pub fn original(&self) -> Handler {
        Arc::clone(&self.inner.original)
    }

    /// Folds the annotations over the original: `B1(B2(...Bn(original)))`.
    ///
    /// Pure with respect to the callback; calling it twice yields equivalent chains.
    pub fn materialize(&self) -> Handler {
        let behaviors = self.annotations_mut().clone();
        behaviors
            .iter()
            .rev()
            .fold(self.original(), |inner, behavior| behavior.wrap(inner))
    }

    /// Materializes and invokes with `event` as the current payload.
    pub fn call(&self, event: Option<Payload>) -> CallbackFuture {
        (self.materialize())(Invocation::new(event))
    }

    /// Whether both handles refer to the same callback.
    pub fn same(&self, other: &Callback) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn annotations_mut(&self) -> MutexGuard<'_, Vec<Arc<dyn Behavior>>> {
        self.inner
            .annotations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.inner.name)
            .field("annotations", &self.annotations())
            .finish()
    }
}
