use std::sync::{Arc, Weak};

use futures::FutureExt;
use tracing::warn;

use super::args::{Arg, Invocation};
use super::callback::{Callback, Handler};
use crate::error::TaskError;
use crate::listeners::{ListenerKey, ListenerRegistry};
use crate::objects::{Dependency, Object, ObjectRegistry};

/// # A named decoration attached to a [`Callback`].
///
/// `wrap` receives the already-composed inner chain and returns a new layer.
/// `declared` runs once, when the behavior is attached.
pub trait Behavior: Send + Sync + 'static {
    /// Short kind name, used in logs and [`Callback::annotations`].
    fn kind(&self) -> &'static str;

    /// Declaration-time side effect.
    fn declared(&self, _callback: &Callback) {}

    /// Builds this layer around `inner`.
    fn wrap(&self, inner: Handler) -> Handler;
}

/// Prepends resolved objects as leading arguments, in declared order.
pub struct Inject {
    objects: Arc<ObjectRegistry>,
    deps: Arc<[Dependency]>,
}

impl Inject {
    pub fn new(objects: Arc<ObjectRegistry>, deps: impl IntoIterator<Item = Dependency>) -> Self {
        Self {
            objects,
            deps: deps.into_iter().collect(),
        }
    }
}

impl Behavior for Inject {
    fn kind(&self) -> &'static str {
        "inject"
    }

    fn wrap(&self, inner: Handler) -> Handler {
        let objects = Arc::clone(&self.objects);
        let deps = Arc::clone(&self.deps);
        Arc::new(move |mut inv: Invocation| {
            let resolved: Result<Vec<Object>, _> = deps.iter().map(|d| objects.get(d)).collect();
            match resolved {
                Ok(resolved) => {
                    for obj in resolved.into_iter().rev() {
                        inv.args.push_front(Arg::Object(obj));
                    }
                    inner(inv)
                }
                Err(e) => async move { Err(TaskError::from(e)) }.boxed(),
            }
        })
    }
}

/// Binds a callback to one or more listeners.
///
/// Registration happens when the behavior is attached. At call time the
/// invocation's event is moved into the leading argument slot.
pub struct OnEvent {
    listeners: Weak<ListenerRegistry>,
    keys: Vec<ListenerKey>,
}

impl OnEvent {
    pub fn new(listeners: &Arc<ListenerRegistry>, keys: impl IntoIterator<Item = ListenerKey>) -> Self {
        Self {
            listeners: Arc::downgrade(listeners),
            keys: keys.into_iter().collect(),
        }
    }

    pub fn keys(&self) -> &[ListenerKey] {
        &self.keys
    }
}

impl Behavior for OnEvent {
    fn kind(&self) -> &'static str {
        "on"
    }

    fn declared(&self, callback: &Callback) {
        let Some(listeners) = self.listeners.upgrade() else {
            warn!(callback = callback.name(), "listener registry is gone, binding ignored");
            return;
        };
        for key in &self.keys {
            listeners.add_callback(key, callback.clone());
        }
    }

    fn wrap(&self, inner: Handler) -> Handler {
        Arc::new(move |mut inv: Invocation| {
            let event = inv.event.take();
            inv.args.push_front(Arg::Event(event));
            inner(inv)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::annotations::Args;
    use crate::listeners::Payload;

    #[derive(Default)]
    struct Notify;

    #[derive(Default)]
    struct StatusBar;

    /// Records what the original saw: "event" or the object's type.
    fn shape_recorder() -> (Callback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = Callback::new("shape", move |mut args: Args| {
            let sink = Arc::clone(&sink);
            async move {
                while let Some(arg) = args.next() {
                    let label = match arg {
                        Arg::Event(Some(p)) => format!("event:{}", p["level"]),
                        Arg::Event(None) => "event:none".to_string(),
                        Arg::Object(o) if o.is::<Notify>() => "Notify".to_string(),
                        Arg::Object(o) if o.is::<StatusBar>() => "StatusBar".to_string(),
                        Arg::Object(_) => "?".to_string(),
                    };
                    sink.lock().unwrap().push(label);
                }
                Ok(())
            }
        });
        (cb, seen)
    }

    fn level(n: u64) -> Payload {
        let mut p = Payload::new();
        p.insert("level".into(), json!(n));
        p
    }

    #[tokio::test]
    async fn inject_prepends_in_declared_order() {
        let objects = Arc::new(ObjectRegistry::new());
        let (cb, seen) = shape_recorder();
        cb.annotate(Arc::new(Inject::new(
            objects,
            [Dependency::of::<Notify>(), Dependency::of::<StatusBar>()],
        )));
        cb.call(None).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["Notify", "StatusBar"]);
    }

    #[tokio::test]
    async fn inject_inject_on_orders_event_innermost_first() {
        let objects = Arc::new(ObjectRegistry::new());
        let listeners = Arc::new(ListenerRegistry::detached());
        let (cb, seen) = shape_recorder();

        cb.annotate(Arc::new(Inject::new(Arc::clone(&objects), [Dependency::of::<Notify>()])));
        cb.annotate(Arc::new(Inject::new(Arc::clone(&objects), [Dependency::of::<StatusBar>()])));
        cb.annotate(Arc::new(OnEvent::new(&listeners, [])));

        cb.call(Some(level(80))).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["event:80", "StatusBar", "Notify"]);
    }

    #[tokio::test]
    async fn on_then_inject_puts_object_first() {
        let objects = Arc::new(ObjectRegistry::new());
        let listeners = Arc::new(ListenerRegistry::detached());
        let (cb, seen) = shape_recorder();

        cb.annotate(Arc::new(OnEvent::new(&listeners, [])));
        cb.annotate(Arc::new(Inject::new(objects, [Dependency::of::<Notify>()])));

        cb.call(None).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["Notify", "event:none"]);
    }

    #[tokio::test]
    async fn unresolvable_dependency_fails_the_call() {
        let objects = Arc::new(ObjectRegistry::new());
        let (cb, seen) = shape_recorder();
        cb.annotate(Arc::new(Inject::new(objects, [Dependency::named("missing")])));

        let err = cb.call(None).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(seen.lock().unwrap().is_empty());
    }
}
