use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::key::ListenerKey;
use super::payload::{DedupPolicy, Payload};
use crate::annotations::Callback;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};

tokio::task_local! {
    /// Dispatchers whose callbacks are running on the current task.
    static DISPATCHING: Vec<usize>;
}

/// # Per-listener callback list with duplicate suppression.
///
/// Triggers are serialized: a second trigger waits until every callback of the
/// first one has returned, so callbacks of one listener never interleave. The
/// exception is a callback triggering its own listener, which dispatches inline.
pub struct Dispatcher {
    key: ListenerKey,
    name: Arc<str>,
    policy: DedupPolicy,
    bus: Bus,
    state: Mutex<State>,
    serial: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct State {
    last: Option<Payload>,
    callbacks: Vec<Callback>,
}

impl Dispatcher {
    pub(crate) fn new(key: ListenerKey, policy: DedupPolicy, bus: Bus) -> Self {
        Self {
            name: Arc::from(key.to_string()),
            key,
            policy,
            bus,
            state: Mutex::new(State::default()),
            serial: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &ListenerKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a callback; dispatch order is registration order.
    pub fn add_callback(&self, callback: Callback) {
        self.state().callbacks.push(callback);
    }

    /// Snapshot of the bound callbacks.
    pub fn callbacks(&self) -> Vec<Callback> {
        self.state().callbacks.clone()
    }

    /// The payload of the most recent accepted trigger.
    pub fn last_payload(&self) -> Option<Payload> {
        self.state().last.clone()
    }

    /// Delivers `payload` to every callback, in order, awaiting each.
    ///
    /// Returns `Ok(false)` when the payload was suppressed as a duplicate. The
    /// first callback error stops the dispatch and is returned.
    ///
    /// A callback may trigger its own listener: the nested dispatch runs inline
    /// before the outer one moves on to the next callback.
    pub async fn trigger(
        &self,
        payload: Option<Payload>,
        allow_duplicates: bool,
    ) -> Result<bool, TaskError> {
        let mut active = DISPATCHING.try_with(Clone::clone).unwrap_or_default();
        if active.contains(&self.id()) {
            // one of our own callbacks triggered us; the lock is already held
            return self.dispatch(payload, allow_duplicates).await;
        }

        let _serial = self.serial.lock().await;
        active.push(self.id());
        DISPATCHING
            .scope(active, self.dispatch(payload, allow_duplicates))
            .await
    }

    async fn dispatch(
        &self,
        payload: Option<Payload>,
        allow_duplicates: bool,
    ) -> Result<bool, TaskError> {
        let callbacks = {
            let mut state = self.state();
            if !allow_duplicates
                && let Some(next) = &payload
                && self.policy.is_duplicate(state.last.as_ref(), next)
            {
                trace!(listener = %self.name, "duplicate payload suppressed");
                self.bus.publish(
                    Event::new(EventKind::DuplicateSuppressed).with_source(Arc::clone(&self.name)),
                );
                return Ok(false);
            }
            state.last = payload.clone();
            state.callbacks.clone()
        };

        let count = u32::try_from(callbacks.len()).unwrap_or(u32::MAX);
        debug!(listener = %self.name, callbacks = count, "dispatching payload");
        self.bus.publish(
            Event::new(EventKind::Dispatched)
                .with_source(Arc::clone(&self.name))
                .with_attempt(count),
        );

        for callback in &callbacks {
            let event = self.policy.decorate(payload.as_ref(), self.key.short_kind());
            if let Err(e) = callback.call(event).await {
                debug!(
                    listener = %self.name,
                    callback = callback.name(),
                    label = e.as_label(),
                    "callback failed, dispatch aborted"
                );
                return Err(e);
            }
        }
        Ok(true)
    }

    fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::annotations::{Args, OnEvent};
    use crate::listeners::{Listener, ListenerContext, ListenerRegistry};

    struct Gauge;

    #[async_trait]
    impl Listener for Gauge {
        type Attrs = ();

        fn build(_ctx: ListenerContext, _attrs: ()) -> Self {
            Gauge
        }

        async fn start(&self) -> Result<(), TaskError> {
            Ok(())
        }
    }

    type Log = Arc<StdMutex<Vec<String>>>;

    /// A callback bound to `Gauge` that logs `tag:level`, or fails when `fail`.
    fn bound(listeners: &Arc<ListenerRegistry>, tag: &'static str, fail: bool, log: &Log) -> Callback {
        let log = Arc::clone(log);
        let cb = Callback::new(tag, move |mut args: Args| {
            let log = Arc::clone(&log);
            async move {
                let event = args.event()?;
                let level = event.as_ref().map(|p| p["level"].to_string()).unwrap_or_default();
                log.lock().unwrap().push(format!("{tag}:{level}"));
                if fail {
                    return Err(TaskError::fail("refused"));
                }
                Ok(())
            }
        });
        cb.annotate(Arc::new(OnEvent::new(listeners, [ListenerKey::of::<Gauge>()])));
        cb
    }

    fn level(n: u64) -> Option<Payload> {
        let mut p = Payload::new();
        p.insert("level".into(), json!(n));
        Some(p)
    }

    fn gauge(listeners: &ListenerRegistry) -> Arc<Dispatcher> {
        listeners.get(&ListenerKey::of::<Gauge>()).expect("created on bind")
    }

    #[tokio::test]
    async fn callbacks_run_in_registration_order() {
        let listeners = Arc::new(ListenerRegistry::detached());
        let log = Log::default();
        bound(&listeners, "c1", false, &log);
        bound(&listeners, "c2", false, &log);
        bound(&listeners, "c3", false, &log);

        assert!(gauge(&listeners).trigger(level(50), false).await.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["c1:50", "c2:50", "c3:50"]);
    }

    #[tokio::test]
    async fn repeated_payload_is_suppressed_unless_allowed() {
        let listeners = Arc::new(ListenerRegistry::detached());
        let log = Log::default();
        bound(&listeners, "c", false, &log);
        let d = gauge(&listeners);

        assert!(d.trigger(level(50), false).await.unwrap());
        assert!(!d.trigger(level(50), false).await.unwrap());
        assert!(d.trigger(level(50), true).await.unwrap());
        assert!(d.trigger(level(49), false).await.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["c:50", "c:50", "c:49"]);
    }

    #[tokio::test]
    async fn payload_less_triggers_always_dispatch() {
        let listeners = Arc::new(ListenerRegistry::detached());
        let log = Log::default();
        bound(&listeners, "c", false, &log);
        let d = gauge(&listeners);

        assert!(d.trigger(None, false).await.unwrap());
        assert!(d.trigger(None, false).await.unwrap());
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn error_aborts_remaining_callbacks() {
        let listeners = Arc::new(ListenerRegistry::detached());
        let log = Log::default();
        bound(&listeners, "c1", false, &log);
        bound(&listeners, "c2", true, &log);
        bound(&listeners, "c3", false, &log);

        let err = gauge(&listeners).trigger(level(10), false).await.unwrap_err();
        assert_eq!(err, TaskError::fail("refused"));
        assert_eq!(*log.lock().unwrap(), vec!["c1:10", "c2:10"]);
    }

    #[tokio::test]
    async fn event_class_is_attached_to_each_copy() {
        let listeners = Arc::new(ListenerRegistry::detached());
        let seen: Arc<StdMutex<Vec<Payload>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let cb = Callback::new("classy", move |mut args: Args| {
            let sink = Arc::clone(&sink);
            async move {
                if let Some(p) = args.event()? {
                    sink.lock().unwrap().push(p);
                }
                Ok::<(), TaskError>(())
            }
        });
        cb.annotate(Arc::new(OnEvent::new(&listeners, [ListenerKey::of::<Gauge>()])));

        let d = gauge(&listeners);
        d.trigger(level(5), false).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0]["event-class"], json!("Gauge"));
        assert!(!d.last_payload().unwrap().contains_key("event-class"));
    }

    #[tokio::test]
    async fn suppression_is_published_on_the_bus() {
        let listeners = Arc::new(ListenerRegistry::detached());
        bound(&listeners, "c", false, &Log::default());
        let d = gauge(&listeners);
        let mut rx = listeners.runtime().bus().subscribe();

        d.trigger(level(1), false).await.unwrap();
        d.trigger(level(1), false).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Dispatched);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::DuplicateSuppressed);
    }

    #[tokio::test]
    async fn callback_may_trigger_its_own_listener() {
        let listeners = Arc::new(ListenerRegistry::detached());
        let log = Log::default();
        let sink = Arc::clone(&log);
        let registry = Arc::downgrade(&listeners);
        let cb = Callback::new("echo", move |mut args: Args| {
            let sink = Arc::clone(&sink);
            let registry = registry.clone();
            async move {
                let event = args.event()?.unwrap_or_default();
                sink.lock().unwrap().push(event["level"].to_string());
                if event["level"] == json!(1) {
                    let own = registry
                        .upgrade()
                        .and_then(|r| r.get(&ListenerKey::of::<Gauge>()))
                        .ok_or_else(|| TaskError::fail("listener gone"))?;
                    own.trigger(level(2), false).await?;
                }
                Ok::<(), TaskError>(())
            }
        });
        cb.annotate(Arc::new(OnEvent::new(&listeners, [ListenerKey::of::<Gauge>()])));

        let done = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            gauge(&listeners).trigger(level(1), false),
        )
        .await
        .expect("nested trigger does not wait on itself");
        assert!(done.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["1", "2"]);
        assert_eq!(gauge(&listeners).last_payload(), level(2));
    }
}
