use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::dispatcher::Dispatcher;
use super::key::ListenerKey;
use super::listener::{ListenerContext, Startable};
use super::payload::DedupPolicy;
use crate::annotations::Callback;
use crate::core::RuntimeHandle;
use crate::events::{Event, EventKind};

/// # One listener instance per [`ListenerKey`].
///
/// Entries keep insertion order, which is also the order listeners are started.
pub struct ListenerRegistry {
    runtime: RuntimeHandle,
    policy: DedupPolicy,
    entries: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    order: Vec<Entry>,
    index: HashMap<ListenerKey, usize>,
}

/// A built listener and its dispatcher.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) listener: Arc<dyn Startable>,
}

impl ListenerRegistry {
    pub fn new(runtime: RuntimeHandle, policy: DedupPolicy) -> Self {
        Self {
            runtime,
            policy,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Returns the dispatcher for `key`, building the listener on first use.
    pub fn get_or_create(&self, key: &ListenerKey) -> Arc<Dispatcher> {
        let mut entries = self.entries();
        if let Some(&i) = entries.index.get(key) {
            return Arc::clone(&entries.order[i].dispatcher);
        }

        let dispatcher = Arc::new(Dispatcher::new(
            key.clone(),
            self.policy,
            self.runtime.bus().clone(),
        ));
        let ctx = ListenerContext::new(Arc::clone(&dispatcher), self.runtime.clone());
        let listener = key.build(ctx);

        let i = entries.order.len();
        entries.order.push(Entry {
            dispatcher: Arc::clone(&dispatcher),
            listener,
        });
        entries.index.insert(key.clone(), i);
        drop(entries);

        debug!(listener = %key, "listener created");
        self.runtime
            .bus()
            .publish(Event::new(EventKind::ListenerCreated).with_source(dispatcher.name()));
        dispatcher
    }

    /// Binds `callback` to the listener behind `key`.
    pub fn add_callback(&self, key: &ListenerKey, callback: Callback) -> Arc<Dispatcher> {
        let dispatcher = self.get_or_create(key);
        debug!(listener = %key, callback = callback.name(), "callback bound");
        dispatcher.add_callback(callback);
        dispatcher
    }

    /// Dispatcher for `key`, if its listener exists.
    pub fn get(&self, key: &ListenerKey) -> Option<Arc<Dispatcher>> {
        let entries = self.entries();
        entries
            .index
            .get(key)
            .map(|&i| Arc::clone(&entries.order[i].dispatcher))
    }

    /// Keys in creation order.
    pub fn keys(&self) -> Vec<ListenerKey> {
        self.entries()
            .order
            .iter()
            .map(|e| e.dispatcher.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub(crate) fn entries_snapshot(&self) -> Vec<Entry> {
        self.entries().order.clone()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(RuntimeHandle::detached(), DedupPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Serialize;

    use super::*;
    use crate::error::TaskError;
    use crate::listeners::Listener;

    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, Default, Serialize)]
    struct Dev {
        name: String,
    }

    struct Device;

    #[async_trait]
    impl Listener for Device {
        type Attrs = Dev;

        fn build(_ctx: ListenerContext, _attrs: Dev) -> Self {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            Device
        }

        async fn start(&self) -> Result<(), TaskError> {
            Ok(())
        }
    }

    fn dev(name: &str) -> ListenerKey {
        ListenerKey::with::<Device>(Dev { name: name.into() }).unwrap()
    }

    fn noop(name: &'static str) -> Callback {
        Callback::new(name, |_| async { Ok(()) })
    }

    #[test]
    fn same_key_shares_one_instance() {
        let reg = ListenerRegistry::detached();
        let before = BUILDS.load(Ordering::SeqCst);

        let a = reg.add_callback(&dev("BAT0"), noop("a"));
        let b = reg.add_callback(&dev("BAT0"), noop("b"));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert_eq!(a.callbacks().len(), 2);
        assert_eq!(BUILDS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn distinct_attributes_make_distinct_instances() {
        let reg = ListenerRegistry::detached();
        let a = reg.add_callback(&dev("BAT0"), noop("a"));
        let b = reg.add_callback(&dev("BAT1"), noop("b"));

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(reg.keys(), vec![dev("BAT0"), dev("BAT1")]);
    }

    #[test]
    fn unknown_key_has_no_dispatcher() {
        let reg = ListenerRegistry::detached();
        assert!(reg.is_empty());
        assert!(reg.get(&dev("none")).is_none());
    }
}
