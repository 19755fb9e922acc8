use std::sync::Arc;

use super::handle::RuntimeHandle;
use super::runtime::Runtime;
use super::tasks::TaskSet;
use crate::config::Config;
use crate::events::Bus;
use crate::listeners::ListenerRegistry;
use crate::objects::ObjectRegistry;

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    objects: Option<Arc<ObjectRegistry>>,
}

impl RuntimeBuilder {
    pub fn new(cfg: Config) -> Self {
        Self { cfg, objects: None }
    }

    /// Uses a pre-populated object registry, e.g. with named collaborators.
    pub fn with_objects(mut self, objects: Arc<ObjectRegistry>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Wires the bus, task set, blocking pool and registries.
    pub fn build(self) -> Runtime {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let (tasks, fatal_rx) = TaskSet::new(bus.clone());
        let handle = RuntimeHandle::new(
            tasks,
            bus,
            self.cfg.blocking_threads_clamped(),
            self.cfg.process.clone(),
        );
        let listeners = Arc::new(ListenerRegistry::new(handle.clone(), self.cfg.dedup));
        let objects = self.objects.unwrap_or_default();

        Runtime::from_parts(
            self.cfg,
            handle,
            objects,
            listeners,
            fatal_rx,
        )
    }
}
